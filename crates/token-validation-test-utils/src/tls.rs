//! Self-signed TLS validation authority.
//!
//! wiremock only serves plain HTTP, so certificate hook tests run against this
//! minimal HTTPS responder instead. Every request gets a 200 with the
//! configured JSON body.
//!
//! The certificate is generated per instance with rcgen and is not trusted by
//! any root store, so only a certificate validator can make the handshake
//! succeed.

use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// HTTPS authority with a freshly generated self-signed certificate.
pub struct TlsAuthority {
    port: u16,
    certificate: CertificateDer<'static>,
    requests: Arc<AtomicUsize>,
}

impl TlsAuthority {
    /// Start serving `body` for every validation request.
    ///
    /// The accept loop runs on a background thread for the rest of the test
    /// process.
    #[must_use]
    pub fn start(body: serde_json::Value) -> Self {
        let key_pair = KeyPair::generate().expect("key pair generation should succeed");
        let params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .expect("certificate params should be valid");
        let cert = params
            .self_signed(&key_pair)
            .expect("self-signed cert creation should succeed");
        let certificate = cert.der().clone();
        let private_key =
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .expect("default protocol versions should be supported")
        .with_no_client_auth()
        .with_single_cert(vec![certificate.clone()], private_key)
        .expect("server certificate should be accepted");
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind an ephemeral port");
        let port = listener
            .local_addr()
            .expect("listener should have a local address")
            .port();

        let requests = Arc::new(AtomicUsize::new(0));
        let served = Arc::clone(&requests);
        let body = body.to_string();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                // Failed handshakes are expected when the client rejects the certificate
                let _ = serve_connection(Arc::clone(&config), stream, &body, &served);
            }
        });

        Self {
            port,
            certificate,
            requests,
        }
    }

    /// Base URL of the authority.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    /// DER certificate presented by the authority.
    #[must_use]
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// Number of HTTP requests received over completed handshakes.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn serve_connection(
    config: Arc<ServerConfig>,
    tcp: TcpStream,
    body: &str,
    requests: &AtomicUsize,
) -> io::Result<()> {
    tcp.set_read_timeout(Some(Duration::from_secs(5)))?;
    let connection = ServerConnection::new(config).map_err(io::Error::other)?;
    let mut tls = StreamOwned::new(connection, tcp);

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = tls.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    requests.fetch_add(1, Ordering::SeqCst);

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    tls.write_all(response.as_bytes())?;
    tls.conn.send_close_notify();
    tls.flush()
}
