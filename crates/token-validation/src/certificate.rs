//! Certificate validation hook for the validation call.
//!
//! A [`CertificateValidator`] overrides the trust decision for the authority's
//! TLS certificate. It is installed once, when the HTTP client is built, via a
//! rustls [`ServerCertVerifier`] ([`HookedServerCertVerifier`]) that:
//!
//! 1. runs the default webpki verifier (Mozilla roots) to compute
//!    [`PolicyErrors`] for the presented chain;
//! 2. hands the end-entity certificate, the chain and the policy errors to the
//!    validator, whose answer is final.
//!
//! Handshake signatures are always checked by the default verifier. The hook
//! overrides trust, never cryptography.

use crate::errors::ValidatorError;
use ring::digest::{digest, SHA256};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of default chain validation, as seen by a [`CertificateValidator`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyErrors(Option<rustls::Error>);

impl PolicyErrors {
    /// The chain validated against the default trust roots.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Default validation failed with `error`.
    #[must_use]
    pub fn from_error(error: rustls::Error) -> Self {
        Self(Some(error))
    }

    /// Whether default validation succeeded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// The default validation error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&rustls::Error> {
        self.0.as_ref()
    }
}

/// Predicate deciding whether to trust the authority's certificate.
pub trait CertificateValidator: Send + Sync {
    /// Return `true` to accept the certificate.
    ///
    /// `chain` holds the intermediates presented by the server, in the order
    /// the server sent them.
    fn validate(
        &self,
        certificate: &CertificateDer<'_>,
        chain: &[CertificateDer<'_>],
        policy_errors: &PolicyErrors,
    ) -> bool;
}

/// Accepts certificates whose SHA-256 fingerprint is pinned.
///
/// Unpinned certificates are accepted only if default validation succeeded.
/// Use this for self-signed authority certificates in controlled deployments.
#[derive(Debug, Clone, Default)]
pub struct PinnedCertificateValidator {
    fingerprints: HashSet<String>,
}

impl PinnedCertificateValidator {
    /// Create a validator from hex-encoded SHA-256 fingerprints.
    ///
    /// Fingerprints are matched case-insensitively; `:` separators are ignored.
    pub fn new<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fingerprints: fingerprints
                .into_iter()
                .map(|f| normalize_fingerprint(f.as_ref()))
                .collect(),
        }
    }

    /// Hex-encoded SHA-256 fingerprint of a DER certificate.
    #[must_use]
    pub fn fingerprint(certificate: &CertificateDer<'_>) -> String {
        hex::encode(digest(&SHA256, certificate.as_ref()))
    }
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

impl CertificateValidator for PinnedCertificateValidator {
    fn validate(
        &self,
        certificate: &CertificateDer<'_>,
        _chain: &[CertificateDer<'_>],
        policy_errors: &PolicyErrors,
    ) -> bool {
        self.fingerprints.contains(&Self::fingerprint(certificate)) || policy_errors.is_empty()
    }
}

/// rustls verifier that defers the trust decision to a [`CertificateValidator`].
pub struct HookedServerCertVerifier {
    inner: Arc<WebPkiServerVerifier>,
    validator: Arc<dyn CertificateValidator>,
}

impl HookedServerCertVerifier {
    /// Create a verifier over the Mozilla root store.
    ///
    /// # Errors
    ///
    /// Returns `ValidatorError::Tls` if the default verifier cannot be built.
    pub fn new(
        validator: Arc<dyn CertificateValidator>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, ValidatorError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| ValidatorError::Tls(format!("Failed to build default verifier: {e}")))?;

        Ok(Self { inner, validator })
    }
}

impl fmt::Debug for HookedServerCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedServerCertVerifier")
            .field("inner", &self.inner)
            .field("validator", &"<certificate validator>")
            .finish()
    }
}

impl ServerCertVerifier for HookedServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let policy_errors = match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(_) => PolicyErrors::none(),
            Err(e) => PolicyErrors::from_error(e),
        };

        if self
            .validator
            .validate(end_entity, intermediates, &policy_errors)
        {
            if let Some(error) = policy_errors.error() {
                debug!(
                    target: "token_validation.certificate",
                    error = %error,
                    "Certificate validator accepted certificate despite policy errors"
                );
            }
            return Ok(ServerCertVerified::assertion());
        }

        warn!(
            target: "token_validation.certificate",
            policy_errors = ?policy_errors.error(),
            "Certificate validator rejected authority certificate"
        );
        Err(rustls::Error::InvalidCertificate(
            CertificateError::ApplicationVerificationFailure,
        ))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Build a client TLS configuration with the validator installed.
///
/// # Errors
///
/// Returns `ValidatorError::Tls` if the configuration cannot be built.
pub fn tls_config_with_validator(
    validator: Arc<dyn CertificateValidator>,
) -> Result<rustls::ClientConfig, ValidatorError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = HookedServerCertVerifier::new(validator, Arc::clone(&provider))?;

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ValidatorError::Tls(format!("Unsupported protocol versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}
