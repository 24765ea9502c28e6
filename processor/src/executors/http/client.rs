use crate::executors::ExecutorError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::time::Duration;

/// TLS material supplied through the task input. Certificates arrive either
/// as raw PEM or base64-encoded PEM; the encoding is auto-detected.
#[derive(Debug, Clone, Default)]
pub struct CertificateAuthentication {
    pub trusted_certs: String,
    pub client_cert: String,
    pub trust_any_cert: bool,
}

impl CertificateAuthentication {
    pub fn with_client_cert(client_cert: &str) -> Self {
        Self {
            client_cert: client_cert.to_string(),
            ..Self::default()
        }
    }

    pub fn use_trusted_certificates(&self) -> bool {
        !self.trusted_certs.is_empty()
    }

    pub fn use_client_certificate(&self) -> bool {
        !self.client_cert.is_empty()
    }
}

/// Builds the client for one request: bounded by the task timeout, never
/// following redirects (the last response is returned as-is).
pub fn build_client(
    timeout: Duration,
    cert_auth: &CertificateAuthentication,
) -> Result<reqwest::Client, ExecutorError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none());

    if cert_auth.trust_any_cert {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if cert_auth.use_trusted_certificates() {
        let pem = decode_if_base64(&cert_auth.trusted_certs);
        let certs = reqwest::Certificate::from_pem_bundle(pem.as_bytes()).map_err(|err| {
            ExecutorError::NonRetryable(format!("failed to register the trusted certificate: {err}"))
        })?;
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if cert_auth.use_client_certificate() {
        let pem = decode_if_base64(&cert_auth.client_cert);
        let identity = reqwest::Identity::from_pem(pem.as_bytes()).map_err(|err| {
            ExecutorError::NonRetryable(format!("failed to parse the client certificate: {err}"))
        })?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|err| ExecutorError::NonRetryable(format!("failed to build HTTP client: {err}")))
}

/// Base64 is tried first; anything that does not decode to UTF-8 PEM is
/// treated as raw certificate data.
pub fn decode_if_base64(certs: &str) -> String {
    match BASE64.decode(certs.trim()) {
        Ok(decoded) => String::from_utf8(decoded).unwrap_or_else(|_| certs.to_string()),
        Err(_) => certs.to_string(),
    }
}
