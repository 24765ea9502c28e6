use super::auth::basic;
use super::client::CertificateAuthentication;
use super::params::HttpRequestParameters;
use crate::executors::ExecutorError;
use std::collections::HashMap;

const PASSCODE: &str = "passcode";

/// IAS flow: fetch a one-time passcode over client-certificate TLS and use
/// it as the Basic password for the given user.
pub async fn generate(
    token_url: &str,
    user: &str,
    client_cert: &str,
) -> Result<String, ExecutorError> {
    let params = HttpRequestParameters::internal(
        "GET",
        token_url,
        HashMap::new(),
        String::new(),
        String::new(),
        CertificateAuthentication::with_client_cert(client_cert),
    );

    let response = super::perform(&params).await?;
    if !response.successful {
        return Err(ExecutorError::Retryable(format!(
            "passcode request to {token_url} failed with status {}",
            response.status_code
        )));
    }

    let parsed: serde_json::Value = serde_json::from_str(&response.content).map_err(|err| {
        ExecutorError::NonRetryable(format!("failed to parse the passcode response: {err}"))
    })?;
    let passcode = parsed
        .get(PASSCODE)
        .and_then(|value| value.as_str())
        .ok_or_else(|| {
            ExecutorError::NonRetryable("passcode does not exist in the http response".to_string())
        })?;

    Ok(basic(user, passcode))
}
