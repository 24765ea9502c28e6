use super::auth::AUTHORIZATION_HEADER_NAME;
use super::params::HttpRequestParameters;
use crate::executors::ExecutorError;
use std::collections::HashMap;

pub const CSRF_TOKEN_HEADER: &str = "X-Csrf-Token";
const CSRF_FETCH_HEADERS: [&str; 2] = ["X-Csrf-Token", "X-Xsrf-Token"];
const CSRF_FETCH_VERB: &str = "fetch";

/// Pre-fetches a CSRF token: GET against the configured URL with the fetch
/// verb in both token header dialects; the first matching response header
/// wins.
pub async fn fetch_csrf_token(
    params: &HttpRequestParameters,
    auth_header: &str,
) -> Result<String, ExecutorError> {
    let mut headers: HashMap<String, String> = CSRF_FETCH_HEADERS
        .iter()
        .map(|name| (name.to_string(), CSRF_FETCH_VERB.to_string()))
        .collect();
    if !auth_header.is_empty() {
        headers.insert(AUTHORIZATION_HEADER_NAME.to_string(), auth_header.to_string());
    }

    let fetch = HttpRequestParameters::internal(
        "GET",
        &params.csrf_url,
        headers,
        String::new(),
        String::new(),
        params.cert_auth.clone(),
    );

    let response = super::perform(&fetch).await?;
    CSRF_FETCH_HEADERS
        .iter()
        .find_map(|name| {
            response
                .headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        })
        .ok_or_else(|| {
            ExecutorError::NonRetryable(format!(
                "no CSRF token header in the response from {}",
                params.csrf_url
            ))
        })
}
