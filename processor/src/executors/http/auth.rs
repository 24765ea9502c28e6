use super::params::HttpRequestParameters;
use super::{ias, oauth};
use crate::executors::ExecutorError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use rwp_common::store::Store;
use std::sync::OnceLock;

pub const AUTHORIZATION_HEADER_NAME: &str = "Authorization";

const IAS_TOKEN_URL_PATTERN: &str =
    r"^https://(accounts\.sap\.com|[A-Za-z0-9+]+\.accounts(400)?\.ondemand\.com)";

/// Builds the Authorization header value for one request, first matching
/// rule wins. The empty string means "no header".
pub async fn create_authorization_header(
    params: &HttpRequestParameters,
    store: &Store,
) -> Result<String, ExecutorError> {
    if !params.authorization_header.is_empty() {
        return Ok(params.authorization_header.clone());
    }

    if !params.token_url.is_empty() {
        if !params.user.is_empty() && is_ias_token_url(&params.token_url) {
            return ias::generate(&params.token_url, &params.user, &params.cert_auth.client_cert)
                .await;
        }
        return oauth::generate_with_cache_aside(params, store).await;
    }

    if !params.user.is_empty() {
        return Ok(basic(&params.user, &params.password));
    }

    if no_authorization_required(params) {
        return Ok(String::new());
    }

    Err(ExecutorError::NonRetryable(
        "input values for the authentication-related keys (user, password & authorizationHeader) \
         are not combined properly"
            .to_string(),
    ))
}

pub fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn is_ias_token_url(token_url: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(IAS_TOKEN_URL_PATTERN).expect("IAS pattern compiles"))
        .is_match(token_url)
}

fn no_authorization_required(params: &HttpRequestParameters) -> bool {
    params.authorization_header.is_empty()
        && params.token_url.is_empty()
        && params.user.is_empty()
        && params.client_id.is_empty()
        && params.refresh_token.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HttpRequestParameters {
        HttpRequestParameters {
            method: "GET".to_string(),
            url: "http://host/x".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn explicit_header_bypasses_everything() {
        let mut p = params();
        p.authorization_header = "Bearer pre-computed".to_string();
        p.user = "ignored".to_string();
        let header = create_authorization_header(&p, &Store::new()).await.unwrap();
        assert_eq!(header, "Bearer pre-computed");
    }

    #[tokio::test]
    async fn user_and_password_produce_basic_auth() {
        let mut p = params();
        p.user = "user".to_string();
        p.password = "pass".to_string();
        let header = create_authorization_header(&p, &Store::new()).await.unwrap();
        assert_eq!(header, format!("Basic {}", BASE64.encode("user:pass")));
    }

    #[tokio::test]
    async fn no_auth_keys_mean_no_header() {
        let header = create_authorization_header(&params(), &Store::new())
            .await
            .unwrap();
        assert!(header.is_empty());
    }

    #[tokio::test]
    async fn password_alone_means_no_header() {
        let mut p = params();
        p.password = "orphan".to_string();
        let header = create_authorization_header(&p, &Store::new()).await.unwrap();
        assert!(header.is_empty());
    }

    #[tokio::test]
    async fn dangling_client_id_is_rejected() {
        let mut p = params();
        p.client_id = "client".to_string();
        let err = create_authorization_header(&p, &Store::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::NonRetryable(_)));
    }

    #[test]
    fn ias_hosts_are_recognized() {
        assert!(is_ias_token_url("https://accounts.sap.com/oauth2/token"));
        assert!(is_ias_token_url("https://tenant.accounts.ondemand.com/token"));
        assert!(is_ias_token_url("https://tenant.accounts400.ondemand.com/token"));
        assert!(!is_ias_token_url("https://login.example.com/oauth/token"));
        assert!(!is_ias_token_url("http://accounts.sap.com/insecure"));
    }
}
