use super::auth::{basic, bearer};
use super::client::CertificateAuthentication;
use super::params::{
    CONTENT_TYPE_HEADER, CONTENT_TYPE_URL_ENCODED, HttpRequestParameters,
};
use crate::executors::ExecutorError;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rwp_common::store::Store;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// How far before the nominal expiry a cached token is already refreshed.
const EXPIRY_WINDOW_MS: i64 = 30_000;

/// OAuth 2 token request derived from the task parameters: one of the
/// refresh-token / password / client-credentials grants, authenticated
/// either with a Basic header or the client certificate.
#[derive(Debug)]
pub struct TokenRequest {
    pub token_url: String,
    pub body: String,
    pub auth_header: String,
    pub cert_auth: Option<CertificateAuthentication>,
    pub caching_key: String,
}

/// Cache-aside over the execution store: a cached token is reused until it
/// is about to expire, anything fetched is persisted under the derived key.
pub async fn generate_with_cache_aside(
    params: &HttpRequestParameters,
    store: &Store,
) -> Result<String, ExecutorError> {
    let request = select_grant(params)?;

    if let Some(raw) = store.read(&request.caching_key)
        && let Some(cached) = CachedToken::parse(&raw)
        && !cached.about_to_expire(now_ms())
    {
        let token = OAuthToken::parse(&cached.token)?;
        return Ok(bearer(token.access_token()?));
    }

    let raw = fetch_token(&request).await?;
    let issued_at = now_ms();
    let token = OAuthToken::parse(&raw)?;
    store.write(&request.caching_key, CachedToken::envelope(&raw, issued_at)?);
    Ok(bearer(token.access_token()?))
}

fn select_grant(p: &HttpRequestParameters) -> Result<TokenRequest, ExecutorError> {
    let with_client_cert = p.cert_auth.use_client_certificate();

    if !p.refresh_token.is_empty() {
        return Ok(if with_client_cert {
            let body = format!(
                "grant_type=refresh_token&client_id={}&refresh_token={}",
                encoded(&p.client_id),
                encoded(&p.refresh_token)
            );
            TokenRequest {
                token_url: p.token_url.clone(),
                caching_key: caching_key(&p.token_url, &p.client_id, "", &body),
                body,
                auth_header: String::new(),
                cert_auth: Some(p.cert_auth.clone()),
            }
        } else {
            let body = format!(
                "grant_type=refresh_token&refresh_token={}",
                encoded(&p.refresh_token)
            );
            let auth_header = if p.client_id.is_empty() {
                String::new()
            } else {
                basic(&p.client_id, &p.client_secret)
            };
            TokenRequest {
                token_url: p.token_url.clone(),
                caching_key: caching_key(&p.token_url, &p.client_id, &p.client_secret, &body),
                body,
                auth_header,
                cert_auth: None,
            }
        });
    }

    if !p.user.is_empty() && !p.client_id.is_empty() {
        return Ok(if with_client_cert {
            let body = format!(
                "grant_type=password&client_id={}&username={}&password={}",
                encoded(&p.client_id),
                encoded(&p.user),
                encoded(&p.password)
            );
            TokenRequest {
                token_url: p.token_url.clone(),
                caching_key: caching_key(&p.token_url, &p.client_id, "", &body),
                body,
                auth_header: String::new(),
                cert_auth: Some(p.cert_auth.clone()),
            }
        } else {
            let body = format!(
                "grant_type=password&username={}&password={}",
                encoded(&p.user),
                encoded(&p.password)
            );
            TokenRequest {
                token_url: p.token_url.clone(),
                caching_key: caching_key(&p.token_url, &p.client_id, &p.client_secret, &body),
                body,
                auth_header: basic(&p.client_id, &p.client_secret),
                cert_auth: None,
            }
        });
    }

    if !p.user.is_empty() {
        return Ok(client_credentials(p, &p.user, &p.password));
    }

    if !p.client_id.is_empty() {
        return Ok(client_credentials(p, &p.client_id, &p.client_secret));
    }

    Err(ExecutorError::NonRetryable(
        "missing user, client ID or refresh token for the OAuth token request".to_string(),
    ))
}

fn client_credentials(p: &HttpRequestParameters, id: &str, secret: &str) -> TokenRequest {
    let body = format!(
        "grant_type=client_credentials&client_id={}&client_secret={}",
        encoded(id),
        encoded(secret)
    );
    let (auth_header, cert_auth) = if !id.is_empty() && !p.cert_auth.use_client_certificate() {
        (basic(id, secret), None)
    } else {
        (String::new(), Some(p.cert_auth.clone()))
    };
    TokenRequest {
        token_url: p.token_url.clone(),
        caching_key: caching_key(&p.token_url, id, secret, &body),
        body,
        auth_header,
        cert_auth,
    }
}

async fn fetch_token(request: &TokenRequest) -> Result<String, ExecutorError> {
    let headers = HashMap::from([(
        CONTENT_TYPE_HEADER.to_string(),
        CONTENT_TYPE_URL_ENCODED.to_string(),
    )]);
    let params = HttpRequestParameters::internal(
        "POST",
        &request.token_url,
        headers,
        request.body.clone(),
        request.auth_header.clone(),
        request.cert_auth.clone().unwrap_or_default(),
    );

    let response = super::perform(&params).await?;
    if !response.successful {
        return Err(ExecutorError::Retryable(format!(
            "token request to {} failed with status {}",
            request.token_url, response.status_code
        )));
    }
    Ok(response.content)
}

/// The key hashes URL, credentials and body so distinct principals never
/// share a cache slot. Only the digest ever leaves this function.
pub fn caching_key(token_url: &str, user: &str, secret: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "tokenUrl={token_url}&oAuthUser={user}&oAuthPwd={secret}&getTokenBody={body}"
    ));
    hex::encode(hasher.finalize())
}

fn encoded(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Store envelope around the verbatim token-endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedToken {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub timestamp: String,
}

impl CachedToken {
    pub fn envelope(token: &str, issued_at: i64) -> Result<String, ExecutorError> {
        serde_json::to_string(&Self {
            token: token.to_string(),
            timestamp: issued_at.to_string(),
        })
        .map_err(|err| ExecutorError::NonRetryable(format!("failed to cache OAuth token: {err}")))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let cached: Self = serde_json::from_str(raw).ok()?;
        if cached.token.is_empty() || cached.timestamp.is_empty() {
            return None;
        }
        Some(cached)
    }

    pub fn about_to_expire(&self, now_ms: i64) -> bool {
        let Ok(issued_at) = self.timestamp.parse::<i64>() else {
            return true;
        };
        let expires_in = OAuthToken::parse(&self.token)
            .map(|token| token.expires_in)
            .unwrap_or_default();
        now_ms + EXPIRY_WINDOW_MS >= issued_at + expires_in
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OAuthToken {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

impl OAuthToken {
    pub fn parse(raw: &str) -> Result<Self, ExecutorError> {
        serde_json::from_str(raw).map_err(|err| {
            ExecutorError::NonRetryable(format!("failed to parse OAuth token: {err}"))
        })
    }

    pub fn access_token(&self) -> Result<&str, ExecutorError> {
        if self.access_token.is_empty() {
            return Err(ExecutorError::NonRetryable(
                "token response carries no access_token".to_string(),
            ));
        }
        Ok(&self.access_token)
    }
}
