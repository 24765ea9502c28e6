use super::client::CertificateAuthentication;
use crate::executors::{ExecutionContext, ExecutorError};
use std::collections::HashMap;
use std::time::Duration;

pub const METHOD: &str = "method";
pub const URL: &str = "url";
pub const TOKEN_URL: &str = "tokenUrl";
pub const CSRF_URL: &str = "csrfUrl";
pub const CLIENT_ID: &str = "clientId";
pub const CLIENT_SECRET: &str = "clientSecret";
pub const REFRESH_TOKEN: &str = "refreshToken";
pub const RESPONSE_BODY_TRANSFORMER: &str = "responseBodyTransformer";
pub const HEADERS: &str = "headers";
pub const BODY: &str = "body";
pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const TIMEOUT: &str = "timeout";
pub const SUCCESS_RESPONSE_CODES: &str = "successResponseCodes";
pub const SUCCEED_ON_TIMEOUT: &str = "succeedOnTimeout";
pub const TRUSTED_CERTS: &str = "trustedCerts";
pub const CLIENT_CERT: &str = "clientCert";
pub const TRUST_ANY_CERT: &str = "trustAnyCert";
pub const AUTHORIZATION_HEADER: &str = "authorizationHeader";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_SUCCESS_RESPONSE_CODES: &str = "2xx";

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const CONTENT_TYPE_URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Everything an HTTP task execution needs, decoded from the input map.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestParameters {
    pub method: String,
    pub url: String,
    pub token_url: String,
    pub csrf_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub response_body_transformer: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub success_response_codes: Vec<String>,
    pub succeed_on_timeout: bool,
    pub cert_auth: CertificateAuthentication,
    pub authorization_header: String,
}

impl HttpRequestParameters {
    pub fn from_context(ctx: &ExecutionContext) -> Result<Self, ExecutorError> {
        let method = ctx.get_required_string(METHOD)?;
        let url = ctx.get_required_string(URL)?;

        let timeout = match ctx.get_number(TIMEOUT)? {
            0 => DEFAULT_TIMEOUT,
            seconds => Duration::from_secs(seconds),
        };

        let mut success_response_codes = ctx.get_list(SUCCESS_RESPONSE_CODES)?;
        if success_response_codes.is_empty() {
            success_response_codes = vec![DEFAULT_SUCCESS_RESPONSE_CODES.to_string()];
        }

        Ok(Self {
            method,
            url,
            token_url: ctx.get_string(TOKEN_URL),
            csrf_url: ctx.get_string(CSRF_URL),
            client_id: ctx.get_string(CLIENT_ID),
            client_secret: ctx.get_string(CLIENT_SECRET),
            refresh_token: ctx.get_string(REFRESH_TOKEN),
            response_body_transformer: ctx.get_string(RESPONSE_BODY_TRANSFORMER),
            headers: ctx.get_map(HEADERS)?,
            body: ctx.get_string(BODY),
            user: ctx.get_string(USER),
            password: ctx.get_string(PASSWORD),
            timeout,
            success_response_codes,
            succeed_on_timeout: ctx.get_boolean(SUCCEED_ON_TIMEOUT)?,
            cert_auth: CertificateAuthentication {
                trusted_certs: ctx.get_string(TRUSTED_CERTS),
                client_cert: ctx.get_string(CLIENT_CERT),
                trust_any_cert: ctx.get_boolean(TRUST_ANY_CERT)?,
            },
            authorization_header: ctx.get_string(AUTHORIZATION_HEADER),
        })
    }

    /// Parameters for an internal fetch (tokens, CSRF): no auth resolution
    /// beyond the pre-computed header, default timeout and success codes.
    pub fn internal(
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: String,
        authorization_header: String,
        cert_auth: CertificateAuthentication,
    ) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers,
            body,
            timeout: DEFAULT_TIMEOUT,
            success_response_codes: vec![DEFAULT_SUCCESS_RESPONSE_CODES.to_string()],
            cert_auth,
            authorization_header,
            ..Self::default()
        }
    }
}
