pub mod auth;
pub mod client;
pub mod csrf;
pub mod ias;
pub mod oauth;
pub mod params;
pub mod response;

pub use params::HttpRequestParameters;
pub use response::HttpResponse;

use crate::executors::{ExecutionContext, ExecutorError, ExecutorResult};
use crate::proto::task_execution_response_message::TaskState;
use auth::AUTHORIZATION_HEADER_NAME;
use csrf::CSRF_TOKEN_HEADER;
use owo_colors::OwoColorize;
use rwp_common::store::Store;
use std::collections::HashMap;
use std::time::Instant;

/// Runs one HTTP task: decode parameters, resolve authorization, optionally
/// pre-fetch a CSRF token, fire the request and classify the outcome.
#[derive(Default)]
pub struct HttpExecutor;

impl HttpExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, ctx: &ExecutionContext) -> ExecutorResult {
        let params = match HttpRequestParameters::from_context(ctx) {
            Ok(params) => params,
            Err(err) => return ExecutorResult::failed(&err),
        };

        match self.execute_with_parameters(&params, ctx.store()).await {
            Ok(response) => {
                let output = response.to_output_map();
                if response.successful {
                    ExecutorResult::completed(output)
                } else {
                    let error = request_failed_error(&response);
                    ExecutorResult::failed_with_output(output, TaskState::FailedRetryable, error)
                }
            }
            Err(err) => ExecutorResult::failed(&err),
        }
    }

    pub async fn execute_with_parameters(
        &self,
        params: &HttpRequestParameters,
        store: &Store,
    ) -> Result<HttpResponse, ExecutorError> {
        let auth_header = auth::create_authorization_header(params, store).await?;

        if params.csrf_url.is_empty() {
            return send_request(params, &params.headers, &auth_header).await;
        }

        let token = csrf::fetch_csrf_token(params, &auth_header)
            .await
            .map_err(|err| {
                ExecutorError::NonRetryable(format!("failed to fetch CSRF token: {err}"))
            })?;
        let mut headers = params.headers.clone();
        headers.insert(CSRF_TOKEN_HEADER.to_string(), token);
        send_request(params, &headers, &auth_header).await
    }
}

/// Internal fetches (token endpoints, CSRF) go straight to the wire with
/// their pre-computed authorization header.
pub(crate) async fn perform(params: &HttpRequestParameters) -> Result<HttpResponse, ExecutorError> {
    send_request(params, &params.headers, &params.authorization_header).await
}

async fn send_request(
    params: &HttpRequestParameters,
    headers: &HashMap<String, String>,
    auth_header: &str,
) -> Result<HttpResponse, ExecutorError> {
    let client = client::build_client(params.timeout, &params.cert_auth)?;
    let method = reqwest::Method::from_bytes(params.method.as_bytes()).map_err(|_| {
        ExecutorError::NonRetryable(format!("'{}' is not a valid HTTP method", params.method))
    })?;

    let mut request = client.request(method.clone(), &params.url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    if !auth_header.is_empty() {
        request = request.header(AUTHORIZATION_HEADER_NAME, auth_header);
    }
    request = request.body(params.body.clone());

    println!(
        "{}",
        format!("executing request {} {}...", method, params.url).cyan()
    );
    let started = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) if err.is_timeout() => return timed_out(params),
        Err(err) => {
            return Err(ExecutorError::NonRetryable(format!(
                "failed to execute HTTP request: {err}"
            )));
        }
    };
    let time = started.elapsed().as_millis() as i64;

    let status = response.status().as_u16();
    let headers = response::join_headers(response.headers());
    let final_url = response.url().to_string();
    let content = match response.text().await {
        Ok(content) => content,
        Err(err) if err.is_timeout() => return timed_out(params),
        Err(err) => {
            return Err(ExecutorError::NonRetryable(format!(
                "failed to read HTTP response body: {err}"
            )));
        }
    };

    Ok(HttpResponse {
        url: final_url,
        method: params.method.clone(),
        size_in_bytes: content.len() as u64,
        content,
        headers,
        status_code: status.to_string(),
        time,
        response_body_transformer: params.response_body_transformer.clone(),
        successful: response::is_successful(status, &params.success_response_codes)?,
    })
}

fn timed_out(params: &HttpRequestParameters) -> Result<HttpResponse, ExecutorError> {
    if params.succeed_on_timeout {
        return Ok(HttpResponse::timed_out(&params.url, &params.method));
    }
    Err(ExecutorError::Retryable(format!(
        "HTTP request timed out after {} seconds",
        params.timeout.as_secs()
    )))
}

fn request_failed_error(response: &HttpResponse) -> String {
    let reason = response
        .status_code
        .parse::<u16>()
        .ok()
        .and_then(|code| reqwest::StatusCode::from_u16(code).ok())
        .and_then(|code| code.canonical_reason())
        .unwrap_or("unknown");
    format!(
        "HTTP request failed\nReason: {}\nURL: {}\nMethod: {}\nResponse code: {}",
        reason, response.url, response.method, response.status_code
    )
}
