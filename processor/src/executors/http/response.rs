use crate::executors::ExecutorError;
use serde::Serialize;
use std::collections::HashMap;

pub const TIMED_OUT_STATUS: &str = "-1";

/// The serialized view of one HTTP exchange, shipped back to the control
/// plane inside the task output map.
#[derive(Debug, Clone, Serialize)]
pub struct HttpResponse {
    pub url: String,
    pub method: String,
    #[serde(rename = "body")]
    pub content: String,
    pub headers: HashMap<String, String>,
    #[serde(rename = "status")]
    pub status_code: String,
    #[serde(rename = "size")]
    pub size_in_bytes: u64,
    /// Milliseconds between sending the request and the first response byte.
    pub time: i64,
    #[serde(rename = "responseBodyTransformer")]
    pub response_body_transformer: String,
    #[serde(skip)]
    pub successful: bool,
}

impl HttpResponse {
    /// Synthetic response for a client-side timeout with succeedOnTimeout.
    pub fn timed_out(url: &str, method: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            content: String::new(),
            headers: HashMap::new(),
            status_code: TIMED_OUT_STATUS.to_string(),
            size_in_bytes: 0,
            time: 0,
            response_body_transformer: String::new(),
            successful: true,
        }
    }

    /// Output-map form: string fields verbatim, everything else
    /// JSON-encoded.
    pub fn to_output_map(&self) -> HashMap<String, String> {
        let mut output = HashMap::new();
        output.insert("url".to_string(), self.url.clone());
        output.insert("method".to_string(), self.method.clone());
        output.insert("body".to_string(), self.content.clone());
        output.insert(
            "headers".to_string(),
            serde_json::to_string(&self.headers).unwrap_or_else(|_| "{}".to_string()),
        );
        output.insert("status".to_string(), self.status_code.clone());
        output.insert("size".to_string(), self.size_in_bytes.to_string());
        output.insert("time".to_string(), self.time.to_string());
        output.insert(
            "responseBodyTransformer".to_string(),
            self.response_body_transformer.clone(),
        );
        output
    }
}

/// A status code is successful iff it equals a literal entry or its class
/// matches an `Nxx` mask.
pub fn is_successful(status: u16, success_codes: &[String]) -> Result<bool, ExecutorError> {
    for code in success_codes {
        let matched = if code.contains('x') {
            let class: u16 = code[..1].parse().map_err(|_| invalid_code(code))?;
            status / 100 == class
        } else {
            let literal: u16 = code.parse().map_err(|_| invalid_code(code))?;
            status == literal
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

fn invalid_code(code: &str) -> ExecutorError {
    ExecutorError::NonRetryable(format!("'{code}' is not a valid success response code"))
}

/// Response headers keyed by name, multi-valued headers joined with ", ".
pub fn join_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut joined: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).to_string();
        joined
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn class_masks_match_their_whole_class() {
        let set = codes(&["2xx"]);
        assert!(is_successful(200, &set).unwrap());
        assert!(is_successful(204, &set).unwrap());
        assert!(is_successful(299, &set).unwrap());
        assert!(!is_successful(300, &set).unwrap());
        assert!(!is_successful(404, &set).unwrap());
    }

    #[test]
    fn literals_match_exactly() {
        let set = codes(&["404", "5xx"]);
        assert!(is_successful(404, &set).unwrap());
        assert!(is_successful(503, &set).unwrap());
        assert!(!is_successful(403, &set).unwrap());
        assert!(!is_successful(200, &set).unwrap());
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert!(is_successful(200, &codes(&["abc"])).is_err());
        assert!(is_successful(200, &codes(&["xxx"])).is_err());
    }

    #[test]
    fn multi_valued_headers_are_comma_joined() {
        let mut headers = HeaderMap::new();
        let name = HeaderName::from_static("set-cookie");
        headers.append(&name, HeaderValue::from_static("a=1"));
        headers.append(&name, HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let joined = join_headers(&headers);
        assert_eq!(joined.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(
            joined.get("content-type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn output_map_stringifies_numeric_fields() {
        let mut response = HttpResponse::timed_out("http://host/x", "GET");
        response.content = "hello".to_string();
        response.size_in_bytes = 5;
        response.time = 12;
        let output = response.to_output_map();
        assert_eq!(output.get("status").map(String::as_str), Some("-1"));
        assert_eq!(output.get("size").map(String::as_str), Some("5"));
        assert_eq!(output.get("time").map(String::as_str), Some("12"));
        assert_eq!(output.get("body").map(String::as_str), Some("hello"));
        assert_eq!(output.get("headers").map(String::as_str), Some("{}"));
    }
}
