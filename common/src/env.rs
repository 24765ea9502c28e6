use thiserror::Error;

#[derive(Debug, Error)]
#[error("required environment variable '{0}' is not set")]
pub struct MissingEnv(pub &'static str);

/// Reads an environment variable, treating blank values as absent.
pub fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required(key: &'static str) -> Result<String, MissingEnv> {
    optional(key).ok_or(MissingEnv(key))
}

pub fn is_set(key: &str) -> bool {
    optional(key).is_some()
}
