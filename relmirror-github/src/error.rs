//! Error types for relmirror-github.

use std::path::PathBuf;

use thiserror::Error;

use relmirror_sync::ApiError;

#[derive(Debug, Error)]
pub enum GithubError {
    /// The server answered with a non-success status.
    #[error("{method} {url} returned HTTP {status}: {message}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        message: String,
    },

    #[error("{method} {url} failed: {message}")]
    Transport {
        method: &'static str,
        url: String,
        message: String,
    },

    #[error("could not decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected response from {url}: {message}")]
    Unexpected { url: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GithubError {
    /// Split a `ureq` failure into a status or transport error.
    pub(crate) fn from_ureq(method: &'static str, url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .ok()
                    .and_then(|body| error_message(&body))
                    .unwrap_or_else(|| "no message".to_string());
                GithubError::Status {
                    method,
                    url: url.to_string(),
                    status,
                    message,
                }
            }
            ureq::Error::Transport(transport) => GithubError::Transport {
                method,
                url: url.to_string(),
                message: transport.to_string(),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GithubError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pull `message` out of a GitHub JSON error body, falling back to the raw
/// body when it is not JSON.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| Some(body.to_string())),
        Err(_) => Some(body.to_string()),
    }
}

impl From<GithubError> for ApiError {
    fn from(err: GithubError) -> Self {
        match err {
            GithubError::Status { status: 404, url, .. } => ApiError::NotFound(url),
            GithubError::Status { status, .. } => ApiError::Status {
                status,
                message: err.to_string(),
            },
            GithubError::Transport { .. } => ApiError::Transport(err.to_string()),
            GithubError::Decode { .. } | GithubError::Unexpected { .. } => {
                ApiError::Decode(err.to_string())
            }
            GithubError::Io { path, source } => ApiError::Io { path, source },
        }
    }
}
