use std::fmt::{Display, Formatter};

/// Kind of failure as reported to error callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Status error, timeout, abort or transport failure
    Error,
    /// The body could not be decoded as the resolved data type
    ParseError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Error => "error",
            ErrorKind::ParseError => "parseerror",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    Xml(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AjaxError {
    #[error("request failed with status {status} ({status_text})")]
    Status { status: u16, status_text: String },

    #[error("timeout")]
    Timeout,

    #[error("abort")]
    Aborted,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl AjaxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AjaxError::Parse(_) => ErrorKind::ParseError,
            _ => ErrorKind::Error,
        }
    }

    /// The message handed to error callbacks next to the kind: the status text for HTTP
    /// failures, `timeout` or `abort` for cancelled requests, the decoder error otherwise.
    pub fn message(&self) -> String {
        match self {
            AjaxError::Status { status_text, .. } => status_text.clone(),
            AjaxError::Transport(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_callback_strings() {
        assert_eq!(AjaxError::Timeout.kind().as_str(), "error");
        assert_eq!(AjaxError::Aborted.kind(), ErrorKind::Error);

        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = AjaxError::from(ParseError::from(json_err));
        assert_eq!(err.kind().as_str(), "parseerror");
        assert!(err.message().starts_with("invalid JSON"));
    }

    #[test]
    fn messages_follow_xhr_conventions() {
        assert_eq!(AjaxError::Timeout.message(), "timeout");
        assert_eq!(AjaxError::Aborted.message(), "abort");

        let err = AjaxError::Status { status: 404, status_text: "Not Found".into() };
        assert_eq!(err.message(), "Not Found");
        assert_eq!(err.to_string(), "request failed with status 404 (Not Found)");
    }
}
