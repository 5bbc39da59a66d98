use thiserror::Error;

/// Failures raised by an [`HttpTransport`](crate::transport::HttpTransport)
/// before a response was obtained.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// The network call itself failed (connectivity, auth, timeout).
    #[error("{operation}: transport failure")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// The call completed but the server answered with a non-success status
    /// where no absent result is possible.
    #[error("{operation}: server responded with status {status}")]
    UnsuccessfulResponse { operation: &'static str, status: u16 },

    #[error("{operation}: malformed response: {source}")]
    Parse {
        operation: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
}

impl ClientError {
    pub(crate) fn transport(operation: &'static str, source: TransportError) -> Self {
        Self::Transport { operation, source }
    }

    pub(crate) fn parse(operation: &'static str, source: ParseError) -> Self {
        Self::Parse { operation, source }
    }

    pub(crate) fn invalid(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
