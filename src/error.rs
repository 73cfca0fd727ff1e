use std::time::Duration;

use derive_more::Display;
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure surfaced by this crate.
///
/// `Transport` and `Api` are the only kinds a remote round trip can produce. Handles never wrap
/// or swallow them, so the caller always sees the kind the underlying call produced. The other
/// variants come from configuration loading or from limits the caller opted into on
/// [`crate::backtest::WaitOptions`].
#[derive(Debug, Display)]
pub enum Error {
    /// Network or HTTP layer failure: connection refused, timeout, non-2xx status, or a body that
    /// could not be decoded into a well-formed envelope.
    #[display("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// Well-formed envelope with `success: false`. Carries the remote `errors` field verbatim.
    #[display("api error: {_0}")]
    Api(Value),
    #[display("config error: {_0}")]
    Config(String),
    #[display("backtest still pending after {attempts} reads")]
    WaitExhausted { attempts: u32 },
    #[display("backtest still pending after {elapsed:?}")]
    WaitTimeout { elapsed: Duration },
    #[display("wait cancelled")]
    Cancelled,
}

impl std::error::Error for Error {}

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn malformed(route: &str, detail: impl std::fmt::Display) -> Self {
        Error::transport(format!("malformed response from {route}: {detail}"))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    pub fn is_api(&self) -> bool {
        matches!(self, Error::Api(_))
    }

    /// The remote-reported error detail, if this is an `Api` error.
    pub fn api_errors(&self) -> Option<&Value> {
        match self {
            Error::Api(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
