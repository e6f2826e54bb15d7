use thiserror::Error;

/// HTTP error classification
#[derive(Error, Debug, Clone)]
pub enum HttpErrorKind {
    #[error("Client error (code: {status:?}): {message}")]
    Client { status: Option<u16>, message: String },
    #[error("Server error: {message}")]
    Server { message: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Parsing and deserialization errors
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("JSON error: {0}")]
    Json(String),
    #[error("Base64 error: {0}")]
    Base64(String),
    #[error("Invalid radio reference: {0}")]
    RadioRef(String),
    #[error("Unexpected payload shape: {0}")]
    PayloadShape(String),
}

/// Main service error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// HTTP error with status code and classification
    #[error("HTTP error (status {status}): {kind}")]
    Http { status: u16, kind: HttpErrorKind },

    /// Generic request error (connect failure, timeout, body read)
    #[error("Generic request error: {0}")]
    GenericRequest(String),

    /// Record or payload failed to parse
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Gateway client has no endpoint for the requested service
    #[error("No endpoint known for service '{0}'")]
    ServiceNotDiscovered(String),

    /// Gateway login has not completed
    #[error("Gateway client not authenticated")]
    NotAuthenticated,

    /// A run was rejected because one is already in flight
    #[error("Optimization already in progress for zone '{zone}' ({category})")]
    AlreadyRunning { zone: String, category: String },

    /// Unknown algorithm ID
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Unknown zone
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    /// Service configuration error (missing file, bad shape)
    #[error("Config error: {0}")]
    Config(String),

    /// Device has no usable data for the requested operation
    #[error("Device {0}: no data")]
    NoDeviceData(String),
}

impl Error {
    /// Whether a retry on the next tick may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::GenericRequest(_)
                | Error::Http {
                    kind: HttpErrorKind::Server { .. } | HttpErrorKind::Transport(_),
                    ..
                }
                | Error::NotAuthenticated
                | Error::ServiceNotDiscovered(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(ParseError::Json(e.to_string()))
    }
}
