//! Error kinds surfaced by the tracker and the codec.

/// Errors reported by route capture.
///
/// Sensor and store failures are never returned from the timer or the
/// sensor pump; they are captured as the tracker's last error instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("position sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("location authorization denied")]
    AuthorizationDenied,

    #[error("location authorization restricted")]
    AuthorizationRestricted,

    /// Fix rejected by the accuracy filter. Logged, not surfaced.
    #[error("fix accuracy {accuracy_m} m rejected")]
    InaccurateFix { accuracy_m: f64 },

    #[error("route store persist failed: {0}")]
    StorePersistFailed(String),

    #[error("malformed encoded route at byte {position}")]
    MalformedEncodedRoute { position: usize },
}

impl Error {
    /// Authorization errors should send the user to system settings.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::AuthorizationDenied | Error::AuthorizationRestricted)
    }
}

/// Failure reported by a [`RouteStore`](crate::traits::RouteStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("invalid base url: {0}")]
    InvalidUrl(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::StorePersistFailed(err.to_string())
    }
}
