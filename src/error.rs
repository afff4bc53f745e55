use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{GeoError, KvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    ProviderUnavailable,
    Storage,
    Serialization,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::PermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::ProviderUnavailable => "LOCATION_UNAVAILABLE",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location provider failed: {0}")]
    Provider(GeoError),

    #[error("storage failed: {0}")]
    Storage(#[from] KvError),
}

impl From<GeoError> for LocationError {
    fn from(e: GeoError) -> Self {
        match e {
            GeoError::PermissionDenied => Self::PermissionDenied,
            other => Self::Provider(other),
        }
    }
}

impl LocationError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::Provider(_) => ErrorKind::ProviderUnavailable,
            Self::Storage(KvError::Serialization { .. }) => ErrorKind::Serialization,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Static advisory text for alerts. Never includes error detail.
    #[must_use]
    pub const fn user_facing_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::PermissionDenied => {
                "Location access is required. Please enable location permissions in Settings."
            }
            ErrorKind::ProviderUnavailable => {
                "Unable to determine your location. Please check your GPS settings."
            }
            ErrorKind::Storage | ErrorKind::Serialization => {
                "We couldn't save your location. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StorageErrorCode;

    #[test]
    fn test_geo_permission_maps_to_permission_denied() {
        let err: LocationError = GeoError::PermissionDenied.into();
        assert_eq!(err, LocationError::PermissionDenied);
        assert_eq!(err.code(), "LOCATION_PERMISSION_DENIED");
    }

    #[test]
    fn test_provider_error_kind() {
        let err: LocationError = GeoError::Timeout { timeout_ms: 15_000 }.into();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err: LocationError =
            KvError::storage(StorageErrorCode::DiskFull, "disk /dev/sda1 is full").into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!err.user_facing_message().contains("sda1"));
    }
}
