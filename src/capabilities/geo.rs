//! Platform location services as a Crux capability. The shell owns the
//! permission prompt, the GPS and the geocoder; the core only sees
//! [`GeoOperation`] requests and their [`GeoResult`] answers.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PositionOptions, WatchOptions};
use crate::model::{Coordinate, GeocodedAddress, PermissionStatus, PositionFix};

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum GeoError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location services disabled on this device")]
    ServicesDisabled,

    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    #[error("position request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl GeoError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum GeoOperation {
    RequestPermission,
    PermissionStatus,
    /// `options` are advisory; the shell applies them as best it can.
    CurrentPosition { options: PositionOptions },
    ReverseGeocode { coordinate: Coordinate },
    ForwardGeocode { query: String },
    /// Answered with the next fix of subscription `watch_id`. The shell keeps
    /// the platform subscription open until `StopWatch` names the same id.
    NextFix { watch_id: u64, options: WatchOptions },
    StopWatch { watch_id: u64 },
}

/// Geocoding answers carry every candidate the platform produced; an empty
/// list is a valid answer, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum GeoOutput {
    Permission(PermissionStatus),
    Position(PositionFix),
    Addresses(Vec<GeocodedAddress>),
    Coordinates(Vec<Coordinate>),
}

pub type GeoResult = Result<GeoOutput, GeoError>;

impl Operation for GeoOperation {
    type Output = GeoResult;
}

pub struct Geolocation<E> {
    context: CapabilityContext<GeoOperation, E>,
}

impl<Ev> Capability<Ev> for Geolocation<Ev> {
    type Operation = GeoOperation;
    type MappedSelf<MappedEv> = Geolocation<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Geolocation::new(self.context.map_event(f))
    }
}

impl<E> Geolocation<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<GeoOperation, E>) -> Self {
        Self { context }
    }

    pub fn request_permission<F>(&self, callback: F)
    where
        F: FnOnce(Result<PermissionStatus, GeoError>) -> E + Send + 'static,
    {
        self.request(GeoOperation::RequestPermission, permission, callback);
    }

    pub fn permission_status<F>(&self, callback: F)
    where
        F: FnOnce(Result<PermissionStatus, GeoError>) -> E + Send + 'static,
    {
        self.request(GeoOperation::PermissionStatus, permission, callback);
    }

    pub fn current_position<F>(&self, options: PositionOptions, callback: F)
    where
        F: FnOnce(Result<PositionFix, GeoError>) -> E + Send + 'static,
    {
        self.request(GeoOperation::CurrentPosition { options }, position, callback);
    }

    pub fn reverse_geocode<F>(&self, coordinate: Coordinate, callback: F)
    where
        F: FnOnce(Result<Vec<GeocodedAddress>, GeoError>) -> E + Send + 'static,
    {
        self.request(GeoOperation::ReverseGeocode { coordinate }, addresses, callback);
    }

    pub fn forward_geocode<F>(&self, query: String, callback: F)
    where
        F: FnOnce(Result<Vec<Coordinate>, GeoError>) -> E + Send + 'static,
    {
        self.request(GeoOperation::ForwardGeocode { query }, coordinates, callback);
    }

    pub fn next_fix<F>(&self, watch_id: u64, options: WatchOptions, callback: F)
    where
        F: FnOnce(Result<PositionFix, GeoError>) -> E + Send + 'static,
    {
        self.request(GeoOperation::NextFix { watch_id, options }, position, callback);
    }

    pub fn stop_watch(&self, watch_id: u64) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .notify_shell(GeoOperation::StopWatch { watch_id })
                .await;
        });
    }

    fn request<T, F>(
        &self,
        operation: GeoOperation,
        extract: fn(GeoOutput) -> Result<T, GeoError>,
        callback: F,
    ) where
        T: Send + 'static,
        F: FnOnce(Result<T, GeoError>) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let answer = context.request_from_shell(operation).await;
            context.update_app(callback(answer.and_then(extract)));
        });
    }
}

fn unexpected(output: &GeoOutput) -> GeoError {
    GeoError::unavailable(format!("unexpected shell answer {output:?}"))
}

fn permission(output: GeoOutput) -> Result<PermissionStatus, GeoError> {
    match output {
        GeoOutput::Permission(status) => Ok(status),
        other => Err(unexpected(&other)),
    }
}

fn position(output: GeoOutput) -> Result<PositionFix, GeoError> {
    match output {
        GeoOutput::Position(fix) => Ok(fix),
        other => Err(unexpected(&other)),
    }
}

fn addresses(output: GeoOutput) -> Result<Vec<GeocodedAddress>, GeoError> {
    match output {
        GeoOutput::Addresses(found) => Ok(found),
        other => Err(unexpected(&other)),
    }
}

fn coordinates(output: GeoOutput) -> Result<Vec<Coordinate>, GeoError> {
    match output {
        GeoOutput::Coordinates(found) => Ok(found),
        other => Err(unexpected(&other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_answer_is_an_error() {
        let answer = addresses(GeoOutput::Permission(PermissionStatus::Granted));
        assert!(matches!(answer, Err(GeoError::Unavailable { .. })));
    }

    #[test]
    fn test_operation_json_shape() {
        let op = GeoOperation::ForwardGeocode {
            query: "Hauz Khas".into(),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"ForwardGeocode":{"query":"Hauz Khas"}}"#);
    }
}
