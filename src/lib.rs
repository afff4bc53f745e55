//! Location management for the marketplace client, as a Crux core.
//!
//! The shell answers three kinds of effects: `KeyValue` (the `crux_kv`
//! capability), [`Geolocation`] (permissions, fixes and geocoding) and
//! [`Timer`] (the search debounce). Everything else, the current location
//! and address, onboarding, the home header, both pickers and the recent
//! searches, is driven by [`Event`]s over the [`Model`] and read back
//! through the [`ViewModel`].

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod distance;
pub mod error;
pub mod event;
pub mod format;
pub mod home;
pub mod location;
pub mod model;
pub mod picker;
pub mod recent;
pub mod search;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use app::App;
pub use capabilities::{
    Capabilities, Effect, GeoError, GeoOperation, GeoOutput, Geolocation, KvBackend, KvError,
    MemoryKvStore, StorageKey, Timer, TimerOperation, TimerOutput,
};
#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use capabilities::SqliteKvStore;
pub use config::{Accuracy, LocationConfig, PositionOptions, SearchConfig, WatchOptions};
pub use crux_core::App as CruxApp;
pub use distance::{calculate_distance, distance_between, EARTH_RADIUS_KM};
pub use error::{ErrorKind, LocationError};
pub use event::Event;
pub use format::{format_address, format_distance};
pub use home::{greeting, LocationHeader, SELECT_LOCATION};
pub use location::{Commit, LocationWrite};
pub use model::{
    Address, Coordinate, GeocodedAddress, LocationRecord, LocationSnapshot, Model, Navigation,
    PermissionStatus, PositionFix, Screen, UserProfile, ViewModel,
};
pub use picker::PinState;
pub use recent::{push_recent, RecentSearchEntry};
pub use search::{SearchResult, SearchResultKind, SearchState};

/// Shown wherever an address is missing or formats to nothing.
pub const ADDRESS_NOT_AVAILABLE: &str = "Address not available";
