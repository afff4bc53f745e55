use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::LocationConfig;
use crate::distance::distance_between;
use crate::format::{format_address, format_distance};
use crate::home::LocationHeader;
use crate::location::WatchModel;
use crate::picker::PinState;
use crate::recent::RecentSearchEntry;
use crate::search::{SearchModel, SearchResult, SearchState};

/// A point as reported by the provider. Not range-checked: the provider is
/// trusted to hand back sane values.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `"28.61390, 77.20900"`, used where no address could be resolved.
    #[must_use]
    pub fn label(self) -> String {
        format!("{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Raw reverse-geocoding candidate as the platform returns it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeocodedAddress {
    pub name: Option<String>,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub district: Option<String>,
    pub subregion: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub iso_country_code: Option<String>,
}

impl GeocodedAddress {
    /// City, falling back to subregion then district.
    #[must_use]
    pub fn locality(&self) -> Option<&str> {
        non_empty(self.city.as_deref())
            .or_else(|| non_empty(self.subregion.as_deref()))
            .or_else(|| non_empty(self.district.as_deref()))
    }

    /// Display parts in most-specific-first order, empties and repeats removed.
    #[must_use]
    pub fn display_parts(&self) -> Vec<&str> {
        let candidates = [
            self.name.as_deref(),
            self.street.as_deref(),
            self.district.as_deref(),
            self.city.as_deref(),
            self.subregion.as_deref(),
            self.region.as_deref(),
            self.country.as_deref(),
        ];

        let mut parts: Vec<&str> = Vec::with_capacity(candidates.len());
        for part in candidates.into_iter().filter_map(non_empty) {
            if !parts.iter().any(|p| p.eq_ignore_ascii_case(part)) {
                parts.push(part);
            }
        }
        parts
    }
}

/// Persisted address. `formatted_address` is derived, never edited directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub formatted_address: Option<String>,
}

impl Address {
    #[must_use]
    pub fn from_geocoded(raw: &GeocodedAddress) -> Self {
        Self {
            street: raw.street.clone(),
            city: raw.city.clone(),
            region: raw.region.clone(),
            country: raw.country.clone(),
            postal_code: raw.postal_code.clone(),
            formatted_address: Some(format_address(raw)),
        }
    }

    /// Address carrying only a display label, for places that could not be
    /// resolved (custom search text, unresolvable map pins).
    #[must_use]
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            formatted_address: Some(label.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn display(&self) -> &str {
        non_empty(self.formatted_address.as_deref()).unwrap_or(crate::ADDRESS_NOT_AVAILABLE)
    }
}

/// The cached position with its accuracy and capture time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationRecord {
    #[must_use]
    pub fn new(coordinate: Coordinate, accuracy: Option<f64>) -> Self {
        Self {
            coordinate,
            accuracy,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn from_fix(fix: PositionFix) -> Self {
        Self {
            coordinate: fix.coordinate,
            accuracy: fix.accuracy,
            timestamp: fix.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// One position sample from the provider.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    pub accuracy: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The location/address pair every screen reads. `location: None` with an
/// address is the degraded address-only state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub location: Option<LocationRecord>,
    pub address: Option<Address>,
}

impl LocationSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.address.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    #[default]
    Undetermined,
}

impl PermissionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Undetermined => "undetermined",
        }
    }

    /// Unknown strings read back as `Undetermined`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Undetermined,
        }
    }

    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Screen {
    Onboarding,
    Home,
    Bookings,
    LocationSearch,
    MapPicker,
}

/// What the shell's navigator should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Navigation {
    Push(Screen),
    Replace(Screen),
    /// Pop until `Screen` is on top.
    BackTo(Screen),
}

/// Written by the auth flow; only read here.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    #[serde(alias = "user_id")]
    pub id: Option<String>,
    #[serde(alias = "username")]
    pub name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

impl UserProfile {
    /// Name, falling back to the local part of the email.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        non_empty(self.name.as_deref()).or_else(|| {
            non_empty(self.email.as_deref())
                .and_then(|email| email.split('@').next())
                .and_then(|local| non_empty(Some(local)))
        })
    }
}

// Redact debug output because this holds personal data.
impl fmt::Debug for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserProfile")
            .field("id", &self.id)
            .field("name_present", &self.name.is_some())
            .field("email_present", &self.email.is_some())
            .field("profile_picture_present", &self.profile_picture.is_some())
            .finish()
    }
}

/// Everything the core knows. Owned by the Crux runtime; only
/// `App::update` mutates it.
#[derive(Debug, Default)]
pub struct Model {
    pub config: LocationConfig,
    /// Last fix or picked place. Watch fixes land here without being saved.
    pub location: Option<LocationRecord>,
    pub address: Option<Address>,
    pub permission: PermissionStatus,
    pub permission_asked: bool,
    pub profile: Option<UserProfile>,
    pub recent: Vec<RecentSearchEntry>,
    pub search: SearchModel,
    pub pin: PinState,
    pub watch: WatchModel,
    /// Answer to the last standalone forward-geocode lookup.
    pub geocoded: Option<Coordinate>,
    pub navigation: Option<Navigation>,
    pub advisory: Option<&'static str>,
    /// Saved keys still loading; `None` until `Started`.
    pub(crate) pending_loads: Option<usize>,
    pub(crate) ensure_after_load: bool,
}

impl Model {
    #[must_use]
    pub fn snapshot(&self) -> LocationSnapshot {
        LocationSnapshot {
            location: self.location.clone(),
            address: self.address.clone(),
        }
    }

    /// True once every saved key requested at start has been answered.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self.pending_loads, Some(0))
    }

    /// `"2.3 km"` from the user's location to `to`; `None` without a location.
    #[must_use]
    pub fn distance_label(&self, to: Coordinate) -> Option<String> {
        let here = self.location.as_ref()?;
        Some(format_distance(distance_between(here.coordinate, to)))
    }

    /// Where the map picker opens: the last known location, else the
    /// configured default region.
    #[must_use]
    pub fn map_center(&self) -> Coordinate {
        self.location
            .as_ref()
            .map_or(self.config.default_region, |record| record.coordinate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub header: LocationHeader,
    pub greeting: String,
    pub show_onboarding: bool,
    pub permission: PermissionStatus,
    pub location: Option<LocationRecord>,
    pub address: Option<Address>,
    pub search: SearchState,
    pub recent: Vec<SearchResult>,
    pub map_center: Coordinate,
    pub pin: PinState,
    pub geocoded: Option<Coordinate>,
    pub watching: bool,
    pub navigation: Option<Navigation>,
    pub advisory: Option<String>,
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
