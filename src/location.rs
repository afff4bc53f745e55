//! The single authority for "where is the user".
//!
//! The model's `location` / `address` pair is kept in step with the
//! `user_location` / `user_address` keys.
//!
//! Explicit writes go through [`Commit`]. Writes go to the store first and
//! the model only advances once every write of the commit succeeded. When
//! the address write fails the location key is put back to the value the
//! first write replaced, so a failed commit leaves both the model and the
//! store where they were.
//!
//! Live fixes are different: a fresh fix always lands in the model, and
//! saving it is best effort. Fixes pushed by an active watch are never
//! saved at all.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::capabilities::{
    decode, decode_text, encode, Capabilities, GeoError, KvError, KvResponse, StorageKey,
};
use crate::config::PositionOptions;
use crate::error::LocationError;
use crate::event::Event;
use crate::model::{
    Address, Coordinate, GeocodedAddress, LocationRecord, Model, Navigation, PermissionStatus,
    PositionFix, Screen, UserProfile,
};
use crate::recent::RecentSearchEntry;
use crate::search::SearchResult;

const ASKED_SENTINEL: &str = "true";

/// What a position fix is for, carried through the permission and fix
/// requests so the answer knows how to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixPurpose {
    /// Plain refresh of the current location.
    Refresh,
    /// Onboarding "allow": always lands on home once the prompt is answered.
    Onboarding,
    /// Home needs an address; the fix is reverse-geocoded and saved.
    Home,
    /// "Use my current location" in the picker.
    Selection,
}

impl FixPurpose {
    /// Whether a denied or failed prompt should surface an alert.
    const fn alerts(self) -> bool {
        !matches!(self, Self::Refresh)
    }
}

#[derive(Debug, Clone)]
pub enum AddressPurpose {
    /// Standalone lookup; the first candidate becomes the current address.
    Lookup,
    /// Same as `Lookup`, but a failure is not worth an alert.
    Home,
    Selection(LocationRecord),
    Pin { generation: u64 },
    Pick(Box<SearchResult>),
}

#[derive(Debug, Clone)]
pub enum CoordinatePurpose {
    Lookup,
    Pick(Box<SearchResult>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationWrite {
    Keep,
    Set(LocationRecord),
    /// Address-only pick: the location key is removed with the address write.
    Clear,
}

/// One all-or-nothing write of the location/address pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub location: LocationWrite,
    pub address: Option<Address>,
    /// Remembered in the recent list once the pair is saved.
    pub recent: Option<RecentSearchEntry>,
    pub back_home: bool,
}

impl Commit {
    #[must_use]
    pub fn new(location: LocationWrite, address: Option<Address>) -> Self {
        Self {
            location,
            address,
            recent: None,
            back_home: false,
        }
    }

    #[must_use]
    pub fn back_home(mut self) -> Self {
        self.back_home = true;
        self
    }

    #[must_use]
    pub fn with_recent(mut self, entry: RecentSearchEntry) -> Self {
        self.recent = Some(entry);
        self
    }
}

#[derive(Debug, Default)]
pub struct WatchModel {
    pub active: bool,
    pub(crate) id: u64,
}

impl App {
    // ------------------------------------------------------------------
    // Saved state
    // ------------------------------------------------------------------

    pub(crate) fn load_saved(model: &mut Model, caps: &Capabilities) {
        model.pending_loads = Some(StorageKey::ALL.len());
        for key in StorageKey::ALL {
            caps.kv.get(key.as_str().to_string(), move |response| Event::Loaded {
                key,
                response,
            });
        }
    }

    /// Absent, unreadable or corrupt values load as missing. Loaded values
    /// never replace anything the model already learned since launch.
    pub(crate) fn saved_value_loaded(
        model: &mut Model,
        caps: &Capabilities,
        key: StorageKey,
        response: KvResponse,
    ) {
        match key {
            StorageKey::UserLocation => {
                if let Some(record) = read_or_warn::<LocationRecord>(key, response) {
                    model.location.get_or_insert(record);
                }
            }
            StorageKey::UserAddress => {
                if let Some(address) = read_or_warn::<Address>(key, response) {
                    model.address.get_or_insert(address);
                }
            }
            StorageKey::LocationPermission => {
                let saved = text_or_warn(key, response);
                if model.permission == PermissionStatus::Undetermined {
                    if let Some(raw) = saved {
                        model.permission = PermissionStatus::parse(&raw);
                    }
                }
            }
            StorageKey::LocationPermissionAsked => {
                let saved = text_or_warn(key, response);
                model.permission_asked |= saved.as_deref() == Some(ASKED_SENTINEL);
            }
            StorageKey::RecentLocationSearches => {
                let saved = read_or_warn::<Vec<RecentSearchEntry>>(key, response);
                if let (Some(mut list), true) = (saved, model.recent.is_empty()) {
                    list.truncate(model.config.search.max_recent);
                    model.recent = list;
                }
            }
            StorageKey::UserData => {
                model.profile = read_or_warn::<UserProfile>(key, response);
            }
        }

        if let Some(pending) = model.pending_loads.as_mut() {
            *pending = pending.saturating_sub(1);
        }
        if model.is_loaded() && std::mem::take(&mut model.ensure_after_load) {
            Self::ensure_location(model, caps);
        }
    }

    /// Result of a best-effort write that no state depends on.
    pub(crate) fn value_written(model: &mut Model, key: StorageKey, response: KvResponse) {
        match response {
            Ok(_) => {
                if key == StorageKey::LocationPermissionAsked {
                    model.permission_asked = true;
                }
                debug!(key = key.as_str(), "kv write");
            }
            Err(e) => {
                warn!(key = key.as_str(), error = ?e, "write failed");
            }
        }
    }

    fn write_text(caps: &Capabilities, key: StorageKey, value: &str) {
        caps.kv.set(
            key.as_str().to_string(),
            value.as_bytes().to_vec(),
            move |response| Event::Written { key, response },
        );
    }

    // ------------------------------------------------------------------
    // Permission
    // ------------------------------------------------------------------

    /// Asks for foreground permission; a grant goes on to fetch a fix for
    /// `purpose`.
    pub(crate) fn request_permission(caps: &Capabilities, purpose: FixPurpose) {
        caps.geolocation
            .request_permission(move |result| Event::PermissionAnswered { purpose, result });
    }

    /// The asked flag is written whatever the provider answers.
    pub(crate) fn permission_answered(
        model: &mut Model,
        caps: &Capabilities,
        purpose: FixPurpose,
        result: Result<PermissionStatus, GeoError>,
    ) {
        Self::write_text(caps, StorageKey::LocationPermissionAsked, ASKED_SENTINEL);

        if purpose == FixPurpose::Onboarding {
            model.navigation = Some(Navigation::Replace(Screen::Home));
        }

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "permission request failed");
                if purpose.alerts() {
                    model.advisory = Some(LocationError::from(e).user_facing_message());
                }
                return;
            }
        };

        model.permission = status;
        Self::write_text(caps, StorageKey::LocationPermission, status.as_str());
        info!(%status, "location permission resolved");

        if status.is_granted() {
            let purpose = match purpose {
                FixPurpose::Onboarding => FixPurpose::Refresh,
                other => other,
            };
            Self::fetch_position(caps, purpose, model.config.position);
        } else if purpose.alerts() {
            model.advisory = Some(LocationError::PermissionDenied.user_facing_message());
        }
    }

    /// Asks the provider, not the saved status.
    pub(crate) fn check_permission(caps: &Capabilities) {
        caps.geolocation
            .permission_status(|result| Event::PermissionChecked { result });
    }

    /// Provider errors read as "no permission".
    pub(crate) fn permission_checked(
        model: &mut Model,
        result: Result<PermissionStatus, GeoError>,
    ) {
        model.permission = result.unwrap_or_else(|e| {
            warn!(error = %e, "permission status check failed");
            PermissionStatus::Undetermined
        });
    }

    // ------------------------------------------------------------------
    // Position
    // ------------------------------------------------------------------

    /// Live fix for `purpose`. Missing permission or a provider failure
    /// falls back to the last known location. `options` default to the
    /// configured position options.
    pub(crate) fn refresh_location(
        model: &Model,
        caps: &Capabilities,
        purpose: FixPurpose,
        options: Option<PositionOptions>,
    ) {
        let options = options.unwrap_or(model.config.position);
        caps.geolocation
            .permission_status(move |result| Event::FixPermissionChecked {
                purpose,
                options,
                result,
            });
    }

    pub(crate) fn fix_permission_checked(
        model: &mut Model,
        caps: &Capabilities,
        purpose: FixPurpose,
        options: PositionOptions,
        result: Result<PermissionStatus, GeoError>,
    ) {
        match result {
            Ok(status) if status.is_granted() => Self::fetch_position(caps, purpose, options),
            _ if purpose == FixPurpose::Selection => Self::request_permission(caps, purpose),
            other => {
                warn!(answer = ?other, "no permission for a live fix, using last known location");
                let last_known = model.location.clone();
                Self::continue_with_fix(model, caps, purpose, last_known);
            }
        }
    }

    fn fetch_position(caps: &Capabilities, purpose: FixPurpose, options: PositionOptions) {
        caps.geolocation
            .current_position(options, move |result| Event::PositionAnswered { purpose, result });
    }

    /// A picker fix is saved by its own commit. Any other fix lands in the
    /// model at once; failing to save it only costs a log line.
    pub(crate) fn position_answered(
        model: &mut Model,
        caps: &Capabilities,
        purpose: FixPurpose,
        result: Result<PositionFix, GeoError>,
    ) {
        let record = match result {
            Ok(fix) => LocationRecord::from_fix(fix),
            Err(e) => {
                warn!(error = %e, "live position unavailable, using last known location");
                let last_known = model.location.clone();
                return Self::continue_with_fix(model, caps, purpose, last_known);
            }
        };

        debug!(
            latitude = record.coordinate.latitude,
            longitude = record.coordinate.longitude,
            "current location updated"
        );

        if purpose != FixPurpose::Selection {
            model.location = Some(record.clone());
            match encode(StorageKey::UserLocation, &record) {
                Ok(bytes) => caps.kv.set(
                    StorageKey::UserLocation.as_str().to_string(),
                    bytes,
                    |response| Event::Written {
                        key: StorageKey::UserLocation,
                        response,
                    },
                ),
                Err(e) => warn!(error = %e, "could not encode fix"),
            }
        }

        Self::continue_with_fix(model, caps, purpose, Some(record));
    }

    fn continue_with_fix(
        model: &mut Model,
        caps: &Capabilities,
        purpose: FixPurpose,
        record: Option<LocationRecord>,
    ) {
        match (purpose, record) {
            (FixPurpose::Refresh | FixPurpose::Onboarding, _) => {}
            (FixPurpose::Home, Some(record)) => {
                Self::reverse_geocode(caps, record.coordinate, AddressPurpose::Home);
            }
            (FixPurpose::Selection, Some(record)) => {
                let coordinate = record.coordinate;
                Self::reverse_geocode(caps, coordinate, AddressPurpose::Selection(record));
            }
            (FixPurpose::Home | FixPurpose::Selection, None) => {
                let error = LocationError::from(GeoError::unavailable("no position available"));
                model.advisory = Some(error.user_facing_message());
            }
        }
    }

    // ------------------------------------------------------------------
    // Geocoding
    // ------------------------------------------------------------------

    pub(crate) fn reverse_geocode(
        caps: &Capabilities,
        coordinate: Coordinate,
        purpose: AddressPurpose,
    ) {
        caps.geolocation
            .reverse_geocode(coordinate, move |result| Event::AddressesResolved {
                purpose,
                coordinate,
                result,
            });
    }

    pub(crate) fn addresses_resolved(
        model: &mut Model,
        caps: &Capabilities,
        purpose: AddressPurpose,
        coordinate: Coordinate,
        result: Result<Vec<GeocodedAddress>, GeoError>,
    ) {
        match purpose {
            AddressPurpose::Pin { generation } => {
                Self::pin_resolved(model, generation, first_candidate(result));
            }
            AddressPurpose::Pick(picked) => {
                let raw = first_candidate(result);
                Self::finish_pick(model, caps, *picked, coordinate, raw);
            }
            AddressPurpose::Selection(record) => {
                let address = first_candidate(result).map_or_else(
                    || Address::labelled(coordinate.label()),
                    |raw| Address::from_geocoded(&raw),
                );
                let commit = Commit::new(LocationWrite::Set(record), Some(address));
                Self::commit(model, caps, commit.back_home());
            }
            AddressPurpose::Lookup | AddressPurpose::Home => match result {
                Ok(candidates) => match candidates.first() {
                    Some(raw) => {
                        let address = Address::from_geocoded(raw);
                        Self::commit(model, caps, Commit::new(LocationWrite::Keep, Some(address)));
                    }
                    None => debug!("reverse geocoding returned no candidates"),
                },
                Err(e) if matches!(purpose, AddressPurpose::Home) => {
                    warn!(error = %e, "home location has no address");
                }
                Err(e) => {
                    error!(error = %e, "reverse geocoding failed");
                    model.advisory = Some(LocationError::from(e).user_facing_message());
                }
            },
        }
    }

    pub(crate) fn forward_geocode(
        model: &mut Model,
        caps: &Capabilities,
        text: &str,
        purpose: CoordinatePurpose,
    ) {
        let query = text.trim();
        if query.is_empty() {
            return Self::coordinates_resolved(model, caps, purpose, Ok(Vec::new()));
        }
        caps.geolocation
            .forward_geocode(query.to_string(), move |result| Event::CoordinatesResolved {
                purpose,
                result,
            });
    }

    pub(crate) fn coordinates_resolved(
        model: &mut Model,
        caps: &Capabilities,
        purpose: CoordinatePurpose,
        result: Result<Vec<Coordinate>, GeoError>,
    ) {
        match purpose {
            CoordinatePurpose::Lookup => match result {
                Ok(candidates) => model.geocoded = candidates.first().copied(),
                Err(e) => {
                    error!(error = %e, "forward geocoding failed");
                    model.geocoded = None;
                    model.advisory = Some(LocationError::from(e).user_facing_message());
                }
            },
            CoordinatePurpose::Pick(picked) => {
                let coordinate = match result {
                    Ok(candidates) => candidates.first().copied(),
                    Err(e) => {
                        warn!(error = %e, "could not geocode selected result");
                        None
                    }
                };
                Self::pick_resolved(model, caps, *picked, coordinate);
            }
        }
    }

    // ------------------------------------------------------------------
    // Explicit writes
    // ------------------------------------------------------------------

    /// Starts `commit`: location key first, then the address key.
    pub(crate) fn commit(model: &mut Model, caps: &Capabilities, commit: Commit) {
        let commit = Box::new(commit);
        let key = StorageKey::UserLocation.as_str().to_string();

        match &commit.location {
            LocationWrite::Keep => Self::store_address(model, caps, commit, None),
            LocationWrite::Clear => {
                caps.kv.delete(key, move |response| Event::LocationStored { commit, response });
            }
            LocationWrite::Set(record) => match encode(StorageKey::UserLocation, record) {
                Ok(bytes) => {
                    caps.kv.set(key, bytes, move |response| Event::LocationStored {
                        commit,
                        response,
                    });
                }
                Err(e) => Self::commit_failed(model, &e.into()),
            },
        }
    }

    pub(crate) fn location_stored(
        model: &mut Model,
        caps: &Capabilities,
        commit: Box<Commit>,
        response: KvResponse,
    ) {
        match response {
            Ok(previous) => Self::store_address(model, caps, commit, Some(previous)),
            Err(e) => Self::commit_failed(model, &KvError::from_shell(&e).into()),
        }
    }

    fn store_address(
        model: &mut Model,
        caps: &Capabilities,
        commit: Box<Commit>,
        restore: Option<Option<Vec<u8>>>,
    ) {
        let Some(address) = &commit.address else {
            return Self::finish_commit(model, caps, *commit);
        };

        match encode(StorageKey::UserAddress, address) {
            Ok(bytes) => caps.kv.set(
                StorageKey::UserAddress.as_str().to_string(),
                bytes,
                move |response| Event::AddressStored {
                    commit,
                    restore,
                    response,
                },
            ),
            Err(e) => {
                Self::restore_location(caps, restore);
                Self::commit_failed(model, &e.into());
            }
        }
    }

    pub(crate) fn address_stored(
        model: &mut Model,
        caps: &Capabilities,
        commit: Box<Commit>,
        restore: Option<Option<Vec<u8>>>,
        response: KvResponse,
    ) {
        match response {
            Ok(_) => Self::finish_commit(model, caps, *commit),
            Err(e) => {
                error!(error = ?e, "address write failed");
                Self::restore_location(caps, restore);
                Self::commit_failed(model, &KvError::from_shell(&e).into());
            }
        }
    }

    fn restore_location(caps: &Capabilities, restore: Option<Option<Vec<u8>>>) {
        let key = StorageKey::UserLocation.as_str().to_string();
        match restore {
            None => {}
            Some(Some(previous)) => {
                caps.kv.set(key, previous, |response| Event::LocationRestored { response });
            }
            Some(None) => {
                caps.kv.delete(key, |response| Event::LocationRestored { response });
            }
        }
    }

    pub(crate) fn location_restored(response: KvResponse) {
        if let Err(e) = response {
            error!(error = ?e, "failed to restore previous location");
        }
    }

    fn finish_commit(model: &mut Model, caps: &Capabilities, commit: Commit) {
        let Commit {
            location,
            address,
            recent,
            back_home,
        } = commit;

        match location {
            LocationWrite::Keep => {}
            LocationWrite::Set(record) => model.location = Some(record),
            LocationWrite::Clear => model.location = None,
        }
        if address.is_some() {
            model.address = address;
        }
        info!("location saved");

        if let Some(entry) = recent {
            Self::record_recent(model, caps, entry);
        }
        if back_home {
            model.navigation = Some(Navigation::BackTo(Screen::Home));
        }
    }

    fn commit_failed(model: &mut Model, error: &LocationError) {
        error!(error = %error, "location write failed");
        model.advisory = Some(error.user_facing_message());
    }

    // ------------------------------------------------------------------
    // Live tracking
    // ------------------------------------------------------------------

    /// Subscribes to pushed fixes, replacing any watch already running.
    pub(crate) fn start_watching(model: &mut Model, caps: &Capabilities) {
        Self::stop_watching(model, caps);
        model.watch.id += 1;
        model.watch.active = true;
        Self::next_fix(model, caps);
        info!(watch_id = model.watch.id, "location watch started");
    }

    fn next_fix(model: &Model, caps: &Capabilities) {
        let watch_id = model.watch.id;
        caps.geolocation
            .next_fix(watch_id, model.config.watch, move |result| Event::WatchFix {
                watch_id,
                result,
            });
    }

    /// Each pushed fix replaces the location in the model. Never saved.
    pub(crate) fn watch_fix(
        model: &mut Model,
        caps: &Capabilities,
        watch_id: u64,
        result: Result<PositionFix, GeoError>,
    ) {
        if !model.watch.active || watch_id != model.watch.id {
            debug!(watch_id, "dropping fix from a stopped watch");
            return;
        }

        match result {
            Ok(fix) => {
                model.location = Some(LocationRecord::from_fix(fix));
                Self::next_fix(model, caps);
            }
            Err(e) => {
                warn!(error = %e, "position stream closed by provider");
                model.watch.active = false;
            }
        }
    }

    pub(crate) fn stop_watching(model: &mut Model, caps: &Capabilities) {
        if !model.watch.active {
            return;
        }
        model.watch.active = false;
        caps.geolocation.stop_watch(model.watch.id);
        info!(watch_id = model.watch.id, "location watch stopped");
    }

    /// Stops tracking and forgets location, address and permission status,
    /// in the model and in the store.
    pub(crate) fn clear_location_data(model: &mut Model, caps: &Capabilities) {
        Self::stop_watching(model, caps);
        model.location = None;
        model.address = None;
        model.permission = PermissionStatus::Undetermined;

        for key in [
            StorageKey::UserLocation,
            StorageKey::UserAddress,
            StorageKey::LocationPermission,
        ] {
            caps.kv
                .delete(key.as_str().to_string(), move |response| Event::Cleared {
                    key,
                    response,
                });
        }
        info!("location data cleared");
    }

    pub(crate) fn cleared(model: &mut Model, key: StorageKey, response: KvResponse) {
        if let Err(e) = response {
            let error = LocationError::from(KvError::from_shell(&e));
            error!(key = key.as_str(), error = %error, "failed to clear saved value");
            model.advisory = Some(error.user_facing_message());
        }
    }
}

fn read_or_warn<T: serde::de::DeserializeOwned>(
    key: StorageKey,
    response: KvResponse,
) -> Option<T> {
    decode(key, response).unwrap_or_else(|e| {
        warn!(key = key.as_str(), error = %e, "discarding saved value");
        None
    })
}

fn text_or_warn(key: StorageKey, response: KvResponse) -> Option<String> {
    decode_text(key, response).unwrap_or_else(|e| {
        warn!(key = key.as_str(), error = %e, "discarding saved value");
        None
    })
}

fn first_candidate(result: Result<Vec<GeocodedAddress>, GeoError>) -> Option<GeocodedAddress> {
    match result {
        Ok(candidates) => candidates.into_iter().next(),
        Err(e) => {
            warn!(error = %e, "reverse geocoding failed");
            None
        }
    }
}
