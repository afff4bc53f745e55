use crate::capabilities::{GeoError, KvResponse, StorageKey, TimerOutput};
use crate::config::{LocationConfig, PositionOptions};
use crate::location::{AddressPurpose, Commit, CoordinatePurpose, FixPurpose};
use crate::model::{
    Address, Coordinate, GeocodedAddress, LocationRecord, PermissionStatus, PositionFix,
};
use crate::search::SearchResult;

#[derive(Debug, Clone)]
pub enum Event {
    // --- Lifecycle ---
    /// Loads every saved key. Send once at launch.
    Started,
    Configure(LocationConfig),
    NavigationHandled,
    AdvisoryDismissed,

    // --- Permission and onboarding ---
    PermissionRequested,
    PermissionCheckRequested,
    OnboardingAllowed,
    OnboardingSkipped,

    // --- Location ---
    RefreshLocation {
        options: Option<PositionOptions>,
    },
    ResolveAddress {
        coordinate: Coordinate,
    },
    GeocodeAddress {
        text: String,
    },
    UpdateLocation {
        coordinate: Coordinate,
        address: Address,
    },
    SaveLocation {
        location: Option<LocationRecord>,
        address: Option<Address>,
    },
    StartWatching,
    StopWatching,
    ClearLocationData,

    // --- Home ---
    EnsureLocation,
    OpenLocationPicker,
    OpenMapPicker,

    // --- Search picker ---
    SearchQueryChanged {
        text: String,
    },
    SearchSubmitted {
        text: String,
    },
    SearchCancelled,
    ResultSelected(Box<SearchResult>),
    UseCurrentLocation,
    ClearRecentSearches,

    // --- Map picker ---
    PinMoved {
        coordinate: Coordinate,
    },
    PinConfirmed,

    // --- Shell answers ---
    Loaded {
        key: StorageKey,
        response: KvResponse,
    },
    Written {
        key: StorageKey,
        response: KvResponse,
    },
    PermissionAnswered {
        purpose: FixPurpose,
        result: Result<PermissionStatus, GeoError>,
    },
    PermissionChecked {
        result: Result<PermissionStatus, GeoError>,
    },
    FixPermissionChecked {
        purpose: FixPurpose,
        options: PositionOptions,
        result: Result<PermissionStatus, GeoError>,
    },
    PositionAnswered {
        purpose: FixPurpose,
        result: Result<PositionFix, GeoError>,
    },
    AddressesResolved {
        purpose: AddressPurpose,
        coordinate: Coordinate,
        result: Result<Vec<GeocodedAddress>, GeoError>,
    },
    CoordinatesResolved {
        purpose: CoordinatePurpose,
        result: Result<Vec<Coordinate>, GeoError>,
    },
    LocationStored {
        commit: Box<Commit>,
        response: KvResponse,
    },
    AddressStored {
        commit: Box<Commit>,
        /// Value to put back under `user_location` if this write failed.
        restore: Option<Option<Vec<u8>>>,
        response: KvResponse,
    },
    LocationRestored {
        response: KvResponse,
    },
    Cleared {
        key: StorageKey,
        response: KvResponse,
    },
    DebounceElapsed {
        generation: u64,
        query: String,
        output: TimerOutput,
    },
    SearchCandidates {
        generation: u64,
        query: String,
        result: Result<Vec<Coordinate>, GeoError>,
    },
    CandidateResolved {
        generation: u64,
        index: usize,
        result: Result<Vec<GeocodedAddress>, GeoError>,
    },
    WatchFix {
        watch_id: u64,
        result: Result<PositionFix, GeoError>,
    },
}

impl Event {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Configure(_) => "configure",
            Self::NavigationHandled => "navigation_handled",
            Self::AdvisoryDismissed => "advisory_dismissed",
            Self::PermissionRequested => "permission_requested",
            Self::PermissionCheckRequested => "permission_check_requested",
            Self::OnboardingAllowed => "onboarding_allowed",
            Self::OnboardingSkipped => "onboarding_skipped",
            Self::RefreshLocation { .. } => "refresh_location",
            Self::ResolveAddress { .. } => "resolve_address",
            Self::GeocodeAddress { .. } => "geocode_address",
            Self::UpdateLocation { .. } => "update_location",
            Self::SaveLocation { .. } => "save_location",
            Self::StartWatching => "start_watching",
            Self::StopWatching => "stop_watching",
            Self::ClearLocationData => "clear_location_data",
            Self::EnsureLocation => "ensure_location",
            Self::OpenLocationPicker => "open_location_picker",
            Self::OpenMapPicker => "open_map_picker",
            Self::SearchQueryChanged { .. } => "search_query_changed",
            Self::SearchSubmitted { .. } => "search_submitted",
            Self::SearchCancelled => "search_cancelled",
            Self::ResultSelected(_) => "result_selected",
            Self::UseCurrentLocation => "use_current_location",
            Self::ClearRecentSearches => "clear_recent_searches",
            Self::PinMoved { .. } => "pin_moved",
            Self::PinConfirmed => "pin_confirmed",
            Self::Loaded { .. } => "loaded",
            Self::Written { .. } => "written",
            Self::PermissionAnswered { .. } => "permission_answered",
            Self::PermissionChecked { .. } => "permission_checked",
            Self::FixPermissionChecked { .. } => "fix_permission_checked",
            Self::PositionAnswered { .. } => "position_answered",
            Self::AddressesResolved { .. } => "addresses_resolved",
            Self::CoordinatesResolved { .. } => "coordinates_resolved",
            Self::LocationStored { .. } => "location_stored",
            Self::AddressStored { .. } => "address_stored",
            Self::LocationRestored { .. } => "location_restored",
            Self::Cleared { .. } => "cleared",
            Self::DebounceElapsed { .. } => "debounce_elapsed",
            Self::SearchCandidates { .. } => "search_candidates",
            Self::CandidateResolved { .. } => "candidate_resolved",
            Self::WatchFix { .. } => "watch_fix",
        }
    }

    /// Sent by the shell on a user gesture, as opposed to an answer to one
    /// of the core's own requests.
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::PermissionRequested
                | Self::OnboardingAllowed
                | Self::OnboardingSkipped
                | Self::OpenLocationPicker
                | Self::OpenMapPicker
                | Self::SearchQueryChanged { .. }
                | Self::SearchSubmitted { .. }
                | Self::SearchCancelled
                | Self::ResultSelected(_)
                | Self::UseCurrentLocation
                | Self::ClearRecentSearches
                | Self::PinMoved { .. }
                | Self::PinConfirmed
        )
    }
}
