use tracing::{debug, info};

use crate::capabilities::Capabilities;
use crate::event::Event;
use crate::home::{greeting, LocationHeader};
use crate::location::{AddressPurpose, Commit, CoordinatePurpose, FixPurpose, LocationWrite};
use crate::model::{LocationRecord, Model, ViewModel};
use crate::search::SearchResult;

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[allow(clippy::too_many_lines)]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let event_name = event.name();
        if event.is_user_initiated() {
            info!(event = event_name, "user action");
        } else {
            debug!(event = event_name, "update");
        }

        match event {
            Event::Started => Self::load_saved(model, caps),
            Event::Configure(config) => model.config = config.sanitized(),
            Event::NavigationHandled => model.navigation = None,
            Event::AdvisoryDismissed => model.advisory = None,

            Event::PermissionRequested => Self::request_permission(caps, FixPurpose::Refresh),
            Event::PermissionCheckRequested => Self::check_permission(caps),
            Event::OnboardingAllowed => Self::onboarding_allowed(caps),
            Event::OnboardingSkipped => Self::onboarding_skipped(model, caps),

            Event::RefreshLocation { options } => {
                Self::refresh_location(model, caps, FixPurpose::Refresh, options);
            }
            Event::ResolveAddress { coordinate } => {
                Self::reverse_geocode(caps, coordinate, AddressPurpose::Lookup);
            }
            Event::GeocodeAddress { text } => {
                Self::forward_geocode(model, caps, &text, CoordinatePurpose::Lookup);
            }
            Event::UpdateLocation {
                coordinate,
                address,
            } => {
                let record = LocationRecord::new(coordinate, None);
                Self::commit(
                    model,
                    caps,
                    Commit::new(LocationWrite::Set(record), Some(address)),
                );
            }
            Event::SaveLocation { location, address } => {
                let location = location.map_or(LocationWrite::Keep, LocationWrite::Set);
                Self::commit(model, caps, Commit::new(location, address));
            }
            Event::StartWatching => Self::start_watching(model, caps),
            Event::StopWatching => Self::stop_watching(model, caps),
            Event::ClearLocationData => Self::clear_location_data(model, caps),

            Event::EnsureLocation => Self::ensure_location(model, caps),
            Event::OpenLocationPicker => Self::open_location_picker(model),
            Event::OpenMapPicker => Self::open_map_picker(model),

            Event::SearchQueryChanged { text } => Self::search_query_changed(model, caps, text),
            Event::SearchSubmitted { text } => Self::search_submitted(model, caps, text),
            Event::SearchCancelled => Self::search_cancelled(model, caps),
            Event::ResultSelected(result) => Self::select_result(model, caps, *result),
            Event::UseCurrentLocation => Self::use_current_location(model, caps),
            Event::ClearRecentSearches => Self::clear_recent(model, caps),

            Event::PinMoved { coordinate } => Self::pin_moved(model, caps, coordinate),
            Event::PinConfirmed => Self::confirm_pin(model, caps),

            Event::Loaded { key, response } => {
                Self::saved_value_loaded(model, caps, key, response);
            }
            Event::Written { key, response } => Self::value_written(model, key, response),
            Event::PermissionAnswered { purpose, result } => {
                Self::permission_answered(model, caps, purpose, result);
            }
            Event::PermissionChecked { result } => Self::permission_checked(model, result),
            Event::FixPermissionChecked {
                purpose,
                options,
                result,
            } => Self::fix_permission_checked(model, caps, purpose, options, result),
            Event::PositionAnswered { purpose, result } => {
                Self::position_answered(model, caps, purpose, result);
            }
            Event::AddressesResolved {
                purpose,
                coordinate,
                result,
            } => Self::addresses_resolved(model, caps, purpose, coordinate, result),
            Event::CoordinatesResolved { purpose, result } => {
                Self::coordinates_resolved(model, caps, purpose, result);
            }
            Event::LocationStored { commit, response } => {
                Self::location_stored(model, caps, commit, response);
            }
            Event::AddressStored {
                commit,
                restore,
                response,
            } => Self::address_stored(model, caps, commit, restore, response),
            Event::LocationRestored { response } => Self::location_restored(response),
            Event::Cleared { key, response } => Self::cleared(model, key, response),
            Event::DebounceElapsed {
                generation,
                query,
                output,
            } => Self::debounce_elapsed(model, caps, generation, query, output),
            Event::SearchCandidates {
                generation,
                query,
                result,
            } => Self::search_candidates(model, caps, generation, query, result),
            Event::CandidateResolved {
                generation,
                index,
                result,
            } => Self::candidate_resolved(model, generation, index, result),
            Event::WatchFix { watch_id, result } => Self::watch_fix(model, caps, watch_id, result),
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let snapshot = model.snapshot();
        ViewModel {
            header: LocationHeader::from_snapshot(&snapshot),
            greeting: greeting(model.profile.as_ref()),
            show_onboarding: model.is_loaded() && !model.permission_asked,
            permission: model.permission,
            location: snapshot.location,
            address: snapshot.address,
            search: model.search.state.clone(),
            recent: model.recent.iter().map(SearchResult::from_recent).collect(),
            map_center: model.pin.coordinate.unwrap_or_else(|| model.map_center()),
            pin: model.pin.clone(),
            geocoded: model.geocoded,
            watching: model.watch.active,
            navigation: model.navigation,
            advisory: model.advisory.map(str::to_string),
        }
    }
}
