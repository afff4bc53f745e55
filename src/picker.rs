//! The two location pickers: search list and map pin.
//!
//! Every confirmed pick is one [`Commit`] that ends back on home.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::App;
use crate::capabilities::Capabilities;
use crate::location::{AddressPurpose, Commit, CoordinatePurpose, FixPurpose, LocationWrite};
use crate::model::{Address, Coordinate, GeocodedAddress, LocationRecord, Model, Navigation, Screen};
use crate::recent::RecentSearchEntry;
use crate::search::{SearchResult, SearchState};

/// The map picker's pin. Its address is only shown until the pin is
/// confirmed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinState {
    pub coordinate: Option<Coordinate>,
    pub address: Option<Address>,
    pub resolving: bool,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl App {
    pub(crate) fn open_location_picker(model: &mut Model) {
        model.navigation = Some(Navigation::Push(Screen::LocationSearch));
    }

    /// Opens with a fresh pin at the map centre.
    pub(crate) fn open_map_picker(model: &mut Model) {
        let generation = model.pin.generation;
        model.pin = PinState {
            generation,
            ..PinState::default()
        };
        model.navigation = Some(Navigation::Push(Screen::MapPicker));
    }

    /// Resolves `result` to a coordinate and address, makes it the current
    /// location and remembers it in the recent list.
    ///
    /// A result that still has no coordinate after geocoding becomes an
    /// address-only location: the saved fix is removed with the address
    /// write, and nothing is added to the recent list.
    pub(crate) fn select_result(model: &mut Model, caps: &Capabilities, result: SearchResult) {
        Self::supersede_search(model, caps);
        model.search.state = SearchState::Idle;

        match result.coordinate {
            Some(coordinate) => Self::pick_resolved(model, caps, result, Some(coordinate)),
            None => {
                let text = result.main_text.clone();
                let purpose = CoordinatePurpose::Pick(Box::new(result));
                Self::forward_geocode(model, caps, &text, purpose);
            }
        }
    }

    pub(crate) fn pick_resolved(
        model: &mut Model,
        caps: &Capabilities,
        result: SearchResult,
        coordinate: Option<Coordinate>,
    ) {
        let Some(coordinate) = coordinate else {
            let address = result
                .address
                .unwrap_or_else(|| Address::labelled(result.main_text));
            info!("saving address-only location");
            let commit = Commit::new(LocationWrite::Clear, Some(address)).back_home();
            return Self::commit(model, caps, commit);
        };

        if result.raw_address.is_some() || result.address.is_some() {
            let raw = result.raw_address.clone();
            Self::finish_pick(model, caps, result, coordinate, raw);
        } else {
            Self::reverse_geocode(caps, coordinate, AddressPurpose::Pick(Box::new(result)));
        }
    }

    pub(crate) fn finish_pick(
        model: &mut Model,
        caps: &Capabilities,
        result: SearchResult,
        coordinate: Coordinate,
        raw: Option<GeocodedAddress>,
    ) {
        let address = result
            .address
            .or_else(|| raw.as_ref().map(Address::from_geocoded))
            .unwrap_or_else(|| Address::labelled(result.main_text.clone()));

        let entry = RecentSearchEntry::new(
            result.main_text,
            result.secondary_text,
            Some(coordinate),
            raw.as_ref(),
            address.clone(),
        );
        let record = LocationRecord::new(coordinate, None);
        let commit = Commit::new(LocationWrite::Set(record), Some(address))
            .with_recent(entry)
            .back_home();
        Self::commit(model, caps, commit);
    }

    /// "Use my current location". The fix record, with its accuracy and
    /// timestamp, is saved once together with its address.
    pub(crate) fn use_current_location(model: &Model, caps: &Capabilities) {
        Self::refresh_location(model, caps, FixPurpose::Selection, None);
    }

    /// Moves the pin and resolves its address. Only the newest pin's answer
    /// is kept.
    pub(crate) fn pin_moved(model: &mut Model, caps: &Capabilities, coordinate: Coordinate) {
        model.pin.generation += 1;
        model.pin.coordinate = Some(coordinate);
        model.pin.address = None;
        model.pin.resolving = true;

        let generation = model.pin.generation;
        Self::reverse_geocode(caps, coordinate, AddressPurpose::Pin { generation });
    }

    pub(crate) fn pin_resolved(model: &mut Model, generation: u64, raw: Option<GeocodedAddress>) {
        if generation != model.pin.generation {
            debug!("discarding address for superseded pin");
            return;
        }
        model.pin.address = raw.as_ref().map(Address::from_geocoded);
        model.pin.resolving = false;
    }

    /// Saves the pin with its resolved address, else the current address,
    /// else a label made of the raw coordinates. Without a pin the map
    /// centre is used.
    pub(crate) fn confirm_pin(model: &mut Model, caps: &Capabilities) {
        let coordinate = model.pin.coordinate.unwrap_or_else(|| model.map_center());
        let address = model
            .pin
            .address
            .clone()
            .or_else(|| model.address.clone())
            .unwrap_or_else(|| Address::labelled(coordinate.label()));

        info!("map pin confirmed");
        let record = LocationRecord::new(coordinate, None);
        let commit = Commit::new(LocationWrite::Set(record), Some(address)).back_home();
        Self::commit(model, caps, commit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::GeoError;
    use crate::config::LocationConfig;
    use crate::error::LocationError;
    use crate::event::Event;
    use crate::model::{PermissionStatus, PositionFix};
    use crate::search::SearchResultKind;
    use crate::testing::{address, GeoScript, Shell};

    fn geocoded(main: &str, coordinate: Coordinate, raw: GeocodedAddress) -> SearchResult {
        SearchResult {
            id: "geocoded-0".into(),
            kind: SearchResultKind::Geocoded,
            main_text: main.into(),
            secondary_text: "Delhi".into(),
            coordinate: Some(coordinate),
            raw_address: Some(raw),
            address: None,
        }
    }

    fn select(shell: &mut Shell, result: SearchResult) {
        shell.dispatch(Event::ResultSelected(Box::new(result)));
    }

    #[test]
    fn test_select_geocoded_result_updates_and_records() {
        let mut shell = Shell::started(GeoScript::new());
        let point = Coordinate::new(28.5245, 77.1855);

        select(
            &mut shell,
            geocoded("Qutub Minar", point, address("Mehrauli Road", "Delhi", "DL", "110030")),
        );

        let view = shell.view();
        assert_eq!(view.navigation, Some(Navigation::BackTo(Screen::Home)));
        assert_eq!(view.location.unwrap().coordinate, point);
        assert_eq!(
            view.address.unwrap().formatted_address.as_deref(),
            Some("Mehrauli Road, Delhi, DL, 110030")
        );
        assert_eq!(view.recent.len(), 1);
        assert_eq!(view.recent[0].main_text, "Qutub Minar");
        assert_eq!(view.recent[0].kind, SearchResultKind::Recent);
        assert!(shell.store().get_str("recent_location_searches").is_some());
    }

    #[test]
    fn test_select_custom_result_resolvable_by_geocoding() {
        let point = Coordinate::new(26.9124, 75.7873);
        let mut shell = Shell::started(
            GeoScript::new()
                .with_forward("Hawa Mahal", vec![point])
                .with_reverse(point, vec![address("Badi Choupad", "Jaipur", "RJ", "302002")]),
        );

        select(&mut shell, SearchResult::custom("Hawa Mahal"));

        let view = shell.view();
        assert_eq!(view.location.unwrap().coordinate, point);
        assert_eq!(view.header.title, "Jaipur");
        assert_eq!(view.recent.len(), 1);
    }

    #[test]
    fn test_select_unresolvable_custom_result_saves_address_only() {
        let mut shell = Shell::started(GeoScript::new());

        select(&mut shell, SearchResult::custom("Nani's house"));

        let view = shell.view();
        assert!(view.location.is_none());
        assert_eq!(view.address.unwrap().display(), "Nani's house");
        assert!(view.recent.is_empty());
        assert_eq!(view.navigation, Some(Navigation::BackTo(Screen::Home)));
    }

    #[test]
    fn test_address_only_pick_replaces_saved_location() {
        let mut shell = Shell::started(GeoScript::new());
        shell.dispatch(Event::UpdateLocation {
            coordinate: Coordinate::new(28.61, 77.21),
            address: Address::labelled("Delhi"),
        });
        assert!(shell.store().get_str("user_location").is_some());

        select(&mut shell, SearchResult::custom("Nani's house"));

        assert!(shell.model().location.is_none());
        assert_eq!(shell.model().address.as_ref().unwrap().display(), "Nani's house");
        assert_eq!(shell.model().map_center(), LocationConfig::default().default_region);
        assert_eq!(shell.model().distance_label(Coordinate::new(28.61, 77.21)), None);
        assert_eq!(shell.store().get_str("user_location"), None);

        let mut restarted = Shell::with_store(GeoScript::new(), shell.into_store());
        restarted.dispatch(Event::Started);
        assert!(restarted.model().location.is_none());
        assert_eq!(
            restarted.model().address.as_ref().unwrap().display(),
            "Nani's house"
        );
    }

    #[test]
    fn test_address_only_pick_failure_keeps_saved_location() {
        let mut shell = Shell::started(GeoScript::new());
        shell.dispatch(Event::UpdateLocation {
            coordinate: Coordinate::new(28.61, 77.21),
            address: Address::labelled("Delhi"),
        });
        let saved_location = shell.store().get_str("user_location");
        shell.store().fail_writes_to("user_address");

        select(&mut shell, SearchResult::custom("Nani's house"));

        let model = shell.model();
        assert_eq!(model.location.as_ref().unwrap().coordinate, Coordinate::new(28.61, 77.21));
        assert_eq!(model.address.as_ref().unwrap().display(), "Delhi");
        assert!(model.advisory.is_some());
        assert_eq!(model.navigation, None);
        assert_eq!(shell.store().get_str("user_location"), saved_location);
    }

    #[test]
    fn test_select_recent_entry_keeps_saved_address() {
        let mut shell = Shell::started(GeoScript::new());
        let point = Coordinate::new(19.0544, 72.8406);
        select(
            &mut shell,
            geocoded("Bandra", point, address("Hill Road", "Mumbai", "MH", "400050")),
        );

        let recent = shell.view().recent;
        select(&mut shell, recent[0].clone());

        assert_eq!(
            shell.view().address.unwrap().formatted_address.as_deref(),
            Some("Hill Road, Mumbai, MH, 400050")
        );
        assert_eq!(shell.model().recent.len(), 1);
        assert_eq!(shell.model().recent[0].city.as_deref(), Some("Mumbai"));
        assert!(shell.reverse_calls().is_empty());
    }

    #[test]
    fn test_select_storage_failure_surfaces() {
        let mut shell = Shell::started(GeoScript::new());
        shell.store().fail_writes(true);

        select(
            &mut shell,
            geocoded("x", Coordinate::new(1.0, 1.0), GeocodedAddress::default()),
        );

        let view = shell.view();
        assert!(view.location.is_none());
        assert_eq!(
            view.advisory.as_deref(),
            Some("We couldn't save your location. Please try again.")
        );
        assert!(view.recent.is_empty());
    }

    #[test]
    fn test_use_current_location_requests_permission() {
        let point = Coordinate::new(13.0827, 80.2707);
        let mut shell = Shell::started(
            GeoScript::new()
                .with_request(PermissionStatus::Granted)
                .with_position(point.latitude, point.longitude, Some(8.0))
                .with_reverse(point, vec![address("Anna Salai", "Chennai", "TN", "600002")]),
        );

        shell.dispatch(Event::UseCurrentLocation);

        let view = shell.view();
        assert_eq!(shell.permission_requests(), 1);
        assert_eq!(view.location.unwrap().coordinate, point);
        assert_eq!(
            view.address.unwrap().formatted_address.as_deref(),
            Some("Anna Salai, Chennai, TN, 600002")
        );
        assert_eq!(view.navigation, Some(Navigation::BackTo(Screen::Home)));
    }

    #[test]
    fn test_use_current_location_keeps_fix_details() {
        let point = Coordinate::new(13.0827, 80.2707);
        let taken_at: chrono::DateTime<chrono::Utc> = "2026-03-01T08:30:00Z".parse().unwrap();
        let mut shell = Shell::started(GeoScript::granted().with_fix(PositionFix {
            coordinate: point,
            accuracy: Some(8.0),
            timestamp: Some(taken_at),
        }));

        shell.dispatch(Event::UseCurrentLocation);

        let record = shell.model().location.clone().unwrap();
        assert_eq!(record.accuracy, Some(8.0));
        assert_eq!(record.timestamp, taken_at);
        assert_eq!(shell.writes_to("user_location"), 1);

        let saved: LocationRecord = shell.store().get_json("user_location").unwrap();
        assert_eq!(saved, record);
    }

    #[test]
    fn test_use_current_location_denied() {
        let mut shell =
            Shell::started(GeoScript::new().with_permission(PermissionStatus::Denied));

        shell.dispatch(Event::UseCurrentLocation);

        let view = shell.view();
        assert!(view.location.is_none());
        assert_eq!(
            view.advisory.as_deref(),
            Some(LocationError::PermissionDenied.user_facing_message())
        );
        assert_eq!(view.navigation, None);
    }

    #[test]
    fn test_map_initial_center_defaults_to_region() {
        let mut shell = Shell::started(GeoScript::new());
        shell.dispatch(Event::OpenMapPicker);
        assert_eq!(shell.view().map_center, LocationConfig::default().default_region);
        assert_eq!(shell.view().navigation, Some(Navigation::Push(Screen::MapPicker)));
    }

    #[test]
    fn test_map_pin_resolves_and_confirms() {
        let point = Coordinate::new(12.9352, 77.6245);
        let mut shell = Shell::started(
            GeoScript::new()
                .with_reverse(point, vec![address("80 Feet Road", "Bengaluru", "KA", "560034")]),
        );

        shell.dispatch(Event::PinMoved { coordinate: point });
        let pin = shell.view().pin;
        assert!(!pin.resolving);
        assert_eq!(
            pin.address.as_ref().unwrap().display(),
            "80 Feet Road, Bengaluru, KA, 560034"
        );
        // Shown only; nothing saved yet.
        assert!(shell.model().snapshot().is_empty());
        assert_eq!(shell.store().get_str("user_address"), None);

        shell.dispatch(Event::PinConfirmed);
        assert_eq!(shell.view().location.unwrap().coordinate, point);
        assert_eq!(shell.view().map_center, point);
    }

    #[test]
    fn test_map_confirm_falls_back_to_current_address() {
        let point = Coordinate::new(10.0, 10.0);
        let mut shell = Shell::started(
            GeoScript::new().with_reverse_error(GeoError::unavailable("offline")),
        );
        shell.dispatch(Event::UpdateLocation {
            coordinate: Coordinate::new(9.0, 9.0),
            address: Address::labelled("Home base"),
        });

        shell.dispatch(Event::PinMoved { coordinate: point });
        assert!(shell.view().pin.address.is_none());
        shell.dispatch(Event::PinConfirmed);

        let view = shell.view();
        assert_eq!(view.location.unwrap().coordinate, point);
        assert_eq!(view.address.unwrap().display(), "Home base");
    }

    #[test]
    fn test_map_confirm_without_any_address_uses_coordinates() {
        let mut shell = Shell::started(GeoScript::new());

        shell.dispatch(Event::PinMoved {
            coordinate: Coordinate::new(1.5, 2.5),
        });
        shell.dispatch(Event::PinConfirmed);

        assert_eq!(shell.view().address.unwrap().display(), "1.50000, 2.50000");
    }

    #[test]
    fn test_map_keeps_only_newest_pin_address() {
        let slow = Coordinate::new(1.0, 1.0);
        let fast = Coordinate::new(2.0, 2.0);
        let mut shell = Shell::started(
            GeoScript::new()
                .with_reverse(slow, vec![address("Slow Street", "A", "", "")])
                .hold_reverse(slow)
                .with_reverse(fast, vec![address("Fast Street", "B", "", "")]),
        );

        shell.dispatch(Event::PinMoved { coordinate: slow });
        shell.dispatch(Event::PinMoved { coordinate: fast });
        shell.release_held();

        let pin = shell.view().pin;
        assert_eq!(pin.coordinate, Some(fast));
        assert_eq!(pin.address.unwrap().display(), "Fast Street, B");
    }

}
