//! Location-aware pieces of the home tab and the onboarding permission
//! screen.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::App;
use crate::capabilities::{Capabilities, StorageKey};
use crate::event::Event;
use crate::location::{AddressPurpose, FixPurpose};
use crate::model::{non_empty, LocationSnapshot, Model, Navigation, Screen, UserProfile};

pub const SELECT_LOCATION: &str = "Select location";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationHeader {
    pub title: String,
    pub subtitle: Option<String>,
}

impl LocationHeader {
    #[must_use]
    pub fn from_snapshot(snapshot: &LocationSnapshot) -> Self {
        if let Some(address) = &snapshot.address {
            let title = non_empty(address.city.as_deref())
                .or_else(|| non_empty(address.street.as_deref()))
                .unwrap_or_else(|| address.display());
            return Self {
                title: title.to_string(),
                subtitle: Some(address.display().to_string()),
            };
        }

        match &snapshot.location {
            Some(record) => Self {
                title: "Current location".to_string(),
                subtitle: Some(record.coordinate.label()),
            },
            None => Self {
                title: SELECT_LOCATION.to_string(),
                subtitle: None,
            },
        }
    }
}

#[must_use]
pub fn greeting(profile: Option<&UserProfile>) -> String {
    match profile.and_then(UserProfile::display_name) {
        Some(name) => format!("Hi, {name}"),
        None => "Hi there".to_string(),
    }
}

impl App {
    /// Keeps a saved address as is. Otherwise resolves the saved fix, or
    /// asks for permission and resolves a live one. Waits for the saved
    /// values when they are still loading.
    pub(crate) fn ensure_location(model: &mut Model, caps: &Capabilities) {
        if !model.is_loaded() {
            model.ensure_after_load = true;
            return;
        }
        if model.address.is_some() {
            debug!("home already has an address");
            return;
        }

        match &model.location {
            Some(record) => {
                Self::reverse_geocode(caps, record.coordinate, AddressPurpose::Home);
            }
            None => Self::request_permission(caps, FixPurpose::Home),
        }
    }

    /// Lands on home whatever the prompt answers.
    pub(crate) fn onboarding_allowed(caps: &Capabilities) {
        Self::request_permission(caps, FixPurpose::Onboarding);
    }

    pub(crate) fn onboarding_skipped(model: &mut Model, caps: &Capabilities) {
        let key = StorageKey::LocationPermissionAsked;
        caps.kv.set(
            key.as_str().to_string(),
            b"true".to_vec(),
            move |response| Event::Written { key, response },
        );
        model.navigation = Some(Navigation::Replace(Screen::Home));
        info!("location permission skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::GeoError;
    use crate::error::LocationError;
    use crate::model::{Address, Coordinate, LocationRecord, PermissionStatus};
    use crate::testing::{address, GeoScript, Shell};

    fn header(location: Option<LocationRecord>, address: Option<Address>) -> LocationHeader {
        LocationHeader::from_snapshot(&LocationSnapshot { location, address })
    }

    #[test]
    fn test_header_without_location() {
        let header = header(None, None);
        assert_eq!(header.title, SELECT_LOCATION);
        assert_eq!(header.subtitle, None);
    }

    #[test]
    fn test_header_prefers_city() {
        let header = header(
            None,
            Some(Address::from_geocoded(&address(
                "Janpath",
                "New Delhi",
                "DL",
                "110001",
            ))),
        );
        assert_eq!(header.title, "New Delhi");
        assert_eq!(header.subtitle.as_deref(), Some("Janpath, New Delhi, DL, 110001"));
    }

    #[test]
    fn test_header_for_labelled_address() {
        assert_eq!(header(None, Some(Address::labelled("Office"))).title, "Office");
    }

    #[test]
    fn test_header_for_bare_fix() {
        let record = LocationRecord::new(Coordinate::new(1.0, 2.0), None);
        let header = header(Some(record), None);
        assert_eq!(header.title, "Current location");
        assert_eq!(header.subtitle.as_deref(), Some("1.00000, 2.00000"));
    }

    #[test]
    fn test_greeting_from_profile() {
        let mut shell = Shell::started(GeoScript::new());
        assert_eq!(shell.view().greeting, "Hi there");

        let mut shell = Shell::new(GeoScript::new());
        shell
            .store()
            .put_raw("user_data", r#"{"name":"Meera","email":"m@example.com"}"#);
        shell.dispatch(Event::Started);
        assert_eq!(shell.view().greeting, "Hi, Meera");
    }

    #[test]
    fn test_ensure_location_resolves_live_fix() {
        let point = Coordinate::new(22.5726, 88.3639);
        let mut shell = Shell::started(
            GeoScript::granted()
                .with_position(point.latitude, point.longitude, Some(20.0))
                .with_reverse(point, vec![address("Park Street", "Kolkata", "WB", "700016")]),
        );

        shell.dispatch(Event::EnsureLocation);

        let view = shell.view();
        assert_eq!(view.advisory, None);
        assert_eq!(view.location.unwrap().coordinate, point);
        assert_eq!(view.header.title, "Kolkata");
        assert!(shell.model().permission_asked);
        assert!(shell.store().get_str("user_address").is_some());
    }

    #[test]
    fn test_ensure_location_uses_saved_without_asking() {
        let mut shell = Shell::new(GeoScript::granted());
        shell
            .store()
            .put("user_address", &Address::labelled("Saved"));
        shell.dispatch(Event::Started);

        shell.dispatch(Event::EnsureLocation);

        assert_eq!(shell.view().header.title, "Saved");
        assert_eq!(shell.permission_requests(), 0);
    }

    #[test]
    fn test_ensure_location_waits_for_saved_values() {
        let mut shell = Shell::new(GeoScript::granted());
        shell
            .store()
            .put("user_address", &Address::labelled("Saved"));

        shell.dispatch(Event::EnsureLocation);
        assert!(shell.model().ensure_after_load);
        shell.dispatch(Event::Started);

        assert!(!shell.model().ensure_after_load);
        assert_eq!(shell.permission_requests(), 0);
    }

    #[test]
    fn test_ensure_location_denied_is_advisory_only() {
        let mut shell = Shell::started(GeoScript::new().with_permission(PermissionStatus::Denied));

        shell.dispatch(Event::EnsureLocation);

        let view = shell.view();
        assert!(view.location.is_none() && view.address.is_none());
        assert_eq!(
            view.advisory.as_deref(),
            Some(LocationError::PermissionDenied.user_facing_message())
        );
    }

    #[test]
    fn test_ensure_location_keeps_fix_when_address_lookup_fails() {
        let mut shell = Shell::started(
            GeoScript::granted()
                .with_position(1.0, 1.0, None)
                .with_reverse_error(GeoError::unavailable("offline")),
        );
        shell.dispatch(Event::EnsureLocation);

        let view = shell.view();
        assert!(view.location.is_some());
        assert!(view.address.is_none());
        assert_eq!(view.advisory, None);
    }

    #[test]
    fn test_distance_label() {
        let mut shell = Shell::started(GeoScript::new());
        assert_eq!(shell.model().distance_label(Coordinate::new(0.0, 0.0)), None);

        shell.dispatch(Event::UpdateLocation {
            coordinate: Coordinate::new(28.6139, 77.2090),
            address: Address::default(),
        });
        assert_eq!(
            shell
                .model()
                .distance_label(Coordinate::new(28.6139, 77.2090))
                .as_deref(),
            Some("0 m")
        );
    }

    #[test]
    fn test_onboarding_skip_stops_prompting() {
        let mut shell = Shell::started(GeoScript::new());
        assert!(shell.view().show_onboarding);

        shell.dispatch(Event::OnboardingSkipped);

        let view = shell.view();
        assert_eq!(view.navigation, Some(Navigation::Replace(Screen::Home)));
        assert!(!view.show_onboarding);
        assert_eq!(shell.permission_requests(), 0);
        assert_eq!(
            shell.store().get_str("location_permission_asked").as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_onboarding_allow_denied_still_goes_home() {
        let mut shell = Shell::started(GeoScript::new().with_permission(PermissionStatus::Denied));

        shell.dispatch(Event::OnboardingAllowed);

        let view = shell.view();
        assert_eq!(view.navigation, Some(Navigation::Replace(Screen::Home)));
        assert!(view.advisory.is_some());
        assert!(!view.show_onboarding);
        assert_eq!(
            shell.store().get_str("location_permission").as_deref(),
            Some("denied")
        );
    }
}
