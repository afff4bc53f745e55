use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::App;
use crate::capabilities::{encode, Capabilities, StorageKey};
use crate::event::Event;
use crate::model::{Address, Coordinate, GeocodedAddress, Model};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSearchEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
    #[serde(default)]
    pub full_address: Address,
    pub timestamp: i64,
}

impl RecentSearchEntry {
    /// Stamps a new entry with the current time; the id is the same epoch-ms
    /// value as a string.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        coordinates: Option<Coordinate>,
        raw: Option<&GeocodedAddress>,
        full_address: Address,
    ) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        Self {
            id: timestamp.to_string(),
            name: name.into(),
            description: description.into(),
            street: raw.and_then(|a| a.street.clone()),
            locality: raw.and_then(|a| a.district.clone().or_else(|| a.subregion.clone())),
            city: raw.and_then(|a| a.city.clone()),
            region: raw.and_then(|a| a.region.clone()),
            country: raw.and_then(|a| a.country.clone()),
            coordinates,
            full_address,
            timestamp,
        }
    }

    /// The address parts this entry was saved with.
    #[must_use]
    pub fn geocoded(&self) -> GeocodedAddress {
        GeocodedAddress {
            street: self.street.clone(),
            district: self.locality.clone(),
            city: self.city.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
            postal_code: self.full_address.postal_code.clone(),
            ..GeocodedAddress::default()
        }
    }

    fn same_place(&self, other: &Self) -> bool {
        self.name.trim().to_lowercase() == other.name.trim().to_lowercase()
    }
}

/// Puts `entry` first, drops older entries with the same name
/// (case-insensitive) and truncates to `cap`.
#[must_use]
pub fn push_recent(
    mut list: Vec<RecentSearchEntry>,
    entry: RecentSearchEntry,
    cap: usize,
) -> Vec<RecentSearchEntry> {
    list.retain(|existing| !existing.same_place(&entry));
    list.insert(0, entry);
    list.truncate(cap.max(1));
    list
}

impl App {
    /// Adds `entry` to the in-memory list and saves the whole list. A failed
    /// save keeps the entry for this session.
    pub(crate) fn record_recent(model: &mut Model, caps: &Capabilities, entry: RecentSearchEntry) {
        let list = std::mem::take(&mut model.recent);
        model.recent = push_recent(list, entry, model.config.search.max_recent);

        let key = StorageKey::RecentLocationSearches;
        match encode(key, &model.recent) {
            Ok(bytes) => {
                caps.kv.set(key.as_str().to_string(), bytes, move |response| {
                    Event::Written { key, response }
                });
                debug!(len = model.recent.len(), "recent searches saved");
            }
            Err(e) => warn!(error = %e, "could not encode recent searches"),
        }
    }

    pub(crate) fn clear_recent(model: &mut Model, caps: &Capabilities) {
        model.recent.clear();
        let key = StorageKey::RecentLocationSearches;
        caps.kv
            .delete(key.as_str().to_string(), move |response| Event::Written {
                key,
                response,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GeoScript, Shell};

    fn entry(name: &str, ts: i64) -> RecentSearchEntry {
        RecentSearchEntry {
            id: ts.to_string(),
            name: name.to_string(),
            description: String::new(),
            street: None,
            locality: None,
            city: None,
            region: None,
            country: None,
            coordinates: Some(Coordinate::new(0.0, 0.0)),
            full_address: Address::default(),
            timestamp: ts,
        }
    }

    fn names(list: &[RecentSearchEntry]) -> Vec<&str> {
        list.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_newest_first() {
        let list = push_recent(Vec::new(), entry("a", 1), 5);
        let list = push_recent(list, entry("b", 2), 5);
        assert_eq!(names(&list), vec!["b", "a"]);
    }

    #[test]
    fn test_sixth_entry_drops_oldest() {
        let mut list = Vec::new();
        for (i, name) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            list = push_recent(list, entry(name, i as i64), 5);
        }
        assert_eq!(names(&list), vec!["f", "e", "d", "c", "b"]);
    }

    #[test]
    fn test_duplicate_name_moves_to_front() {
        let mut list = Vec::new();
        for (i, name) in ["Indiranagar", "Koramangala", "HSR Layout"].iter().enumerate() {
            list = push_recent(list, entry(name, i as i64), 5);
        }
        list = push_recent(list, entry("indiranagar", 10), 5);

        assert_eq!(names(&list), vec!["indiranagar", "HSR Layout", "Koramangala"]);
        assert_eq!(list[0].timestamp, 10);
    }

    #[test]
    fn test_entry_from_geocoded_parts() {
        let raw = GeocodedAddress {
            street: Some("100 Feet Road".into()),
            district: Some("Indiranagar".into()),
            city: Some("Bengaluru".into()),
            region: Some("KA".into()),
            country: Some("India".into()),
            ..GeocodedAddress::default()
        };
        let e = RecentSearchEntry::new(
            "100 Feet Road, Indiranagar",
            "Bengaluru, KA",
            Some(Coordinate::new(12.97, 77.64)),
            Some(&raw),
            Address::from_geocoded(&raw),
        );

        assert_eq!(e.id, e.timestamp.to_string());
        assert_eq!(e.locality.as_deref(), Some("Indiranagar"));
        assert_eq!(e.city.as_deref(), Some("Bengaluru"));
    }

    #[test]
    fn test_saved_list_is_capped_on_load() {
        let mut shell = Shell::new(GeoScript::new());
        let saved: Vec<RecentSearchEntry> =
            (0..7).map(|i| entry(&format!("place {i}"), i)).collect();
        shell.store().put("recent_location_searches", &saved);

        shell.dispatch(Event::Started);

        assert_eq!(shell.model().recent.len(), 5);
        assert_eq!(shell.view().recent[0].main_text, "place 0");
    }

    #[test]
    fn test_corrupt_saved_list_loads_empty() {
        let mut shell = Shell::new(GeoScript::new());
        shell
            .store()
            .put_raw("recent_location_searches", "[{\"nope\":1}]");

        shell.dispatch(Event::Started);
        assert!(shell.model().recent.is_empty());
    }

    #[test]
    fn test_clear_removes_saved_list() {
        let mut shell = Shell::new(GeoScript::new());
        shell.store().put("recent_location_searches", &vec![entry("a", 1)]);
        shell.dispatch(Event::Started);

        shell.dispatch(Event::ClearRecentSearches);

        assert!(shell.model().recent.is_empty());
        assert_eq!(shell.store().get_str("recent_location_searches"), None);
    }
}
