//! Free-text location search for the picker screen.
//!
//! Every keystroke bumps `SearchModel::generation`, cancels the previous
//! debounce timer and starts a new one. Each answer carries the generation
//! it was asked for and is dropped unless that generation is still current.
//! Checking and publishing both happen inside one `update` call, so a newer
//! keystroke cannot land between them.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::App;
use crate::capabilities::{Capabilities, GeoError, TimerOutput};
use crate::error::LocationError;
use crate::event::Event;
use crate::model::{Address, Coordinate, GeocodedAddress, Model};
use crate::recent::RecentSearchEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchResultKind {
    Geocoded,
    /// The raw query offered as a label when nothing matched.
    Custom,
    Recent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub kind: SearchResultKind,
    pub main_text: String,
    pub secondary_text: String,
    pub coordinate: Option<Coordinate>,
    pub raw_address: Option<GeocodedAddress>,
    /// Already-resolved address, present for recent entries.
    pub address: Option<Address>,
}

impl SearchResult {
    #[must_use]
    pub fn custom(query: &str) -> Self {
        Self {
            id: "custom".to_string(),
            kind: SearchResultKind::Custom,
            main_text: query.to_string(),
            secondary_text: String::new(),
            coordinate: None,
            raw_address: None,
            address: None,
        }
    }

    fn geocoded(
        index: usize,
        query: &str,
        coordinate: Coordinate,
        raw: Option<GeocodedAddress>,
    ) -> Self {
        let (main_text, secondary_text) = display_text(raw.as_ref(), query, coordinate);
        Self {
            id: format!("geocoded-{index}"),
            kind: SearchResultKind::Geocoded,
            main_text,
            secondary_text,
            coordinate: Some(coordinate),
            raw_address: raw,
            address: None,
        }
    }

    #[must_use]
    pub fn from_recent(entry: &RecentSearchEntry) -> Self {
        Self {
            id: entry.id.clone(),
            kind: SearchResultKind::Recent,
            main_text: entry.name.clone(),
            secondary_text: entry.description.clone(),
            coordinate: entry.coordinates,
            raw_address: Some(entry.geocoded()),
            address: Some(entry.full_address.clone()),
        }
    }
}

/// First two address parts as the main line, the rest as the secondary
/// line. Without any part, the query and the raw coordinates.
fn display_text(
    raw: Option<&GeocodedAddress>,
    query: &str,
    coordinate: Coordinate,
) -> (String, String) {
    let parts = raw.map(GeocodedAddress::display_parts).unwrap_or_default();
    if parts.is_empty() {
        return (query.to_string(), coordinate.label());
    }
    let split = parts.len().min(2);
    (parts[..split].join(", "), parts[split..].join(", "))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum SearchState {
    #[default]
    Idle,
    Searching {
        query: String,
    },
    Results {
        query: String,
        results: Vec<SearchResult>,
    },
    Failed {
        query: String,
        message: String,
    },
}

/// Candidates of the current search still waiting for their reverse lookup.
#[derive(Debug)]
struct PendingSearch {
    generation: u64,
    query: String,
    candidates: Vec<Coordinate>,
    resolved: Vec<Option<Option<GeocodedAddress>>>,
}

impl PendingSearch {
    fn is_complete(&self) -> bool {
        self.resolved.iter().all(Option::is_some)
    }

    fn into_results(self) -> Vec<SearchResult> {
        let query = self.query;
        self.candidates
            .into_iter()
            .zip(self.resolved)
            .enumerate()
            .map(|(index, (coordinate, raw))| {
                SearchResult::geocoded(index, &query, coordinate, raw.flatten())
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct SearchModel {
    /// Text as typed, untrimmed.
    pub query: String,
    pub state: SearchState,
    pub(crate) generation: u64,
    timer: Option<u64>,
    pending: Option<PendingSearch>,
}

impl SearchModel {
    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

impl App {
    /// Restarts the debounce window for `text`.
    pub(crate) fn search_query_changed(model: &mut Model, caps: &Capabilities, text: String) {
        let generation = Self::supersede_search(model, caps);
        let query = text.trim().to_string();
        model.search.query = text;

        if query.is_empty() {
            model.search.state = SearchState::Idle;
            return;
        }

        model.search.timer = Some(generation);
        caps.timer
            .start(generation, model.config.search.debounce(), move |output| {
                Event::DebounceElapsed {
                    generation,
                    query,
                    output,
                }
            });
    }

    /// Searches immediately, superseding any debounced search.
    pub(crate) fn search_submitted(model: &mut Model, caps: &Capabilities, text: String) {
        let generation = Self::supersede_search(model, caps);
        let query = text.trim().to_string();
        model.search.query = text;

        if query.is_empty() {
            model.search.state = SearchState::Idle;
            return;
        }
        Self::run_search(model, caps, generation, query);
    }

    /// Drops the pending search and returns to `Idle`.
    pub(crate) fn search_cancelled(model: &mut Model, caps: &Capabilities) {
        Self::supersede_search(model, caps);
        model.search.query.clear();
        model.search.state = SearchState::Idle;
    }

    /// Invalidates every answer still in flight and returns the new generation.
    pub(crate) fn supersede_search(model: &mut Model, caps: &Capabilities) -> u64 {
        if let Some(id) = model.search.timer.take() {
            caps.timer.cancel(id);
        }
        model.search.pending = None;
        model.search.generation += 1;
        model.search.generation
    }

    pub(crate) fn debounce_elapsed(
        model: &mut Model,
        caps: &Capabilities,
        generation: u64,
        query: String,
        output: TimerOutput,
    ) {
        if matches!(output, TimerOutput::Cancelled { .. }) || !model.search.is_current(generation)
        {
            return;
        }
        model.search.timer = None;
        Self::run_search(model, caps, generation, query);
    }

    fn run_search(model: &mut Model, caps: &Capabilities, generation: u64, query: String) {
        model.search.state = SearchState::Searching {
            query: query.clone(),
        };
        caps.geolocation
            .forward_geocode(query.clone(), move |result| Event::SearchCandidates {
                generation,
                query,
                result,
            });
    }

    /// Keeps up to `max_candidates` and reverse-geocodes each for display.
    /// Zero candidates offer the query itself as a custom result.
    pub(crate) fn search_candidates(
        model: &mut Model,
        caps: &Capabilities,
        generation: u64,
        query: String,
        result: Result<Vec<Coordinate>, GeoError>,
    ) {
        if !model.search.is_current(generation) {
            debug!(query = %query, "discarding superseded search results");
            return;
        }

        let mut candidates = match result {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "location search failed");
                model.search.state = SearchState::Failed {
                    query,
                    message: LocationError::from(e).user_facing_message().to_string(),
                };
                return;
            }
        };

        if candidates.is_empty() {
            debug!(query = %query, "no geocoding candidates, offering custom result");
            let results = vec![SearchResult::custom(&query)];
            model.search.state = SearchState::Results { query, results };
            return;
        }

        candidates.truncate(model.config.search.max_candidates);
        for (index, coordinate) in candidates.iter().copied().enumerate() {
            caps.geolocation
                .reverse_geocode(coordinate, move |result| Event::CandidateResolved {
                    generation,
                    index,
                    result,
                });
        }
        model.search.pending = Some(PendingSearch {
            generation,
            query,
            resolved: vec![None; candidates.len()],
            candidates,
        });
    }

    /// A failed reverse lookup degrades that candidate only.
    pub(crate) fn candidate_resolved(
        model: &mut Model,
        generation: u64,
        index: usize,
        result: Result<Vec<GeocodedAddress>, GeoError>,
    ) {
        let Some(pending) = model
            .search
            .pending
            .as_mut()
            .filter(|pending| pending.generation == generation)
        else {
            debug!(generation, "discarding superseded candidate address");
            return;
        };

        let raw = match result {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "reverse geocoding a search candidate failed");
                None
            }
        };
        if let Some(slot) = pending.resolved.get_mut(index) {
            *slot = Some(raw);
        }

        if pending.is_complete() {
            if let Some(pending) = model.search.pending.take() {
                let query = pending.query.clone();
                let results = pending.into_results();
                model.search.state = SearchState::Results { query, results };
            }
        }
    }
}
