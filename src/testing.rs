//! A scripted shell for driving the core headlessly.
//!
//! [`Shell`] wraps Crux's `AppTester` and answers every effect the core
//! emits: key/value effects from a [`KvBackend`], geolocation effects from a
//! [`GeoScript`], and timers once the test fires them.

#![allow(clippy::missing_panics_doc)]

use crux_core::testing::{AppTester, Update};
use crux_core::Request;
use crux_kv::KeyValueOperation;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::app::App;
use crate::capabilities::{
    execute, Effect, GeoError, GeoOperation, GeoOutput, GeoResult, KvBackend, KvError,
    MemoryKvStore, StorageErrorCode, TimerOperation, TimerOutput,
};
use crate::event::Event;
use crate::model::{Coordinate, GeocodedAddress, Model, PermissionStatus, PositionFix, ViewModel};

/// How the platform answers geolocation requests.
///
/// Defaults: permission undetermined, a request is denied, no position,
/// empty geocoding results.
#[derive(Debug, Clone)]
pub struct GeoScript {
    request: Result<PermissionStatus, GeoError>,
    status: Result<PermissionStatus, GeoError>,
    position: Result<PositionFix, GeoError>,
    reverse: Vec<(Coordinate, Vec<GeocodedAddress>)>,
    default_reverse: Result<Vec<GeocodedAddress>, GeoError>,
    forward: Vec<(String, Vec<Coordinate>)>,
    forward_error: Option<GeoError>,
    held_queries: HashSet<String>,
    held_reverse: Vec<Coordinate>,
}

impl Default for GeoScript {
    fn default() -> Self {
        Self {
            request: Ok(PermissionStatus::Denied),
            status: Ok(PermissionStatus::Undetermined),
            position: Err(GeoError::unavailable("no position scripted")),
            reverse: Vec::new(),
            default_reverse: Ok(Vec::new()),
            forward: Vec::new(),
            forward_error: None,
            held_queries: HashSet::new(),
            held_reverse: Vec::new(),
        }
    }
}

impl GeoScript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission already granted and requests grant it again.
    #[must_use]
    pub fn granted() -> Self {
        Self::new().with_permission(PermissionStatus::Granted)
    }

    /// Sets both the current status and the answer to a permission request.
    #[must_use]
    pub fn with_permission(mut self, status: PermissionStatus) -> Self {
        self.status = Ok(status);
        self.request = Ok(status);
        self
    }

    /// Answer to a permission request only; the current status is untouched.
    #[must_use]
    pub fn with_request(mut self, status: PermissionStatus) -> Self {
        self.request = Ok(status);
        self
    }

    #[must_use]
    pub fn with_request_error(mut self, error: GeoError) -> Self {
        self.request = Err(error);
        self
    }

    #[must_use]
    pub fn with_status_error(mut self, error: GeoError) -> Self {
        self.status = Err(error);
        self
    }

    #[must_use]
    pub fn with_position(self, latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        self.with_fix(PositionFix {
            coordinate: Coordinate::new(latitude, longitude),
            accuracy,
            timestamp: None,
        })
    }

    #[must_use]
    pub fn with_fix(mut self, fix: PositionFix) -> Self {
        self.position = Ok(fix);
        self
    }

    #[must_use]
    pub fn with_position_error(mut self, error: GeoError) -> Self {
        self.position = Err(error);
        self
    }

    #[must_use]
    pub fn with_reverse(
        mut self,
        coordinate: Coordinate,
        candidates: Vec<GeocodedAddress>,
    ) -> Self {
        self.reverse.push((coordinate, candidates));
        self
    }

    /// Answer for coordinates without a specific entry.
    #[must_use]
    pub fn with_default_reverse(mut self, candidates: Vec<GeocodedAddress>) -> Self {
        self.default_reverse = Ok(candidates);
        self
    }

    #[must_use]
    pub fn with_reverse_error(mut self, error: GeoError) -> Self {
        self.default_reverse = Err(error);
        self
    }

    #[must_use]
    pub fn with_forward(mut self, query: &str, candidates: Vec<Coordinate>) -> Self {
        self.forward.push((query.to_string(), candidates));
        self
    }

    #[must_use]
    pub fn with_forward_error(mut self, error: GeoError) -> Self {
        self.forward_error = Some(error);
        self
    }

    /// Forward lookups of `query` stay unanswered until
    /// [`Shell::release_held`].
    #[must_use]
    pub fn hold_forward(mut self, query: &str) -> Self {
        self.held_queries.insert(query.to_string());
        self
    }

    /// Reverse lookups of `coordinate` stay unanswered until
    /// [`Shell::release_held`].
    #[must_use]
    pub fn hold_reverse(mut self, coordinate: Coordinate) -> Self {
        self.held_reverse.push(coordinate);
        self
    }

    fn holds(&self, operation: &GeoOperation) -> bool {
        match operation {
            GeoOperation::ForwardGeocode { query } => self.held_queries.contains(query),
            GeoOperation::ReverseGeocode { coordinate } => self.held_reverse.contains(coordinate),
            _ => false,
        }
    }

    fn answer(&mut self, operation: &GeoOperation) -> GeoResult {
        match operation {
            GeoOperation::RequestPermission => {
                let answer = self.request.clone();
                if let Ok(status) = &answer {
                    self.status = Ok(*status);
                }
                answer.map(GeoOutput::Permission)
            }
            GeoOperation::PermissionStatus => self.status.clone().map(GeoOutput::Permission),
            GeoOperation::CurrentPosition { .. } => self.position.clone().map(GeoOutput::Position),
            GeoOperation::ReverseGeocode { coordinate } => {
                let scripted = self
                    .reverse
                    .iter()
                    .find(|(at, _)| at == coordinate)
                    .map(|(_, candidates)| candidates.clone());
                match scripted {
                    Some(candidates) => Ok(GeoOutput::Addresses(candidates)),
                    None => self.default_reverse.clone().map(GeoOutput::Addresses),
                }
            }
            GeoOperation::ForwardGeocode { query } => match &self.forward_error {
                Some(error) => Err(error.clone()),
                None => Ok(GeoOutput::Coordinates(
                    self.forward
                        .iter()
                        .find(|(q, _)| q == query)
                        .map(|(_, candidates)| candidates.clone())
                        .unwrap_or_default(),
                )),
            },
            GeoOperation::NextFix { .. } | GeoOperation::StopWatch { .. } => {
                Err(GeoError::unavailable("not answered from the script"))
            }
        }
    }
}

/// Memory store with switchable write and read failures.
#[derive(Debug, Default)]
pub struct FailableStore {
    inner: MemoryKvStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_keys: Mutex<HashSet<String>>,
}

impl FailableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail writes and deletes of this key only.
    pub fn fail_writes_to(&self, key: &str) {
        self.fail_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    /// Saves `value` as JSON, bypassing failure injection.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let bytes = serde_json::to_vec(value).expect("test value serializes");
        self.inner.set(key, bytes).expect("memory store accepts the value");
    }

    pub fn put_raw(&self, key: &str, raw: &str) {
        self.inner
            .set(key, raw.as_bytes().to_vec())
            .expect("memory store accepts the value");
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner
            .get(key)
            .expect("memory store reads")
            .map(|bytes| String::from_utf8(bytes).expect("saved value is utf-8"))
    }

    #[must_use]
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_str(key)
            .map(|raw| serde_json::from_str(&raw).expect("saved value is valid json"))
    }

    fn write_fails(&self, key: &str) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
            || self
                .fail_keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(key)
    }

    fn injected() -> KvError {
        KvError::storage(StorageErrorCode::IoError, "injected failure")
    }
}

impl KvBackend for FailableStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError> {
        if self.write_fails(key) {
            return Err(Self::injected());
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        if self.write_fails(key) {
            return Err(Self::injected());
        }
        self.inner.delete(key)
    }
}

/// Key/value operation as the shell saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCall {
    Get(String),
    Set(String),
    Delete(String),
}

/// Runs the core the way a platform shell would. Effects are answered
/// before any event they produce is processed.
pub struct Shell<B: KvBackend = FailableStore> {
    app: AppTester<App, Effect>,
    model: Model,
    geo: GeoScript,
    store: B,
    timers: Vec<Request<TimerOperation>>,
    watches: Vec<Request<GeoOperation>>,
    held: Vec<Request<GeoOperation>>,
    geo_log: Vec<GeoOperation>,
    kv_log: Vec<KvCall>,
    timer_log: Vec<TimerOperation>,
    renders: usize,
}

impl Shell<FailableStore> {
    #[must_use]
    pub fn new(geo: GeoScript) -> Self {
        Self::with_store(geo, FailableStore::new())
    }

    /// A shell whose core has already loaded its (empty) saved values.
    #[must_use]
    pub fn started(geo: GeoScript) -> Self {
        let mut shell = Self::new(geo);
        shell.dispatch(Event::Started);
        shell
    }
}

impl<B: KvBackend> Shell<B> {
    pub fn with_store(geo: GeoScript, store: B) -> Self {
        Self {
            app: AppTester::default(),
            model: Model::default(),
            geo,
            store,
            timers: Vec::new(),
            watches: Vec::new(),
            held: Vec::new(),
            geo_log: Vec::new(),
            kv_log: Vec::new(),
            timer_log: Vec::new(),
            renders: 0,
        }
    }

    /// Sends `event` and answers everything it leads to, except held
    /// lookups, running timers and open watches.
    pub fn dispatch(&mut self, event: Event) {
        let update = self.app.update(event, &mut self.model);
        self.process(update);
    }

    fn process(&mut self, update: Update<Effect, Event>) {
        let mut effects: VecDeque<Effect> = update.effects.into();
        let mut events: VecDeque<Event> = update.events.into();

        loop {
            let next = if let Some(effect) = effects.pop_front() {
                self.handle(effect)
            } else if let Some(event) = events.pop_front() {
                Some(self.app.update(event, &mut self.model))
            } else {
                break;
            };

            if let Some(next) = next {
                effects.extend(next.effects);
                events.extend(next.events);
            }
        }
    }

    fn handle(&mut self, effect: Effect) -> Option<Update<Effect, Event>> {
        match effect {
            Effect::Render(_) => {
                self.renders += 1;
                None
            }
            Effect::KeyValue(mut request) => {
                self.kv_log.push(match &request.operation {
                    KeyValueOperation::Get { key } => KvCall::Get(key.clone()),
                    KeyValueOperation::Set { key, .. } => KvCall::Set(key.clone()),
                    KeyValueOperation::Delete { key } => KvCall::Delete(key.clone()),
                    #[allow(unreachable_patterns)]
                    other => panic!("unexpected key/value operation {other:?}"),
                });
                let result = execute(&self.store, &request.operation);
                Some(self.app.resolve(&mut request, result).expect("kv request resolves"))
            }
            Effect::Geolocation(mut request) => {
                let operation = request.operation.clone();
                self.geo_log.push(operation.clone());
                match operation {
                    GeoOperation::StopWatch { .. } => None,
                    GeoOperation::NextFix { .. } => {
                        self.watches.push(request);
                        None
                    }
                    ref held if self.geo.holds(held) => {
                        self.held.push(request);
                        None
                    }
                    other => {
                        let answer = self.geo.answer(&other);
                        Some(self.app.resolve(&mut request, answer).expect("geo request resolves"))
                    }
                }
            }
            Effect::Timer(request) => {
                let operation = request.operation.clone();
                self.timer_log.push(operation.clone());
                match operation {
                    TimerOperation::Start { .. } => {
                        self.timers.push(request);
                        None
                    }
                    TimerOperation::Cancel { id } => self.cancel_timer(id),
                }
            }
        }
    }

    fn cancel_timer(&mut self, id: u64) -> Option<Update<Effect, Event>> {
        let index = self.timers.iter().position(|timer| {
            matches!(timer.operation, TimerOperation::Start { id: started, .. } if started == id)
        })?;
        let mut request = self.timers.remove(index);
        let output = TimerOutput::Cancelled { id };
        Some(self.app.resolve(&mut request, output).expect("timer request resolves"))
    }

    /// Fires every running timer.
    pub fn fire_timers(&mut self) {
        for mut request in std::mem::take(&mut self.timers) {
            let TimerOperation::Start { id, .. } = request.operation else {
                continue;
            };
            let update = self
                .app
                .resolve(&mut request, TimerOutput::Elapsed { id })
                .expect("timer request resolves");
            self.process(update);
        }
    }

    /// Answers every open watch request with `fix`, stopped watches included.
    pub fn push_fix(&mut self, latitude: f64, longitude: f64) {
        let fix = PositionFix {
            coordinate: Coordinate::new(latitude, longitude),
            accuracy: Some(5.0),
            timestamp: None,
        };
        self.answer_watches(Ok(GeoOutput::Position(fix)));
    }

    /// The provider closes every open watch with `error`.
    pub fn end_watches(&mut self, error: GeoError) {
        self.answer_watches(Err(error));
    }

    fn answer_watches(&mut self, answer: GeoResult) {
        for mut request in std::mem::take(&mut self.watches) {
            let update = self
                .app
                .resolve(&mut request, answer.clone())
                .expect("watch request resolves");
            self.process(update);
        }
    }

    /// Answers held lookups from the script, oldest first.
    pub fn release_held(&mut self) {
        for mut request in std::mem::take(&mut self.held) {
            let answer = self.geo.answer(&request.operation);
            let update = self
                .app
                .resolve(&mut request, answer)
                .expect("geo request resolves");
            self.process(update);
        }
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    #[must_use]
    pub fn store(&self) -> &B {
        &self.store
    }

    /// Hands the store over, e.g. to a fresh shell simulating a restart.
    #[must_use]
    pub fn into_store(self) -> B {
        self.store
    }

    /// Changes how the platform answers from now on.
    pub fn script(&mut self, geo: GeoScript) {
        self.geo = geo;
    }

    #[must_use]
    pub fn forward_queries(&self) -> Vec<String> {
        self.geo_log
            .iter()
            .filter_map(|op| match op {
                GeoOperation::ForwardGeocode { query } => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn reverse_calls(&self) -> Vec<Coordinate> {
        self.geo_log
            .iter()
            .filter_map(|op| match op {
                GeoOperation::ReverseGeocode { coordinate } => Some(*coordinate),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn permission_requests(&self) -> usize {
        self.count_geo(|op| matches!(op, GeoOperation::RequestPermission))
    }

    #[must_use]
    pub fn position_requests(&self) -> usize {
        self.count_geo(|op| matches!(op, GeoOperation::CurrentPosition { .. }))
    }

    #[must_use]
    pub fn stopped_watches(&self) -> Vec<u64> {
        self.geo_log
            .iter()
            .filter_map(|op| match op {
                GeoOperation::StopWatch { watch_id } => Some(*watch_id),
                _ => None,
            })
            .collect()
    }

    fn count_geo(&self, pred: impl Fn(&GeoOperation) -> bool) -> usize {
        self.geo_log.iter().filter(|op| pred(op)).count()
    }

    /// Set operations the core sent for `key`, failed ones included.
    #[must_use]
    pub fn writes_to(&self, key: &str) -> usize {
        self.kv_log
            .iter()
            .filter(|call| matches!(call, KvCall::Set(k) if k == key))
            .count()
    }

    #[must_use]
    pub fn kv_calls(&self) -> &[KvCall] {
        &self.kv_log
    }

    #[must_use]
    pub fn timer_operations(&self) -> Vec<TimerOperation> {
        self.timer_log.clone()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn open_watches(&self) -> usize {
        self.watches.len()
    }

    #[must_use]
    pub fn renders(&self) -> usize {
        self.renders
    }
}

/// Geocoded address with the fields most screens display.
#[must_use]
pub fn address(street: &str, city: &str, region: &str, postal_code: &str) -> GeocodedAddress {
    let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
    GeocodedAddress {
        street: opt(street),
        city: opt(city),
        region: opt(region),
        postal_code: opt(postal_code),
        country: Some("India".to_string()),
        ..GeocodedAddress::default()
    }
}
