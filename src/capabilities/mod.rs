mod geo;
mod kv;
mod timer;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite;

pub use self::geo::{GeoError, GeoOperation, GeoOutput, GeoResult, Geolocation};
pub use self::kv::{
    decode, decode_text, encode, execute, KvBackend, KvError, KvResponse, MemoryKvStore,
    StorageErrorCode, StorageKey, MAX_KEY_LENGTH, MAX_VALUE_SIZE,
};
pub use self::timer::{Timer, TimerOperation, TimerOutput};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteKvStore;

// Crux's built-in Render covers view updates; no wrapper needed.
pub use crux_core::render::Render;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub kv: KeyValue<Event>,
    pub geolocation: Geolocation<Event>,
    pub timer: Timer<Event>,
}
