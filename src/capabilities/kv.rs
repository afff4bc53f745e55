//! Persistence goes through the Crux `KeyValue` capability. This module holds
//! the key names, the JSON codec for values, and the pieces a Rust-hosted
//! shell needs to answer `KeyValue` effects itself.

use crux_kv::error::KeyValueError;
use crux_kv::value::Value;
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// What `update` receives for a `KeyValue` get, set or delete. Set and
/// delete carry the value they replaced.
pub type KvResponse = Result<Option<Vec<u8>>, KeyValueError>;

/// Every key this crate reads or writes. The raw strings are shared with
/// the shells and earlier app versions, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKey {
    LocationPermission,
    LocationPermissionAsked,
    UserLocation,
    UserAddress,
    RecentLocationSearches,
    UserData,
}

impl StorageKey {
    pub const ALL: [Self; 6] = [
        Self::LocationPermission,
        Self::LocationPermissionAsked,
        Self::UserLocation,
        Self::UserAddress,
        Self::RecentLocationSearches,
        Self::UserData,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocationPermission => "location_permission",
            Self::LocationPermissionAsked => "location_permission_asked",
            Self::UserLocation => "user_location",
            Self::UserAddress => "user_address",
            Self::RecentLocationSearches => "recent_location_searches",
            Self::UserData => "user_data",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?})")]
    Storage {
        code: StorageErrorCode,
        message: String,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

impl KvError {
    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
        }
    }

    fn serialization(key: StorageKey, message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            key: Some(key.as_str().to_string()),
        }
    }

    /// The shell's error as reported through the `KeyValue` capability.
    #[must_use]
    pub fn from_shell(error: &KeyValueError) -> Self {
        Self::storage(StorageErrorCode::IoError, format!("{error:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
    IoError,
}

pub(crate) fn validate_key(key: &str) -> Result<(), KvError> {
    if key.trim().is_empty() {
        return Err(KvError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty".to_string(),
        });
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(KvError::InvalidKey {
            key: key.chars().take(50).collect::<String>() + "...",
            reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
        });
    }

    if key.chars().any(char::is_control) {
        return Err(KvError::InvalidKey {
            key: key.escape_debug().to_string(),
            reason: "key contains control characters".to_string(),
        });
    }

    Ok(())
}

pub(crate) fn validate_value(value: &[u8]) -> Result<(), KvError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// JSON bytes for `value`, size-checked.
pub fn encode<T: Serialize + ?Sized>(key: StorageKey, value: &T) -> Result<Vec<u8>, KvError> {
    let bytes = serde_json::to_vec(value).map_err(|e| KvError::serialization(key, e.to_string()))?;
    validate_value(&bytes)?;
    Ok(bytes)
}

/// `Ok(None)` when the key is absent; a present but unparsable value is a
/// serialization error.
pub fn decode<T: DeserializeOwned>(
    key: StorageKey,
    response: KvResponse,
) -> Result<Option<T>, KvError> {
    match response.map_err(|e| KvError::from_shell(&e))? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| KvError::serialization(key, e.to_string())),
        None => Ok(None),
    }
}

/// Plain-text values such as the permission status. Stored unquoted for
/// compatibility with what the shells already wrote.
pub fn decode_text(key: StorageKey, response: KvResponse) -> Result<Option<String>, KvError> {
    match response.map_err(|e| KvError::from_shell(&e))? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| KvError::serialization(key, e.to_string())),
        None => Ok(None),
    }
}

/// Storage behind a Rust-hosted shell's `KeyValue` handler.
pub trait KvBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Returns the value it replaced.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError>;

    /// Returns the value it removed.
    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
}

/// Answers one `KeyValue` effect from `backend`.
pub fn execute<B: KvBackend + ?Sized>(
    backend: &B,
    operation: &KeyValueOperation,
) -> KeyValueResult {
    let outcome = match operation {
        KeyValueOperation::Get { key } => backend
            .get(key)
            .map(|value| KeyValueResponse::Get { value: to_value(value) }),
        KeyValueOperation::Set { key, value } => backend
            .set(key, value.clone())
            .map(|previous| KeyValueResponse::Set { previous: to_value(previous) }),
        KeyValueOperation::Delete { key } => backend
            .delete(key)
            .map(|previous| KeyValueResponse::Delete { previous: to_value(previous) }),
        #[allow(unreachable_patterns)]
        other => {
            return KeyValueResult::Err {
                error: KeyValueError::Other {
                    message: format!("unsupported operation {other:?}"),
                },
            }
        }
    };

    match outcome {
        Ok(response) => KeyValueResult::Ok { response },
        Err(e) => KeyValueResult::Err {
            error: KeyValueError::Io {
                message: e.to_string(),
            },
        },
    }
}

fn to_value(bytes: Option<Vec<u8>>) -> Value {
    bytes.map_or(Value::None, Value::Bytes)
}

/// Process-local store. Used for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, KvError> {
        self.entries
            .lock()
            .map_err(|_| KvError::storage(StorageErrorCode::Locked, "memory store lock poisoned"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError> {
        validate_key(key)?;
        validate_value(&value)?;
        Ok(self.lock()?.insert(key.to_string(), value))
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        validate_key(key)?;
        Ok(self.lock()?.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation_empty() {
        assert!(matches!(validate_key(""), Err(KvError::InvalidKey { .. })));
        assert!(validate_key("   ").is_err());
    }

    #[test]
    fn test_key_validation_control_chars() {
        assert!(validate_key("key\x01value").is_err());
        assert!(validate_key("key\0value").is_err());
    }

    #[test]
    fn test_key_validation_too_long() {
        assert!(validate_key(&"a".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_storage_keys_are_valid() {
        for key in StorageKey::ALL {
            assert!(validate_key(key.as_str()).is_ok());
        }
    }

    #[test]
    fn test_value_size_limit() {
        let large = vec![b'x'; MAX_VALUE_SIZE + 1];
        assert!(matches!(
            validate_value(&large),
            Err(KvError::ValueTooLarge { .. })
        ));
    }

    #[test]
    fn test_memory_store_returns_replaced_values() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("user_location").unwrap(), None);

        assert_eq!(store.set("user_location", b"{}".to_vec()).unwrap(), None);
        assert_eq!(
            store.set("user_location", b"[]".to_vec()).unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(store.len(), 1);

        assert_eq!(store.delete("user_location").unwrap(), Some(b"[]".to_vec()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_decode_reports_corrupt_value() {
        let result: Result<Option<crate::Address>, _> =
            decode(StorageKey::UserAddress, Ok(Some(b"not json".to_vec())));

        match result {
            Err(KvError::Serialization { key, .. }) => {
                assert_eq!(key.as_deref(), Some("user_address"));
            }
            other => panic!("expected serialization error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_shell_error_is_storage_error() {
        let result: Result<Option<crate::Address>, _> = decode(
            StorageKey::UserAddress,
            Err(KeyValueError::Io {
                message: "disk gone".into(),
            }),
        );
        assert!(matches!(result, Err(KvError::Storage { .. })));
    }

    #[test]
    fn test_encode_then_decode() {
        let address = crate::Address::labelled("Sector 18, Noida");
        let bytes = encode(StorageKey::UserAddress, &address).unwrap();

        let back: Option<crate::Address> =
            decode(StorageKey::UserAddress, Ok(Some(bytes))).unwrap();
        assert_eq!(back, Some(address));
    }

    #[test]
    fn test_execute_answers_from_backend() {
        let store = MemoryKvStore::new();
        let set = KeyValueOperation::Set {
            key: "location_permission".into(),
            value: b"granted".to_vec(),
        };
        assert!(matches!(execute(&store, &set), KeyValueResult::Ok { .. }));

        let get = KeyValueOperation::Get {
            key: "location_permission".into(),
        };
        assert!(matches!(
            execute(&store, &get),
            KeyValueResult::Ok {
                response: KeyValueResponse::Get {
                    value: Value::Bytes(ref bytes),
                },
            } if bytes.as_slice() == b"granted"
        ));
    }

    #[test]
    fn test_execute_reports_backend_errors() {
        let store = MemoryKvStore::new();
        let get = KeyValueOperation::Get { key: String::new() };
        assert!(matches!(execute(&store, &get), KeyValueResult::Err { .. }));
    }
}
