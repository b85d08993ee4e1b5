//! Local settings persistence.
//!
//! Values are stored as JSON text under `chatspace.` plus the lower-cased key.
//! Legacy camelCase names map onto their stored names. A stored value that
//! is not JSON is read back as a plain string and rewritten in JSON form.

use std::collections::{BTreeMap, HashMap};

use chatspace_crypto::{ExportedPrivateKey, Fingerprint, Identity};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::SettingsError;

/// Prefix of every stored key.
pub const STORAGE_PREFIX: &str = "chatspace.";

/// Visited rooms kept, most recent first.
pub const VISITED_ROOMS_LIMIT: usize = 16;

const LEGACY_KEYS: [(&str, &str); 4] = [
    ("privateKey", "private_key"),
    ("userName", "self.name"),
    ("visitCount", "visit_count"),
    ("visitedRooms", "visited_rooms"),
];

/// Raw string storage.
pub trait KeyValueStore {
    /// Value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    fn set(&mut self, key: &str, value: String);

    /// Remove `key`.
    fn remove(&mut self, key: &str);
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Storage key for a setting name.
pub fn storage_key(key: &str) -> String {
    let name = LEGACY_KEYS
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map_or(key, |(_, stored)| *stored);
    format!("{STORAGE_PREFIX}{}", name.to_lowercase())
}

/// Typed settings over a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct Settings<S> {
    store: S,
}

impl<S: KeyValueStore> Settings<S> {
    /// Wrap `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a non-empty value is stored for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.store.get(&storage_key(key)).is_some_and(|raw| !raw.is_empty())
    }

    /// Stored JSON value for `key`.
    ///
    /// Non-JSON text is returned as a string and rewritten as a JSON string.
    pub fn get_value(&mut self, key: &str) -> Option<Value> {
        let storage_key = storage_key(key);
        let raw = self.store.get(&storage_key).filter(|raw| !raw.is_empty())?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(_) => {
                let value = Value::String(raw);
                self.store.set(&storage_key, value.to_string());
                Some(value)
            },
        }
    }

    /// Typed value for `key`.
    ///
    /// # Errors
    ///
    /// - `Decode`: the stored value has a different shape
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, SettingsError> {
        let Some(value) = self.get_value(key) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SettingsError::Decode { key: key.to_string(), reason: e.to_string() })
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// - `Encode`: the value does not serialize
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), SettingsError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| SettingsError::Encode { key: key.to_string(), reason: e.to_string() })?;
        self.store.set(&storage_key(key), raw);
        Ok(())
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: &str) {
        self.store.remove(&storage_key(key));
    }

    /// Stored identity, or a new one from `seed` which is then stored.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentity`: a key is stored but does not import
    /// - `Decode`/`Encode`: storage shape errors
    pub fn load_or_create_identity(
        &mut self,
        seed: impl FnOnce() -> [u8; 32],
    ) -> Result<Identity, SettingsError> {
        if let Some(exported) = self.get::<ExportedPrivateKey>("privateKey")? {
            return Identity::import(&exported).map_err(SettingsError::InvalidIdentity);
        }

        let identity = Identity::from_secret(seed());
        self.set("privateKey", &identity.export())?;
        Ok(identity)
    }

    /// Import and store a user-supplied base64 private key.
    ///
    /// The stored key is untouched if the new one is invalid.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentity`: wrong length or not base64
    pub fn replace_identity(&mut self, private_key: &str) -> Result<Identity, SettingsError> {
        let identity =
            Identity::import_private_key(private_key).map_err(SettingsError::InvalidIdentity)?;
        self.set("privateKey", &identity.export())?;
        Ok(identity)
    }

    /// Saved display name, empty if unset or not a string.
    pub fn user_name(&mut self) -> String {
        match self.get_value("userName") {
            Some(Value::String(name)) => name,
            _ => String::new(),
        }
    }

    /// Save the display name.
    ///
    /// # Errors
    ///
    /// - `Encode`: serialization failed
    pub fn set_user_name(&mut self, name: &str) -> Result<(), SettingsError> {
        self.set("userName", name)
    }

    /// Increment and return the visit counter.
    ///
    /// # Errors
    ///
    /// - `Encode`: serialization failed
    pub fn record_visit(&mut self) -> Result<u64, SettingsError> {
        let count = self.get::<u64>("visitCount").ok().flatten().unwrap_or(0).saturating_add(1);
        self.set("visitCount", &count)?;
        Ok(count)
    }

    /// Visited room tokens, most recent first.
    pub fn visited_rooms(&mut self) -> Vec<String> {
        self.get::<Vec<String>>("visitedRooms").ok().flatten().unwrap_or_default()
    }

    /// Move `token` to the front of the visited rooms, keeping at most
    /// [`VISITED_ROOMS_LIMIT`] entries.
    ///
    /// # Errors
    ///
    /// - `Encode`: serialization failed
    pub fn record_room(&mut self, token: &str) -> Result<Vec<String>, SettingsError> {
        let mut rooms = self.visited_rooms();
        rooms.retain(|room| room != token);
        rooms.insert(0, token.to_string());
        rooms.truncate(VISITED_ROOMS_LIMIT);
        self.set("visitedRooms", &rooms)?;
        Ok(rooms)
    }

    /// Friends map, fingerprint to name. Unparseable fingerprints are skipped.
    pub fn friends(&mut self) -> BTreeMap<Fingerprint, String> {
        self.get::<BTreeMap<String, String>>("friends")
            .ok()
            .flatten()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(fingerprint, name)| Some((fingerprint.parse().ok()?, name)))
            .collect()
    }

    /// Save the friends map.
    ///
    /// # Errors
    ///
    /// - `Encode`: serialization failed
    pub fn set_friends(&mut self, friends: &BTreeMap<Fingerprint, String>) -> Result<(), SettingsError> {
        let encoded: BTreeMap<String, &String> =
            friends.iter().map(|(fingerprint, name)| (fingerprint.to_hex(), name)).collect();
        self.set("friends", &encoded)
    }
}
