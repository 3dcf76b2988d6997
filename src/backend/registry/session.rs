//! Access to a single key of a [`Hive`].

use tracing::trace;

use super::hive::{Hive, NativeKind, NativeValue};
use crate::constants::registry::KEY_SEPARATOR;
use crate::error::{Error, Result};

/// An opened key. Reads probe the native type first and re-check it after
/// fetching the data, so a value rewritten in between is reported instead of
/// decoded as the wrong type.
pub(crate) struct KeySession<'a> {
    hive: &'a Hive,
    key: String,
}

impl<'a> KeySession<'a> {
    /// Open an existing key.
    pub fn open(hive: &'a Hive, key: String) -> Option<Self> {
        hive.key_exists(&key).then_some(Self { hive, key })
    }

    /// Open a key, creating it and its parents if needed.
    pub fn create(hive: &'a Hive, key: String) -> Self {
        hive.create_key(&key);
        trace!(key = %key, "Opened key for writing");
        Self { hive, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value_names(&self) -> Vec<String> {
        self.hive.value_names(&self.key).unwrap_or_default()
    }

    pub fn subkey_names(&self) -> Vec<String> {
        self.hive.subkey_names(&self.key).unwrap_or_default()
    }

    pub fn read(&self, name: &str) -> Result<NativeValue> {
        let (kind, size) = self.probe(name)?;
        trace!(key = %self.key, value = %name, %kind, size, "Reading value");
        let value = self
            .hive
            .query_value(&self.key, name)
            .ok_or_else(|| self.vanished(name))?;
        self.confirm_kind(name, kind, value)
    }

    /// Reject `value` if its type is no longer the probed `kind`.
    fn confirm_kind(&self, name: &str, kind: NativeKind, value: NativeValue) -> Result<NativeValue> {
        if value.kind() != kind {
            return Err(Error::backend(format!(
                "value '{}' changed from {kind} to {} while being read",
                self.full_name(name),
                value.kind()
            )));
        }
        Ok(value)
    }

    pub fn write(&self, name: &str, value: NativeValue) -> Result<()> {
        self.hive.set_value(&self.key, name, value)
    }

    pub fn remove(&self, name: &str) {
        self.hive.delete_value(&self.key, name);
    }

    /// Key path and value name, for messages.
    pub fn full_name(&self, name: &str) -> String {
        format!("{}{KEY_SEPARATOR}{name}", self.key)
    }

    fn probe(&self, name: &str) -> Result<(NativeKind, usize)> {
        self.hive
            .query_info(&self.key, name)
            .ok_or_else(|| self.vanished(name))
    }

    fn vanished(&self, name: &str) -> Error {
        Error::backend(format!("value '{}' could not be read", self.full_name(name)))
    }
}
