//! Hierarchical key store
//!
//! Keys hold subkeys and named values of registry-native types. A hive lives
//! in memory or is backed by a JSON file: [`Hive::reload`] re-reads the file
//! and [`Hive::persist`] writes it back. Clones share the same keys.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::registry::{HIVE_DIR, HIVE_FILE, KEY_SEPARATOR};
use crate::error::{Error, Result};

/// Native value type, as reported by a value probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    None,
    Sz,
    ExpandSz,
    Binary,
    Dword,
    Link,
    MultiSz,
    Qword,
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NativeKind::None => "REG_NONE",
            NativeKind::Sz => "REG_SZ",
            NativeKind::ExpandSz => "REG_EXPAND_SZ",
            NativeKind::Binary => "REG_BINARY",
            NativeKind::Dword => "REG_DWORD",
            NativeKind::Link => "REG_LINK",
            NativeKind::MultiSz => "REG_MULTI_SZ",
            NativeKind::Qword => "REG_QWORD",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NativeValue {
    None,
    Sz(String),
    ExpandSz(String),
    Binary(Vec<u8>),
    Dword(u32),
    Link(String),
    MultiSz(Vec<String>),
    Qword(u64),
}

fn utf16_size(text: &str) -> usize {
    (text.encode_utf16().count() + 1) * 2
}

impl NativeValue {
    pub fn kind(&self) -> NativeKind {
        match self {
            NativeValue::None => NativeKind::None,
            NativeValue::Sz(_) => NativeKind::Sz,
            NativeValue::ExpandSz(_) => NativeKind::ExpandSz,
            NativeValue::Binary(_) => NativeKind::Binary,
            NativeValue::Dword(_) => NativeKind::Dword,
            NativeValue::Link(_) => NativeKind::Link,
            NativeValue::MultiSz(_) => NativeKind::MultiSz,
            NativeValue::Qword(_) => NativeKind::Qword,
        }
    }

    /// Payload size in bytes, strings counted as NUL-terminated UTF-16.
    pub fn size(&self) -> usize {
        match self {
            NativeValue::None => 0,
            NativeValue::Sz(s) | NativeValue::ExpandSz(s) | NativeValue::Link(s) => utf16_size(s),
            NativeValue::Binary(bytes) => bytes.len(),
            NativeValue::Dword(_) => 4,
            NativeValue::MultiSz(items) => items.iter().map(|s| utf16_size(s)).sum::<usize>() + 2,
            NativeValue::Qword(_) => 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiveKey {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    keys: BTreeMap<String, HiveKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, NativeValue>,
}

impl HiveKey {
    fn find(&self, segments: &[&str]) -> Option<&HiveKey> {
        segments.iter().try_fold(self, |key, name| key.keys.get(*name))
    }

    fn find_mut(&mut self, segments: &[&str]) -> Option<&mut HiveKey> {
        segments.iter().try_fold(self, |key, name| key.keys.get_mut(*name))
    }

    fn force(&mut self, segments: &[&str]) -> &mut HiveKey {
        segments
            .iter()
            .fold(self, |key, name| key.keys.entry((*name).to_string()).or_default())
    }
}

fn split_key(path: &str) -> Vec<&str> {
    path.split(KEY_SEPARATOR).filter(|s| !s.is_empty()).collect()
}

#[derive(Debug, Default)]
struct HiveState {
    root: HiveKey,
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Hive(Rc<RefCell<HiveState>>);

impl Hive {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A hive backed by `path`, loaded now if the file exists.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        let hive = Self(Rc::new(RefCell::new(HiveState {
            root: HiveKey::default(),
            file: Some(path.into()),
        })));
        hive.reload()?;
        Ok(hive)
    }

    /// The per-user hive under the config directory.
    pub fn user_default() -> Result<Self> {
        Self::open_file(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(HIVE_DIR);
        path.push(HIVE_FILE);
        path
    }

    pub fn file(&self) -> Option<PathBuf> {
        self.0.borrow().file.clone()
    }

    /// Replace the keys with the file content. No-op for in-memory hives.
    pub fn reload(&self) -> Result<()> {
        let Some(file) = self.file() else {
            return Ok(());
        };
        let root = match fs::read_to_string(&file) {
            Ok(contents) if contents.trim().is_empty() => HiveKey::default(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HiveKey::default(),
            Err(e) => return Err(Error::io(&file, e)),
        };
        self.0.borrow_mut().root = root;
        debug!(path = %file.display(), "Reloaded hive");
        Ok(())
    }

    /// Write the keys to the backing file. No-op for in-memory hives.
    pub fn persist(&self) -> Result<()> {
        let Some(file) = self.file() else {
            return Ok(());
        };
        let contents = serde_json::to_string_pretty(&self.0.borrow().root)?;
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&file, contents).map_err(|e| Error::io(&file, e))?;
        info!(path = %file.display(), "Persisted hive");
        Ok(())
    }

    pub fn key_exists(&self, path: &str) -> bool {
        self.0.borrow().root.find(&split_key(path)).is_some()
    }

    pub fn create_key(&self, path: &str) {
        self.0.borrow_mut().root.force(&split_key(path));
    }

    /// Remove a key and all its subkeys. An empty path clears the hive.
    pub fn delete_key_tree(&self, path: &str) {
        let segments = split_key(path);
        let mut state = self.0.borrow_mut();
        match segments.split_last() {
            None => state.root = HiveKey::default(),
            Some((name, parent)) => {
                if let Some(key) = state.root.find_mut(parent) {
                    key.keys.remove(*name);
                }
            }
        }
    }

    pub fn subkey_names(&self, path: &str) -> Option<Vec<String>> {
        let state = self.0.borrow();
        let key = state.root.find(&split_key(path))?;
        Some(key.keys.keys().cloned().collect())
    }

    pub fn value_names(&self, path: &str) -> Option<Vec<String>> {
        let state = self.0.borrow();
        let key = state.root.find(&split_key(path))?;
        Some(key.values.keys().cloned().collect())
    }

    /// Type and size of a value, without its data.
    pub fn query_info(&self, path: &str, name: &str) -> Option<(NativeKind, usize)> {
        let state = self.0.borrow();
        let value = state.root.find(&split_key(path))?.values.get(name)?;
        Some((value.kind(), value.size()))
    }

    pub fn query_value(&self, path: &str, name: &str) -> Option<NativeValue> {
        let state = self.0.borrow();
        state.root.find(&split_key(path))?.values.get(name).cloned()
    }

    /// Set a value on an existing key.
    pub fn set_value(&self, path: &str, name: &str, value: NativeValue) -> Result<()> {
        let mut state = self.0.borrow_mut();
        let key = state
            .root
            .find_mut(&split_key(path))
            .ok_or_else(|| Error::backend(format!("cannot open key '{path}' for writing")))?;
        key.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns whether the value existed.
    pub fn delete_value(&self, path: &str, name: &str) -> bool {
        let mut state = self.0.borrow_mut();
        state
            .root
            .find_mut(&split_key(path))
            .is_some_and(|key| key.values.remove(name).is_some())
    }

    pub fn is_empty(&self) -> bool {
        let state = self.0.borrow();
        state.root.keys.is_empty() && state.root.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_keys_and_values() {
        let hive = Hive::in_memory();
        assert!(hive.is_empty());
        hive.create_key(r"Software\Acme\App");
        assert!(hive.key_exists(r"Software\Acme"));
        assert!(hive.key_exists(r"\Software\Acme\App\"));
        assert!(!hive.key_exists(r"Software\Other"));

        hive.set_value(r"Software\Acme\App", "Count", NativeValue::Dword(3)).unwrap();
        assert_eq!(hive.query_info(r"Software\Acme\App", "Count"), Some((NativeKind::Dword, 4)));
        assert_eq!(hive.query_value(r"Software\Acme\App", "Count"), Some(NativeValue::Dword(3)));
        assert_eq!(hive.value_names(r"Software\Acme\App").unwrap(), ["Count"]);
        assert_eq!(hive.subkey_names("Software").unwrap(), ["Acme"]);

        assert!(hive.delete_value(r"Software\Acme\App", "Count"));
        assert!(!hive.delete_value(r"Software\Acme\App", "Count"));
    }

    #[test]
    fn test_set_value_requires_key() {
        let hive = Hive::in_memory();
        assert!(matches!(
            hive.set_value("Missing", "v", NativeValue::Dword(1)),
            Err(Error::Backend(_))
        ));
    }

    #[test]
    fn test_delete_key_tree() {
        let hive = Hive::in_memory();
        hive.create_key(r"a\b\c");
        hive.create_key(r"a\d");
        hive.delete_key_tree(r"a\b");
        assert!(!hive.key_exists(r"a\b\c"));
        assert!(hive.key_exists(r"a\d"));
        hive.delete_key_tree(r"x\y");
        hive.delete_key_tree("");
        assert!(hive.is_empty());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(NativeValue::Sz("ab".into()).size(), 6);
        assert_eq!(NativeValue::MultiSz(vec!["a".into(), "bc".into()]).size(), 12);
        assert_eq!(NativeValue::Binary(vec![0; 8]).size(), 8);
        assert_eq!(NativeValue::Qword(1).size(), 8);
        assert_eq!(NativeKind::MultiSz.to_string(), "REG_MULTI_SZ");
    }

    #[test]
    fn test_file_hive_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sub").join("user.hive");
        let hive = Hive::open_file(&file).unwrap();
        hive.create_key(r"Software\Acme");
        hive.set_value(r"Software\Acme", "Name", NativeValue::Sz("x".into())).unwrap();
        hive.persist().unwrap();

        let text = fs::read_to_string(&file).unwrap();
        assert!(text.contains("\"SZ\""), "{text}");

        let other = Hive::open_file(&file).unwrap();
        assert_eq!(other.query_value(r"Software\Acme", "Name"), Some(NativeValue::Sz("x".into())));

        hive.set_value(r"Software\Acme", "Name", NativeValue::Sz("unsaved".into())).unwrap();
        hive.reload().unwrap();
        assert_eq!(hive.query_value(r"Software\Acme", "Name"), Some(NativeValue::Sz("x".into())));
    }

    #[test]
    fn test_in_memory_reload_is_noop() {
        let hive = Hive::in_memory();
        hive.create_key("k");
        hive.reload().unwrap();
        hive.persist().unwrap();
        assert!(hive.key_exists("k"));
        assert_eq!(hive.file(), None);
    }

    #[test]
    fn test_corrupt_hive_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("user.hive");
        fs::write(&file, "not json").unwrap();
        assert!(matches!(Hive::open_file(&file), Err(Error::Json(_))));
    }
}
