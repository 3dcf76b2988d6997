//! Registry-style key store
//!
//! Nodes map to keys below a root key (by default
//! `Software\<company>\<product>\<version>`). Values use the closest native
//! type; when that type alone does not identify the tag, the value name is
//! decorated with a `:(tag)` suffix:
//!
//! | tag                            | stored name | native            |
//! |--------------------------------|-------------|-------------------|
//! | `i`                            | `name`      | DWORD             |
//! | `u l ul c uc s us b`           | `name:(t)`  | DWORD             |
//! | `ll`                           | `name`      | QWORD             |
//! | `ull`                          | `name:(ull)`| QWORD             |
//! | `sz`                           | `name`      | SZ                |
//! | `sv`                           | `name`      | MULTI_SZ          |
//! | `dab`                          | `name`      | BINARY            |
//! | `vb`                           | `name:(vb)` | BINARY            |
//! | `dt flt dbl cur`               | `name:(t)`  | BINARY, 8 bytes LE|
//!
//! Undecorated values written by other tools are read by native type alone.

mod hive;
mod session;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

pub use hive::{Hive, NativeKind, NativeValue};
use session::KeySession;

use crate::constants::registry::{KEY_SEPARATOR, SOFTWARE_PREFIX};
use crate::error::{Error, Result};
use crate::store::{ConfigPath, ConfigStore, Pending, SaveMode, ValueList, pending_changes};
use crate::value::{ByteArray, Currency, Long, TypeTag, ULong, Value, from_ole, to_ole};

// ==============================================================================
// Name decoration
// ==============================================================================

static DECORATED_NAME: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    let tags = TypeTag::ALL
        .iter()
        .map(|tag| regex::escape(tag.symbol()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"^(?s)(.*?)(?::\(({tags})\))?$"))
});

/// Base name and tag suffix of a stored value name.
fn split_name(stored: &str) -> Result<(&str, Option<TypeTag>)> {
    let pattern = DECORATED_NAME
        .as_ref()
        .map_err(|e| Error::backend(format!("value name pattern: {e}")))?;
    let Some(captures) = pattern.captures(stored) else {
        return Ok((stored, None));
    };
    let base = captures.get(1).map_or(stored, |m| m.as_str());
    let tag = captures.get(2).and_then(|m| TypeTag::from_symbol(m.as_str()));
    Ok((base, tag))
}

/// Tags recovered from the native type alone.
fn is_plain(tag: TypeTag) -> bool {
    matches!(
        tag,
        TypeTag::Int | TypeTag::LongLong | TypeTag::Text | TypeTag::TextList | TypeTag::ByteArray
    )
}

fn stored_name(name: &str, tag: TypeTag) -> Result<String> {
    // A plain name that already parses as decorated needs its own suffix.
    if is_plain(tag) && split_name(name)?.1.is_none() {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}:({})", tag.symbol()))
    }
}

// ==============================================================================
// Native encoding
// ==============================================================================

fn encode(value: &Value) -> Result<NativeValue> {
    Ok(match value {
        Value::Int(v) => NativeValue::Dword(*v as u32),
        Value::UInt(v) => NativeValue::Dword(*v),
        Value::Long(Long(v)) => NativeValue::Dword(*v as u32),
        Value::ULong(ULong(v)) => NativeValue::Dword(*v),
        Value::Char(v) => NativeValue::Dword(i32::from(*v) as u32),
        Value::UChar(v) => NativeValue::Dword(u32::from(*v)),
        Value::Short(v) => NativeValue::Dword(i32::from(*v) as u32),
        Value::UShort(v) => NativeValue::Dword(u32::from(*v)),
        Value::Bool(v) => NativeValue::Dword(u32::from(*v)),
        Value::LongLong(v) => NativeValue::Qword(*v as u64),
        Value::ULongLong(v) => NativeValue::Qword(*v),
        Value::Text(v) => NativeValue::Sz(v.clone()),
        Value::TextList(v) => NativeValue::MultiSz(v.clone()),
        Value::DateTime(v) => NativeValue::Binary(to_ole(v)?.to_le_bytes().to_vec()),
        Value::Float(v) => NativeValue::Binary(f64::from(*v).to_le_bytes().to_vec()),
        Value::Double(v) => NativeValue::Binary(v.to_le_bytes().to_vec()),
        Value::Currency(v) => NativeValue::Binary(v.scaled().to_le_bytes().to_vec()),
        Value::ByteArray(ByteArray(v)) | Value::ByteVec(v) => NativeValue::Binary(v.clone()),
    })
}

fn narrow<S, T>(full_name: &str, raw: S) -> Result<T>
where
    S: Copy + Display,
    T: TryFrom<S>,
{
    T::try_from(raw)
        .map_err(|_| Error::format(format!("value '{full_name}' holds {raw}, out of range for its tag")))
}

fn eight_bytes(full_name: &str, bytes: &[u8]) -> Result<[u8; 8]> {
    <[u8; 8]>::try_from(bytes).map_err(|_| {
        Error::format(format!(
            "value '{full_name}' holds {} bytes, expected 8",
            bytes.len()
        ))
    })
}

fn decode(full_name: &str, tag: TypeTag, native: NativeValue) -> Result<Value> {
    Ok(match (tag, native) {
        (TypeTag::Int, NativeValue::Dword(v)) => Value::Int(v as i32),
        (TypeTag::UInt, NativeValue::Dword(v)) => Value::UInt(v),
        (TypeTag::Long, NativeValue::Dword(v)) => Value::Long(Long(v as i32)),
        (TypeTag::ULong, NativeValue::Dword(v)) => Value::ULong(ULong(v)),
        (TypeTag::Char, NativeValue::Dword(v)) => Value::Char(narrow(full_name, v as i32)?),
        (TypeTag::UChar, NativeValue::Dword(v)) => Value::UChar(narrow(full_name, v)?),
        (TypeTag::Short, NativeValue::Dword(v)) => Value::Short(narrow(full_name, v as i32)?),
        (TypeTag::UShort, NativeValue::Dword(v)) => Value::UShort(narrow(full_name, v)?),
        (TypeTag::Bool, NativeValue::Dword(v)) => Value::Bool(v != 0),
        (TypeTag::LongLong, NativeValue::Qword(v)) => Value::LongLong(v as i64),
        (TypeTag::ULongLong, NativeValue::Qword(v)) => Value::ULongLong(v),
        (TypeTag::Text, NativeValue::Sz(v)) => Value::Text(v),
        (TypeTag::Text, NativeValue::ExpandSz(v)) => Value::Text(expand_env(&v)),
        (TypeTag::TextList, NativeValue::MultiSz(v)) => Value::TextList(v),
        (TypeTag::DateTime, NativeValue::Binary(v)) => {
            Value::DateTime(from_ole(f64::from_le_bytes(eight_bytes(full_name, &v)?))?)
        }
        (TypeTag::Float, NativeValue::Binary(v)) => {
            Value::Float(f64::from_le_bytes(eight_bytes(full_name, &v)?) as f32)
        }
        (TypeTag::Double, NativeValue::Binary(v)) => {
            Value::Double(f64::from_le_bytes(eight_bytes(full_name, &v)?))
        }
        (TypeTag::Currency, NativeValue::Binary(v)) => {
            Value::Currency(Currency::from_scaled(i64::from_le_bytes(eight_bytes(full_name, &v)?)))
        }
        (TypeTag::ByteArray, NativeValue::Binary(v)) => Value::ByteArray(ByteArray(v)),
        (TypeTag::ByteVec, NativeValue::Binary(v)) => Value::ByteVec(v),
        (tag, native) => {
            return Err(Error::format(format!(
                "value '{full_name}' tagged {tag} is stored as {}",
                native.kind()
            )));
        }
    })
}

/// Tag implied by the native type of an undecorated value.
fn plain_tag(full_name: &str, kind: NativeKind) -> Result<TypeTag> {
    match kind {
        NativeKind::Dword => Ok(TypeTag::Int),
        NativeKind::Qword => Ok(TypeTag::LongLong),
        NativeKind::Sz | NativeKind::ExpandSz => Ok(TypeTag::Text),
        NativeKind::MultiSz => Ok(TypeTag::TextList),
        NativeKind::Binary => Ok(TypeTag::ByteArray),
        NativeKind::Link | NativeKind::None => Err(Error::UnsupportedType {
            name: full_name.to_string(),
            native: kind.to_string(),
        }),
    }
}

/// Substitute `%VAR%` references from the process environment. Unknown
/// variables are left as written.
fn expand_env(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push('%');
                out.push_str(name);
                out.push('%');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

// ==============================================================================
// Store
// ==============================================================================

#[derive(Debug, Clone)]
pub struct RegistryStore {
    hive: Hive,
    root_key: String,
}

impl RegistryStore {
    pub fn new(hive: Hive, root_key: impl Into<String>) -> Self {
        Self { hive, root_key: root_key.into() }
    }

    /// Store rooted at `Software\<company>\<product>\<version>`.
    pub fn for_app(hive: Hive, company: &str, product: &str, version: &str) -> Self {
        let separator = KEY_SEPARATOR.to_string();
        let root_key = [SOFTWARE_PREFIX, company, product, version].join(separator.as_str());
        Self::new(hive, root_key)
    }

    pub fn hive(&self) -> &Hive {
        &self.hive
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    fn key_path(&self, path: &ConfigPath) -> String {
        let mut key = self.root_key.clone();
        for segment in path.segments() {
            key.push(KEY_SEPARATOR);
            key.push_str(segment);
        }
        key
    }
}

impl ConfigStore for RegistryStore {
    fn is_present(&self) -> bool {
        self.hive.key_exists(&self.root_key)
    }

    fn open(&mut self) -> Result<()> {
        self.hive.reload()
    }

    fn close(&mut self) {}

    fn create_value_list(&mut self, path: &ConfigPath) -> Result<BTreeMap<String, Value>> {
        let Some(key) = KeySession::open(&self.hive, self.key_path(path)) else {
            return Ok(BTreeMap::new());
        };
        let mut list = BTreeMap::new();
        for stored in key.value_names() {
            let (base, tag) = split_name(&stored)?;
            let full_name = key.full_name(&stored);
            let native = key.read(&stored)?;
            let tag = match tag {
                Some(tag) => tag,
                None => plain_tag(&full_name, native.kind())?,
            };
            let value = decode(&full_name, tag, native)?;
            if list.insert(base.to_string(), value).is_some() {
                warn!(key = %key.key(), value = %base, "Value stored under several decorations, keeping the last");
            }
        }
        debug!(key = %key.key(), count = list.len(), "Read key values");
        Ok(list)
    }

    fn create_node_list(&mut self, path: &ConfigPath) -> Result<Vec<String>> {
        Ok(KeySession::open(&self.hive, self.key_path(path))
            .map(|key| key.subkey_names())
            .unwrap_or_default())
    }

    fn save_value_list(&mut self, path: &ConfigPath, values: &ValueList, mode: SaveMode) -> Result<()> {
        let key = KeySession::create(&self.hive, self.key_path(path));

        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for stored in key.value_names() {
            let (base, _) = split_name(&stored)?;
            aliases.entry(base.to_string()).or_default().push(stored.clone());
        }

        for (name, pending) in pending_changes(values, mode) {
            let existing = aliases.get(name).map(Vec::as_slice).unwrap_or_default();
            match pending {
                Pending::Save(value) => {
                    let stored = stored_name(name, value.tag())?;
                    for alias in existing.iter().filter(|alias| **alias != stored) {
                        key.remove(alias);
                    }
                    key.write(&stored, encode(value)?)?;
                }
                Pending::Remove => {
                    for alias in existing {
                        key.remove(alias);
                    }
                }
            }
        }
        debug!(key = %key.key(), ?mode, "Saved key values");
        Ok(())
    }

    fn delete_node(&mut self, path: &ConfigPath) -> Result<()> {
        let key = self.key_path(path);
        self.hive.delete_key_tree(&key);
        debug!(key = %key, "Deleted key tree");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.hive.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Operation, ValueEntry};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const ROOT: &str = r"Software\Acme\Widget\1.0";

    fn store() -> RegistryStore {
        RegistryStore::for_app(Hive::in_memory(), "Acme", "Widget", "1.0")
    }

    fn write(store: &mut RegistryStore, path: &str, entries: Vec<(&str, Value)>) {
        let values: ValueList = entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), ValueEntry::new(value, Operation::Write)))
            .collect();
        store
            .save_value_list(&ConfigPath::parse(path), &values, SaveMode::Dirty)
            .unwrap();
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Count:(u)").unwrap(), ("Count", Some(TypeTag::UInt)));
        assert_eq!(split_name("Count:(ull)").unwrap(), ("Count", Some(TypeTag::ULongLong)));
        assert_eq!(split_name("Count").unwrap(), ("Count", None));
        assert_eq!(split_name("odd:(zz)").unwrap(), ("odd:(zz)", None));
        assert_eq!(split_name("x:(i):(sz)").unwrap(), ("x:(i)", Some(TypeTag::Text)));
        assert_eq!(split_name("").unwrap(), ("", None));
    }

    #[test]
    fn test_reads_decorated_dword() {
        let mut store = store();
        store.hive().create_key(ROOT);
        store.hive().set_value(ROOT, "Count:(u)", NativeValue::Dword(42)).unwrap();
        let values = store.create_value_list(&ConfigPath::root()).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["Count"], Value::UInt(42));
    }

    #[test]
    fn test_stored_names_and_natives() {
        let mut store = store();
        let when = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        write(
            &mut store,
            "",
            vec![
                ("i", Value::Int(-1)),
                ("c", Value::Char(-2)),
                ("ll", Value::LongLong(-3)),
                ("ull", Value::ULongLong(u64::MAX)),
                ("sz", Value::Text("x".into())),
                ("sv", Value::TextList(vec!["a".into(), "b".into()])),
                ("dab", Value::ByteArray(ByteArray(vec![1, 2]))),
                ("vb", Value::ByteVec(vec![3])),
                ("dt", Value::DateTime(when)),
                ("cur", Value::Currency(Currency::from_scaled(12_345))),
                ("b", Value::Bool(true)),
            ],
        );
        let hive = store.hive();
        assert_eq!(hive.query_value(ROOT, "i"), Some(NativeValue::Dword(u32::MAX)));
        assert_eq!(hive.query_value(ROOT, "c:(c)"), Some(NativeValue::Dword(0xFFFF_FFFE)));
        assert_eq!(hive.query_value(ROOT, "ll"), Some(NativeValue::Qword((-3i64) as u64)));
        assert_eq!(hive.query_value(ROOT, "ull:(ull)"), Some(NativeValue::Qword(u64::MAX)));
        assert_eq!(hive.query_value(ROOT, "sz"), Some(NativeValue::Sz("x".into())));
        assert_eq!(
            hive.query_value(ROOT, "sv"),
            Some(NativeValue::MultiSz(vec!["a".into(), "b".into()]))
        );
        assert_eq!(hive.query_value(ROOT, "dab"), Some(NativeValue::Binary(vec![1, 2])));
        assert_eq!(hive.query_value(ROOT, "vb:(vb)"), Some(NativeValue::Binary(vec![3])));
        assert_eq!(
            hive.query_value(ROOT, "dt:(dt)"),
            Some(NativeValue::Binary(2.5f64.to_le_bytes().to_vec()))
        );
        assert_eq!(
            hive.query_value(ROOT, "cur:(cur)"),
            Some(NativeValue::Binary(12_345i64.to_le_bytes().to_vec()))
        );
        assert_eq!(hive.query_value(ROOT, "b:(b)"), Some(NativeValue::Dword(1)));

        let values = store.create_value_list(&ConfigPath::root()).unwrap();
        assert_eq!(values["c"], Value::Char(-2));
        assert_eq!(values["dt"], Value::DateTime(when));
        assert_eq!(values["vb"], Value::ByteVec(vec![3]));
        assert_eq!(values["dab"], Value::ByteArray(ByteArray(vec![1, 2])));
        assert_eq!(values.len(), 11);
    }

    #[test]
    fn test_undecorated_fallback() {
        let mut store = store();
        let hive = store.hive().clone();
        hive.create_key(ROOT);
        hive.set_value(ROOT, "d", NativeValue::Dword(7)).unwrap();
        hive.set_value(ROOT, "q", NativeValue::Qword(8)).unwrap();
        hive.set_value(ROOT, "bin", NativeValue::Binary(vec![9])).unwrap();
        hive.set_value(ROOT, "list", NativeValue::MultiSz(vec!["z".into()])).unwrap();
        let values = store.create_value_list(&ConfigPath::root()).unwrap();
        assert_eq!(values["d"], Value::Int(7));
        assert_eq!(values["q"], Value::LongLong(8));
        assert_eq!(values["bin"], Value::ByteArray(ByteArray(vec![9])));
        assert_eq!(values["list"], Value::TextList(vec!["z".into()]));

        hive.set_value(ROOT, "link", NativeValue::Link("elsewhere".into())).unwrap();
        assert!(matches!(
            store.create_value_list(&ConfigPath::root()),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_expand_sz() {
        let Some((name, value)) = std::env::vars()
            .find(|(name, value)| !name.is_empty() && !name.contains('%') && !value.contains('%'))
        else {
            return;
        };
        assert_eq!(expand_env(&format!("<%{name}%>")), format!("<{value}>"));
        assert_eq!(expand_env("%CFGTREE_SURELY_UNSET_VARIABLE%"), "%CFGTREE_SURELY_UNSET_VARIABLE%");
        assert_eq!(expand_env("100%"), "100%");
        assert_eq!(expand_env("%%"), "%%");

        let mut store = store();
        store.hive().create_key(ROOT);
        store
            .hive()
            .set_value(ROOT, "Path", NativeValue::ExpandSz(format!("%{name}%/x")))
            .unwrap();
        let values = store.create_value_list(&ConfigPath::root()).unwrap();
        assert_eq!(values["Path"], Value::Text(format!("{value}/x")));
    }

    #[test]
    fn test_mismatched_native_is_format_error() {
        let mut store = store();
        store.hive().create_key(ROOT);
        store.hive().set_value(ROOT, "v:(dbl)", NativeValue::Dword(1)).unwrap();
        assert!(matches!(
            store.create_value_list(&ConfigPath::root()),
            Err(Error::Format(_))
        ));

        store.hive().delete_value(ROOT, "v:(dbl)");
        store.hive().set_value(ROOT, "v:(c)", NativeValue::Dword(300)).unwrap();
        assert!(matches!(
            store.create_value_list(&ConfigPath::root()),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_retyping_purges_old_decoration() {
        let mut store = store();
        write(&mut store, "", vec![("Count", Value::Int(1))]);
        write(&mut store, "", vec![("Count", Value::UInt(2))]);
        assert_eq!(store.hive().value_names(ROOT).unwrap(), ["Count:(u)"]);
        write(&mut store, "", vec![("Count", Value::LongLong(3))]);
        assert_eq!(store.hive().value_names(ROOT).unwrap(), ["Count"]);

        let mut erase = ValueList::new();
        erase.insert("Count".into(), ValueEntry::new(Value::LongLong(3), Operation::Erase));
        store.hive().set_value(ROOT, "Count:(s)", NativeValue::Dword(4)).unwrap();
        store.save_value_list(&ConfigPath::root(), &erase, SaveMode::Dirty).unwrap();
        assert!(store.hive().value_names(ROOT).unwrap().is_empty());
    }

    #[test]
    fn test_name_that_looks_decorated() {
        let mut store = store();
        write(&mut store, "", vec![("x:(i)", Value::Text("t".into()))]);
        assert_eq!(store.hive().value_names(ROOT).unwrap(), ["x:(i):(sz)"]);
        let values = store.create_value_list(&ConfigPath::root()).unwrap();
        assert_eq!(values["x:(i)"], Value::Text("t".into()));
    }

    #[test]
    fn test_nodes_and_deletion() {
        let mut store = store();
        assert!(!store.is_present());
        write(&mut store, "a/b", vec![("v", Value::Int(1))]);
        write(&mut store, "c", vec![("v", Value::Int(2))]);
        assert!(store.is_present());
        assert_eq!(store.create_node_list(&ConfigPath::root()).unwrap(), ["a", "c"]);
        assert!(store.hive().key_exists(&format!(r"{ROOT}\a\b")));

        store.delete_node(&ConfigPath::parse("a")).unwrap();
        assert_eq!(store.create_node_list(&ConfigPath::root()).unwrap(), ["c"]);
        assert!(store.create_value_list(&ConfigPath::parse("a/b")).unwrap().is_empty());

        store.delete_node(&ConfigPath::root()).unwrap();
        assert!(!store.is_present());
        assert!(store.hive().key_exists(r"Software\Acme\Widget"));
    }
}
