//! JSON document store
//!
//! Every node is an object with optional `"nodes"` and `"values"` members.
//! Default kinds (`i`, `b`, `sz`) are bare scalars; every other kind, or every
//! kind when explicit typing is on, is a one-key wrapper `{"tag": raw}`.
//!
//! The document is read when a session opens and written back on flush, so
//! members the tree never touched survive a save.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::constants::json::{NODES, VALUES};
use crate::error::{Error, Result};
use crate::store::{ConfigPath, ConfigStore, Pending, SaveMode, ValueList, pending_changes};
use crate::value::{Long, TypeTag, ULong, Value, encode_base64, format_iso};

type Object = Map<String, JsonValue>;

#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    compact: bool,
    explicit_types: bool,
    /// Document of the current session.
    document: Option<Object>,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compact: false,
            explicit_types: false,
            document: None,
        }
    }

    /// Write minified JSON instead of 2-space indented JSON.
    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Wrap default kinds too.
    pub fn explicit_types(mut self, explicit: bool) -> Self {
        self.explicit_types = explicit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> Result<Object> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Object::new()),
            Err(e) => return Err(Error::io(&self.path, e)),
        };
        if contents.trim().is_empty() {
            return Ok(Object::new());
        }
        match serde_json::from_str(&contents)? {
            JsonValue::Object(document) => {
                info!(path = %self.path.display(), "Loaded JSON document");
                Ok(document)
            }
            _ => Err(Error::format(format!(
                "{}: document root is not an object",
                self.path.display()
            ))),
        }
    }

    fn document(&mut self) -> Result<&mut Object> {
        self.document
            .as_mut()
            .ok_or_else(|| Error::backend("JSON store used outside of a session"))
    }
}

impl ConfigStore for JsonStore {
    fn is_present(&self) -> bool {
        self.path.exists()
    }

    fn open(&mut self) -> Result<()> {
        self.document = Some(self.load_document()?);
        Ok(())
    }

    fn close(&mut self) {
        self.document = None;
    }

    fn create_value_list(&mut self, path: &ConfigPath) -> Result<BTreeMap<String, Value>> {
        let document = self.document()?;
        let Some(values) = node_at(document, path.segments()).and_then(|node| member(node, VALUES)) else {
            return Ok(BTreeMap::new());
        };

        let mut list = BTreeMap::new();
        for (name, raw) in values {
            if let Some(value) = decode(name, raw)? {
                list.insert(name.clone(), value);
            }
        }
        debug!(path = %path, count = list.len(), "Read JSON value list");
        Ok(list)
    }

    fn create_node_list(&mut self, path: &ConfigPath) -> Result<Vec<String>> {
        let document = self.document()?;
        let Some(nodes) = node_at(document, path.segments()).and_then(|node| member(node, NODES)) else {
            return Ok(Vec::new());
        };
        Ok(nodes
            .iter()
            .filter(|(name, node)| {
                let is_node = node.is_object();
                if !is_node {
                    warn!(path = %path, node = %name, "Skipping JSON node that is not an object");
                }
                is_node
            })
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn save_value_list(&mut self, path: &ConfigPath, values: &ValueList, mode: SaveMode) -> Result<()> {
        let explicit = self.explicit_types;
        let document = self.document()?;
        let node = force_node(document, path.segments())?;
        let stored = force_object(node, VALUES)?;
        for (name, pending) in pending_changes(values, mode) {
            match pending {
                Pending::Save(value) => {
                    stored.insert(name.to_string(), encode(value, explicit));
                }
                Pending::Remove => {
                    stored.shift_remove(name);
                }
            }
        }
        debug!(path = %path, ?mode, "Saved JSON value list");
        Ok(())
    }

    fn delete_node(&mut self, path: &ConfigPath) -> Result<()> {
        let document = self.document()?;
        match path.split_last() {
            None => document.clear(),
            Some((name, parent)) => {
                if let Some(nodes) = node_at_mut(document, parent)
                    .and_then(|node| node.get_mut(NODES))
                    .and_then(JsonValue::as_object_mut)
                {
                    nodes.shift_remove(name);
                }
            }
        }
        debug!(path = %path, "Deleted JSON node");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let compact = self.compact;
        let document = JsonValue::Object(self.document()?.clone());
        let contents = if compact {
            serde_json::to_string(&document)?
        } else {
            serde_json::to_string_pretty(&document)?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&self.path, contents).map_err(|e| Error::io(&self.path, e))?;
        info!(path = %self.path.display(), compact, "Wrote JSON document");
        Ok(())
    }
}

// ==============================================================================
// Document navigation
// ==============================================================================

fn member<'a>(node: &'a Object, key: &str) -> Option<&'a Object> {
    node.get(key).and_then(JsonValue::as_object)
}

fn node_at<'a>(root: &'a Object, segments: &[String]) -> Option<&'a Object> {
    segments
        .iter()
        .try_fold(root, |node, name| member(member(node, NODES)?, name))
}

fn node_at_mut<'a>(root: &'a mut Object, segments: &[String]) -> Option<&'a mut Object> {
    segments.iter().try_fold(root, |node, name| {
        node.get_mut(NODES)?
            .as_object_mut()?
            .get_mut(name)?
            .as_object_mut()
    })
}

fn force_object<'a>(node: &'a mut Object, key: &str) -> Result<&'a mut Object> {
    node.entry(key)
        .or_insert_with(|| JsonValue::Object(Object::new()))
        .as_object_mut()
        .ok_or_else(|| Error::format(format!("JSON member '{key}' is not an object")))
}

fn force_node<'a>(root: &'a mut Object, segments: &[String]) -> Result<&'a mut Object> {
    segments
        .iter()
        .try_fold(root, |node, name| force_object(force_object(node, NODES)?, name))
}

// ==============================================================================
// Value encoding
// ==============================================================================

fn is_default_kind(tag: TypeTag) -> bool {
    matches!(tag, TypeTag::Int | TypeTag::Bool | TypeTag::Text)
}

fn float(v: f64) -> JsonValue {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn encode(value: &Value, explicit: bool) -> JsonValue {
    let raw = match value {
        Value::Int(v) => JsonValue::from(*v),
        Value::UInt(v) => JsonValue::from(*v),
        Value::Long(Long(v)) => JsonValue::from(*v),
        Value::ULong(ULong(v)) => JsonValue::from(*v),
        Value::Char(v) => JsonValue::from(*v),
        Value::UChar(v) => JsonValue::from(*v),
        Value::Short(v) => JsonValue::from(*v),
        Value::UShort(v) => JsonValue::from(*v),
        Value::LongLong(v) => JsonValue::from(*v),
        // Out of reach for parsers that read every number as a double.
        Value::ULongLong(v) => JsonValue::String(v.to_string()),
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Text(v) => JsonValue::String(v.clone()),
        Value::DateTime(v) => JsonValue::String(format_iso(v)),
        // Shortest f32 text, so 0.1 stays 0.1 once widened.
        Value::Float(v) => float(v.to_string().parse().unwrap_or(f64::from(*v))),
        Value::Double(v) => float(*v),
        Value::Currency(v) => JsonValue::String(v.to_string()),
        Value::TextList(items) => JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect()),
        Value::ByteArray(v) => JsonValue::String(encode_base64(&v.0)),
        Value::ByteVec(v) => JsonValue::String(encode_base64(v)),
    };

    if !explicit && is_default_kind(value.tag()) {
        return raw;
    }
    let mut wrapper = Object::new();
    wrapper.insert(value.tag().symbol().to_string(), raw);
    JsonValue::Object(wrapper)
}

/// Decode one member of a `"values"` object. `None` means skipped.
fn decode(name: &str, raw: &JsonValue) -> Result<Option<Value>> {
    let value = match raw {
        JsonValue::Bool(v) => Value::Bool(*v),
        JsonValue::String(v) => Value::Text(v.clone()),
        JsonValue::Number(n) => bare_number(n),
        JsonValue::Object(wrapper) => {
            let mut members = wrapper.iter();
            let (Some((symbol, inner)), None) = (members.next(), members.next()) else {
                warn!(value = %name, members = wrapper.len(), "Skipping JSON value wrapper without exactly one member");
                return Ok(None);
            };
            let Some(tag) = TypeTag::from_symbol(symbol) else {
                warn!(value = %name, tag = %symbol, "Skipping JSON value with unknown type tag");
                return Ok(None);
            };
            decode_tagged(name, tag, inner)?
        }
        JsonValue::Array(_) | JsonValue::Null => {
            warn!(value = %name, "Skipping untyped JSON array or null value");
            return Ok(None);
        }
    };
    Ok(Some(value))
}

fn bare_number(n: &Number) -> Value {
    if let Some(v) = n.as_i64() {
        i32::try_from(v).map(Value::Int).unwrap_or(Value::LongLong(v))
    } else if let Some(v) = n.as_u64() {
        Value::ULongLong(v)
    } else {
        Value::Double(n.as_f64().unwrap_or_default())
    }
}

fn integer<T: TryFrom<i64>>(raw: &JsonValue) -> Option<T> {
    raw.as_i64().and_then(|v| T::try_from(v).ok())
}

fn decode_tagged(name: &str, tag: TypeTag, raw: &JsonValue) -> Result<Value> {
    let malformed = || Error::format(format!("JSON value '{name}' has a malformed '{tag}' payload"));

    // String payloads use the shared text form: ull, cur, dt, blobs and
    // non-finite floats are written that way.
    if let JsonValue::String(text) = raw {
        if tag != TypeTag::TextList {
            return Value::from_text(tag, text);
        }
    }

    Ok(match tag {
        TypeTag::Int => Value::Int(integer(raw).ok_or_else(malformed)?),
        TypeTag::UInt => Value::UInt(integer(raw).ok_or_else(malformed)?),
        TypeTag::Long => Value::Long(Long(integer(raw).ok_or_else(malformed)?)),
        TypeTag::ULong => Value::ULong(ULong(integer(raw).ok_or_else(malformed)?)),
        TypeTag::Char => Value::Char(integer(raw).ok_or_else(malformed)?),
        TypeTag::UChar => Value::UChar(integer(raw).ok_or_else(malformed)?),
        TypeTag::Short => Value::Short(integer(raw).ok_or_else(malformed)?),
        TypeTag::UShort => Value::UShort(integer(raw).ok_or_else(malformed)?),
        TypeTag::LongLong => Value::LongLong(raw.as_i64().ok_or_else(malformed)?),
        TypeTag::ULongLong => Value::ULongLong(raw.as_u64().ok_or_else(malformed)?),
        TypeTag::Bool => Value::Bool(raw.as_bool().ok_or_else(malformed)?),
        TypeTag::Float => Value::Float(raw.as_f64().ok_or_else(malformed)? as f32),
        TypeTag::Double => Value::Double(raw.as_f64().ok_or_else(malformed)?),
        TypeTag::Currency => {
            let n = raw.as_number().ok_or_else(malformed)?;
            Value::Currency(n.to_string().parse()?)
        }
        TypeTag::TextList => {
            let items = raw.as_array().ok_or_else(malformed)?;
            let items = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(malformed)?;
            Value::TextList(items)
        }
        TypeTag::Text | TypeTag::DateTime | TypeTag::ByteArray | TypeTag::ByteVec => {
            return Err(malformed());
        }
    })
}
