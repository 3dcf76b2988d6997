//! Configuration tree nodes
//!
//! A node owns its values (each with a pending [`Operation`]) and its child
//! nodes. Reads insert defaults, writes only dirty an entry when the value
//! actually changes, and deletions are tombstones until the next flush.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::Debug;

use tracing::debug;

use super::enums::EnumTable;
use crate::error::{Error, Result};
use crate::store::{ConfigPath, ConfigStore, Operation, SaveMode, Session, StoreHandle, ValueEntry, ValueList};
use crate::value::{ConfigValue, TypeTag, Value};

/// Child nodes of one node, by name.
pub type NodeList = BTreeMap<String, ConfigNode>;

#[derive(Debug)]
pub struct ConfigNode {
    path: ConfigPath,
    values: ValueList,
    nodes: NodeList,
    deleted: bool,
    /// Stored values and child names have been merged in.
    loaded: bool,
    /// Where an on-demand node loads itself from.
    source: Option<StoreHandle>,
}

impl ConfigNode {
    pub(crate) fn root(source: Option<StoreHandle>) -> Self {
        Self::pending(ConfigPath::root(), source)
    }

    fn pending(path: ConfigPath, source: Option<StoreHandle>) -> Self {
        Self {
            path,
            values: ValueList::new(),
            nodes: NodeList::new(),
            deleted: false,
            loaded: false,
            source,
        }
    }

    pub fn path(&self) -> &ConfigPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    // ==========================================================================
    // Navigation
    // ==========================================================================

    /// Get or create the child `name`. Never touches the store.
    pub fn sub_node(&mut self, name: &str) -> &mut ConfigNode {
        let Self { path, nodes, loaded, source, .. } = self;
        nodes.entry(name.to_string()).or_insert_with(|| {
            let mut child = Self::pending(path.child(name), source.clone());
            // A loaded parent already knows every stored child.
            child.loaded = *loaded;
            child
        })
    }

    /// Alias of [`sub_node`](Self::sub_node).
    pub fn node(&mut self, name: &str) -> &mut ConfigNode {
        self.sub_node(name)
    }

    /// Walk (and create) the nodes along `path`, relative to this node.
    pub fn node_at(&mut self, path: &ConfigPath) -> &mut ConfigNode {
        path.segments()
            .iter()
            .fold(self, |node, segment| node.sub_node(segment))
    }

    /// Child `name` as held in memory, without loading.
    pub fn find_sub_node(&self, name: &str) -> Option<&ConfigNode> {
        self.nodes.get(name)
    }

    /// Children held in memory, without loading.
    pub fn sub_nodes(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    // ==========================================================================
    // Typed values
    // ==========================================================================

    /// Read `name`, inserting `default` on first access.
    pub fn get_item<T: ConfigValue>(&mut self, name: &str, default: T) -> Result<T> {
        self.get_item_with(name, default, Operation::None)
    }

    /// Like [`get_item`](Self::get_item); a freshly inserted default is
    /// tagged with `op`, so `Operation::Write` persists it on the next flush.
    pub fn get_item_with<T: ConfigValue>(&mut self, name: &str, default: T, op: Operation) -> Result<T> {
        self.ensure_loaded()?;
        let stored = self.fetch(name, default.clone().into_value(), op);
        T::from_value(stored).map_err(|found| Error::TypeMismatch {
            name: name.to_string(),
            expected: T::TAG,
            found: found.tag(),
        })
    }

    /// Store `value` under `name`, marked for writing.
    ///
    /// Returns `false` when an identical value is already stored; the entry
    /// is then left untouched.
    pub fn put_item<T: ConfigValue>(&mut self, name: &str, value: T) -> Result<bool> {
        self.put_item_with(name, value, Operation::Write)
    }

    pub fn put_item_with<T: ConfigValue>(&mut self, name: &str, value: T, op: Operation) -> Result<bool> {
        self.put_value(name, value.into_value(), op)
    }

    /// Untyped [`put_item_with`](Self::put_item_with).
    pub fn put_value(&mut self, name: &str, value: Value, op: Operation) -> Result<bool> {
        self.ensure_loaded()?;
        match self.values.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(ValueEntry::new(value, op));
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if !entry.is_erased() && entry.value == value {
                    return Ok(false);
                }
                *entry = ValueEntry::new(value, op);
                Ok(true)
            }
        }
    }

    /// Read into `value`, using its current content as the default.
    pub fn restore<T: ConfigValue>(&mut self, name: &str, value: &mut T) -> Result<()> {
        *value = self.get_item(name, value.clone())?;
        Ok(())
    }

    pub fn save<T: ConfigValue>(&mut self, name: &str, value: &T) -> Result<()> {
        self.put_item(name, value.clone()).map(drop)
    }

    /// Read an enum stored by symbol, falling back to an integer ordinal.
    pub fn get_enum<E>(&mut self, name: &str, default: E, table: &EnumTable<E>) -> Result<E>
    where
        E: Copy + PartialEq + Debug,
    {
        let unknown = |symbol: String| Error::UnknownEnumName { name: name.to_string(), symbol };
        let default_symbol = table.symbol(default).ok_or_else(|| unknown(format!("{default:?}")))?;

        self.ensure_loaded()?;
        match self.fetch(name, Value::Text(default_symbol.to_string()), Operation::None) {
            Value::Text(symbol) => table.from_symbol(&symbol).ok_or_else(|| unknown(symbol)),
            Value::Int(ordinal) => table
                .from_ordinal(i64::from(ordinal))
                .ok_or_else(|| unknown(ordinal.to_string())),
            other => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: TypeTag::Text,
                found: other.tag(),
            }),
        }
    }

    /// Store an enum as its symbol.
    pub fn put_enum<E>(&mut self, name: &str, value: E, table: &EnumTable<E>) -> Result<bool>
    where
        E: Copy + PartialEq + Debug,
    {
        let symbol = table.symbol(value).ok_or_else(|| Error::UnknownEnumName {
            name: name.to_string(),
            symbol: format!("{value:?}"),
        })?;
        self.put_item(name, symbol.to_string())
    }

    /// Stored value of `name` (or the inserted default), inserting on first
    /// access. An erased entry yields the default and is only revived when
    /// `op` is `Write`.
    fn fetch(&mut self, name: &str, default: Value, op: Operation) -> Value {
        match self.values.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(ValueEntry::new(default.clone(), op));
                default
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if !entry.is_erased() {
                    return entry.value.clone();
                }
                if op == Operation::Write {
                    *entry = ValueEntry::new(default.clone(), op);
                }
                default
            }
        }
    }

    // ==========================================================================
    // Deletion
    // ==========================================================================

    /// Tombstone `name`; no-op when absent.
    pub fn delete_item(&mut self, name: &str) -> Result<()> {
        self.ensure_loaded()?;
        if let Some(entry) = self.values.get_mut(name) {
            entry.op = Operation::Erase;
        }
        Ok(())
    }

    /// [`clear`](Self::clear) the child `name`; no-op when absent.
    pub fn delete_sub_node(&mut self, name: &str) -> Result<()> {
        self.ensure_loaded()?;
        if let Some(child) = self.nodes.get_mut(name) {
            child.clear();
        }
        Ok(())
    }

    /// Drop every value and mark this node and all descendants deleted.
    pub fn clear(&mut self) {
        self.deleted = true;
        // Stored content no longer matters once the node is gone.
        self.loaded = true;
        self.values.clear();
        for child in self.nodes.values_mut() {
            child.clear();
        }
    }

    // ==========================================================================
    // State and enumeration
    // ==========================================================================

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_modified(&self) -> bool {
        self.deleted || self.values_modified() || self.nodes.values().any(ConfigNode::is_modified)
    }

    fn values_modified(&self) -> bool {
        self.values.values().any(|entry| entry.op != Operation::None)
    }

    /// Whether the stored values and child names have been read.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Treat this node as fully read; used when the store has nothing yet.
    pub(crate) fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Read this node from the store now, if it has not been yet.
    pub fn load(&mut self) -> Result<()> {
        self.ensure_loaded()
    }

    // Existence and enumeration load an on-demand node first, like reads do.

    pub fn item_exists(&mut self, name: &str) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.values.get(name).is_some_and(|entry| !entry.is_erased()))
    }

    pub fn sub_node_exists(&mut self, name: &str) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.nodes.contains_key(name))
    }

    pub fn node_count(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.nodes.len())
    }

    pub fn value_count(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.live_values().count())
    }

    pub fn node_names(&mut self) -> Result<impl Iterator<Item = &str>> {
        self.ensure_loaded()?;
        Ok(self.nodes.keys().map(String::as_str))
    }

    pub fn value_names(&mut self) -> Result<impl Iterator<Item = &str>> {
        self.ensure_loaded()?;
        Ok(self.live_values().map(|(name, _)| name))
    }

    pub fn values(&mut self) -> Result<impl Iterator<Item = (&str, &Value)>> {
        self.ensure_loaded()?;
        Ok(self.live_values())
    }

    /// Value of `name` as held in memory, without loading.
    pub fn raw_value(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .filter(|entry| !entry.is_erased())
            .map(|entry| &entry.value)
    }

    /// Pending operation of `name`, erased entries included.
    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.values.get(name).map(|entry| entry.op)
    }

    fn live_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values
            .iter()
            .filter(|(_, entry)| !entry.is_erased())
            .map(|(name, entry)| (name.as_str(), &entry.value))
    }

    // ==========================================================================
    // Store traversal
    // ==========================================================================

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let Some(source) = self.source.clone() else {
            self.loaded = true;
            return Ok(());
        };
        let mut session = Session::begin(&source)?;
        self.populate(&mut *session)
    }

    /// Merge this node's stored values and child names. Entries already in
    /// memory win over stored ones.
    pub(crate) fn populate(&mut self, store: &mut dyn ConfigStore) -> Result<()> {
        let stored = store.create_value_list(&self.path)?;
        let names = store.create_node_list(&self.path)?;
        debug!(path = %self.path, values = stored.len(), nodes = names.len(), "Node loaded");

        for (name, value) in stored {
            self.values
                .entry(name)
                .or_insert_with(|| ValueEntry::new(value, Operation::None));
        }
        for name in names {
            let path = self.path.child(&name);
            let source = self.source.clone();
            self.nodes.entry(name).or_insert_with(|| Self::pending(path, source));
        }
        self.loaded = true;
        Ok(())
    }

    /// Populate this node and, recursively, every child.
    pub(crate) fn read(&mut self, store: &mut dyn ConfigStore) -> Result<()> {
        if !self.loaded {
            self.populate(store)?;
        }
        for child in self.nodes.values_mut() {
            child.read(store)?;
        }
        Ok(())
    }

    /// Persist this subtree: deletion first, then the value list, then every
    /// modified child. `always` rewrites everything that has been loaded.
    pub(crate) fn write(&self, store: &mut dyn ConfigStore, always: bool) -> Result<()> {
        // An unloaded node has no content of its own to write, only children.
        if self.loaded {
            if self.deleted {
                store.delete_node(&self.path)?;
            }
            // A cleared node left empty stays gone even when rewriting everything.
            let rewrite = always && !(self.deleted && self.values.is_empty());
            if rewrite || self.values_modified() {
                let mode = if always { SaveMode::All } else { SaveMode::Dirty };
                store.save_value_list(&self.path, &self.values, mode)?;
            }
        }
        for child in self.nodes.values() {
            if always || child.is_modified() {
                child.write(store, always)?;
            }
        }
        Ok(())
    }

    /// Adopt the state a fresh reload would produce after a successful
    /// write. Returns whether this node is gone from the store.
    pub(crate) fn settle(&mut self) -> bool {
        let was_deleted = std::mem::take(&mut self.deleted);
        self.values.retain(|_, entry| !entry.is_erased());
        for entry in self.values.values_mut() {
            entry.op = Operation::None;
        }
        self.nodes.retain(|_, child| !child.settle());
        was_deleted && self.values.is_empty() && self.nodes.is_empty()
    }
}
