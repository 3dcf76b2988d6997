//! Backend contract
//!
//! A [`ConfigStore`] persists one node at a time, addressed by its
//! [`ConfigPath`]. The tree drives the recursion; a store only ever sees a
//! single value list, a single child-name list or a single node deletion.

use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::value::Value;

// ==============================================================================
// Paths
// ==============================================================================

/// Node names from the root down to a node. The root is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Split a `/`-separated path; empty segments are ignored.
    pub fn parse(text: &str) -> Self {
        Self(
            text.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(name.to_string());
        Self(segments)
    }

    /// Last segment and the path of its parent.
    pub fn split_last(&self) -> Option<(&str, &[String])> {
        self.0.split_last().map(|(last, parent)| (last.as_str(), parent))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for ConfigPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ==============================================================================
// Change log
// ==============================================================================

/// Pending persistence state of one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operation {
    /// Loaded or inserted, nothing to persist.
    #[default]
    None,
    /// Must be written on the next flush.
    Write,
    /// Tombstoned, must be removed on the next flush.
    Erase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueEntry {
    pub value: Value,
    pub op: Operation,
}

impl ValueEntry {
    pub fn new(value: Value, op: Operation) -> Self {
        Self { value, op }
    }

    pub fn is_erased(&self) -> bool {
        self.op == Operation::Erase
    }
}

/// Values of one node, by name.
pub type ValueList = BTreeMap<String, ValueEntry>;

/// Which entries of a value list a save must persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Only `Write` and `Erase` entries.
    Dirty,
    /// Every entry; `Erase` entries are still removed.
    All,
}

/// What a store must do with one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pending<'a> {
    Save(&'a Value),
    Remove,
}

/// Entries of `values` a save must touch under `mode`, in name order.
pub fn pending_changes(
    values: &ValueList,
    mode: SaveMode,
) -> impl Iterator<Item = (&str, Pending<'_>)> + '_ {
    values.iter().filter_map(move |(name, entry)| {
        let pending = match (entry.op, mode) {
            (Operation::Erase, _) => Pending::Remove,
            (Operation::Write, _) | (Operation::None, SaveMode::All) => Pending::Save(&entry.value),
            (Operation::None, SaveMode::Dirty) => return None,
        };
        Some((name.as_str(), pending))
    })
}

// ==============================================================================
// Store trait
// ==============================================================================

/// A persistence backend for the configuration tree.
///
/// Every call between [`open`](Self::open) and [`close`](Self::close) belongs
/// to one scoped session: a construction-time load, an on-demand node load or
/// a flush. `close` must release whatever `open` acquired, even after a
/// failed operation.
pub trait ConfigStore {
    /// Whether anything is stored yet. Absent stores are not read at all.
    fn is_present(&self) -> bool {
        true
    }

    fn open(&mut self) -> Result<()>;

    fn close(&mut self);

    /// Immediate values of the node at `path`. A missing node has none.
    fn create_value_list(&mut self, path: &ConfigPath) -> Result<BTreeMap<String, Value>>;

    /// Immediate child names of the node at `path`. A missing node has none.
    fn create_node_list(&mut self, path: &ConfigPath) -> Result<Vec<String>>;

    /// Persist the entries of `values` selected by `mode`, creating the node
    /// if needed. Removing an entry that is not stored is not an error.
    fn save_value_list(&mut self, path: &ConfigPath, values: &ValueList, mode: SaveMode) -> Result<()>;

    /// Remove the node at `path` and everything beneath it. The root path
    /// empties the store. Deleting a missing node is not an error.
    fn delete_node(&mut self, path: &ConfigPath) -> Result<()>;

    /// Commit staged changes.
    fn flush(&mut self) -> Result<()>;
}

// ==============================================================================
// Shared handle and scoped sessions
// ==============================================================================

/// Store shared by a [`Config`](crate::Config) and its on-demand nodes.
#[derive(Clone)]
pub(crate) struct StoreHandle(Rc<RefCell<Box<dyn ConfigStore>>>);

impl StoreHandle {
    pub(crate) fn new(store: impl ConfigStore + 'static) -> Self {
        Self(Rc::new(RefCell::new(Box::new(store))))
    }

    pub(crate) fn is_present(&self) -> Result<bool> {
        self.0
            .try_borrow()
            .map(|store| store.is_present())
            .map_err(|_| Error::backend("store is busy"))
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StoreHandle").field(&Rc::as_ptr(&self.0)).finish()
    }
}

/// An open store, closed again when dropped.
pub(crate) struct Session<'a> {
    store: RefMut<'a, Box<dyn ConfigStore>>,
}

impl<'a> Session<'a> {
    pub(crate) fn begin(handle: &'a StoreHandle) -> Result<Self> {
        let mut store = handle
            .0
            .try_borrow_mut()
            .map_err(|_| Error::backend("store is already in use"))?;
        store.open()?;
        trace!("store session opened");
        Ok(Self { store })
    }
}

impl Deref for Session<'_> {
    type Target = dyn ConfigStore;

    fn deref(&self) -> &Self::Target {
        &**self.store
    }
}

impl DerefMut for Session<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.store
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.store.close();
        trace!("store session closed");
    }
}
