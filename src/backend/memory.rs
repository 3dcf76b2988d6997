//! In-process store
//!
//! Holds the tree as plain maps and records every call it receives. Clones
//! share state, so a test can hand one clone to a [`Config`](crate::Config)
//! and inspect the other.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::store::{ConfigPath, ConfigStore, Pending, SaveMode, ValueList, pending_changes};
use crate::value::Value;

/// One call received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Open,
    Close,
    CreateValueList(ConfigPath),
    CreateNodeList(ConfigPath),
    SaveValueList(ConfigPath, SaveMode),
    DeleteNode(ConfigPath),
    Flush,
}

#[derive(Debug, Default)]
struct MemoryNode {
    values: BTreeMap<String, Value>,
    nodes: BTreeMap<String, MemoryNode>,
}

impl MemoryNode {
    fn find(&self, path: &ConfigPath) -> Option<&MemoryNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, name| node.nodes.get(name))
    }

    fn find_mut(&mut self, segments: &[String]) -> Option<&mut MemoryNode> {
        segments.iter().try_fold(self, |node, name| node.nodes.get_mut(name))
    }

    fn force(&mut self, path: &ConfigPath) -> &mut MemoryNode {
        path.segments()
            .iter()
            .fold(self, |node, name| node.nodes.entry(name.clone()).or_default())
    }
}

#[derive(Debug, Default)]
struct State {
    root: MemoryNode,
    calls: Vec<StoreCall>,
    fail_saves: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Rc<RefCell<State>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, creating the nodes along `path`.
    pub fn insert(&self, path: &ConfigPath, name: &str, value: Value) {
        self.0
            .borrow_mut()
            .root
            .force(path)
            .values
            .insert(name.to_string(), value);
    }

    pub fn value(&self, path: &ConfigPath, name: &str) -> Option<Value> {
        self.0.borrow().root.find(path)?.values.get(name).cloned()
    }

    pub fn node_exists(&self, path: &ConfigPath) -> bool {
        self.0.borrow().root.find(path).is_some()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.0.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.0.borrow_mut().calls.clear();
    }

    /// Make every subsequent value-list save fail.
    pub fn fail_saves(&self, fail: bool) {
        self.0.borrow_mut().fail_saves = fail;
    }

    fn record(&self, call: StoreCall) {
        self.0.borrow_mut().calls.push(call);
    }
}

impl ConfigStore for MemoryStore {
    fn open(&mut self) -> Result<()> {
        self.record(StoreCall::Open);
        Ok(())
    }

    fn close(&mut self) {
        self.record(StoreCall::Close);
    }

    fn create_value_list(&mut self, path: &ConfigPath) -> Result<BTreeMap<String, Value>> {
        self.record(StoreCall::CreateValueList(path.clone()));
        let state = self.0.borrow();
        Ok(state.root.find(path).map(|node| node.values.clone()).unwrap_or_default())
    }

    fn create_node_list(&mut self, path: &ConfigPath) -> Result<Vec<String>> {
        self.record(StoreCall::CreateNodeList(path.clone()));
        let state = self.0.borrow();
        Ok(state
            .root
            .find(path)
            .map(|node| node.nodes.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn save_value_list(&mut self, path: &ConfigPath, values: &ValueList, mode: SaveMode) -> Result<()> {
        self.record(StoreCall::SaveValueList(path.clone(), mode));
        let mut state = self.0.borrow_mut();
        if state.fail_saves {
            return Err(Error::backend(format!("refusing to save {path}")));
        }
        let node = state.root.force(path);
        for (name, pending) in pending_changes(values, mode) {
            match pending {
                Pending::Save(value) => {
                    node.values.insert(name.to_string(), value.clone());
                }
                Pending::Remove => {
                    node.values.remove(name);
                }
            }
        }
        Ok(())
    }

    fn delete_node(&mut self, path: &ConfigPath) -> Result<()> {
        self.record(StoreCall::DeleteNode(path.clone()));
        let mut state = self.0.borrow_mut();
        match path.split_last() {
            None => state.root = MemoryNode::default(),
            Some((name, parent)) => {
                if let Some(node) = state.root.find_mut(parent) {
                    node.nodes.remove(name);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.record(StoreCall::Flush);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Operation, ValueEntry};

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let mut other = store.clone();
        other.open().unwrap();
        store.insert(&ConfigPath::parse("a/b"), "v", Value::Int(1));
        assert!(other.node_exists(&ConfigPath::parse("a")));
        assert_eq!(store.calls(), vec![StoreCall::Open]);
    }

    #[test]
    fn test_save_and_delete() {
        let mut store = MemoryStore::new();
        let path = ConfigPath::parse("x/y");
        let values: ValueList = [
            ("keep".to_string(), ValueEntry::new(Value::Int(1), Operation::Write)),
            ("skip".to_string(), ValueEntry::new(Value::Int(2), Operation::None)),
        ]
        .into_iter()
        .collect();
        store.save_value_list(&path, &values, SaveMode::Dirty).unwrap();
        assert_eq!(store.value(&path, "keep"), Some(Value::Int(1)));
        assert_eq!(store.value(&path, "skip"), None);
        assert_eq!(store.create_node_list(&ConfigPath::parse("x")).unwrap(), ["y"]);

        store.delete_node(&ConfigPath::parse("x")).unwrap();
        assert!(!store.node_exists(&ConfigPath::parse("x")));
        store.delete_node(&ConfigPath::parse("missing/deeper")).unwrap();
    }

    #[test]
    fn test_missing_node_reads_empty() {
        let mut store = MemoryStore::new();
        let path = ConfigPath::parse("nope");
        assert!(store.create_value_list(&path).unwrap().is_empty());
        assert!(store.create_node_list(&path).unwrap().is_empty());
    }
}
