//! The configuration tree bound to one store

use tracing::{debug, info, warn};

use super::node::ConfigNode;
use super::options::{ConfigOptions, LoadPolicy};
use crate::error::Result;
use crate::store::{ConfigStore, Session, StoreHandle};

/// A configuration tree and the store it loads from and flushes to.
///
/// Dropping a `Config` flushes it (unless read-only) and only logs a failure;
/// call [`close`](Self::close) to observe the error instead.
#[derive(Debug)]
pub struct Config {
    root: ConfigNode,
    store: StoreHandle,
    options: ConfigOptions,
    closed: bool,
}

impl Config {
    /// Bind a tree to `store` and read it according to `options`.
    pub fn open(store: impl ConfigStore + 'static, options: ConfigOptions) -> Result<Self> {
        let store = StoreHandle::new(store);
        let mut root = ConfigNode::root(Some(store.clone()));

        if store.is_present()? {
            let mut session = Session::begin(&store)?;
            match options.load_policy {
                LoadPolicy::Eager => root.read(&mut *session)?,
                LoadPolicy::OnDemand => root.populate(&mut *session)?,
            }
        } else {
            debug!("Store is empty, starting with a blank tree");
            root.mark_loaded();
        }

        info!(
            policy = ?options.load_policy,
            read_only = options.read_only,
            nodes = root.node_count()?,
            values = root.value_count()?,
            "Configuration opened"
        );
        Ok(Self { root, store, options, closed: false })
    }

    pub fn root(&mut self) -> &mut ConfigNode {
        &mut self.root
    }

    pub fn root_ref(&self) -> &ConfigNode {
        &self.root
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    pub fn is_modified(&self) -> bool {
        self.root.is_modified()
    }

    /// Write every modified node (or every loaded node, with
    /// `always_flush_node`) and commit the store.
    ///
    /// Nothing is settled unless the whole flush succeeds, so a retry
    /// rewrites the same changes.
    pub fn flush(&mut self) -> Result<()> {
        if self.options.read_only {
            debug!("Read-only configuration, flush skipped");
            return Ok(());
        }
        let always = self.options.always_flush_node;
        if !always && !self.root.is_modified() {
            debug!("Configuration unchanged, flush skipped");
            return Ok(());
        }

        {
            let mut session = Session::begin(&self.store)?;
            self.root.write(&mut *session, always)?;
            session.flush()?;
        }
        self.root.settle();
        info!(always_flush = always, "Configuration flushed");
        Ok(())
    }

    /// Flush and release the store, reporting any flush error.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "Failed to flush configuration on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryStore, StoreCall};
    use crate::error::Error;
    use crate::store::{ConfigPath, Operation, SaveMode};
    use crate::value::Value;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(&ConfigPath::root(), "Top", Value::Int(1));
        store.insert(&ConfigPath::parse("Forms/Main"), "Width", Value::UInt(640));
        store.insert(&ConfigPath::parse("Forms/About"), "Shown", Value::Bool(false));
        store
    }

    #[test]
    fn test_eager_open_reads_whole_tree() {
        let store = seeded();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        assert!(!config.is_modified());
        let forms = config.root_ref().find_sub_node("Forms").unwrap();
        assert!(forms.find_sub_node("Main").unwrap().is_loaded());
        assert_eq!(
            config.root().node("Forms").node("Main").get_item("Width", 0u32).unwrap(),
            640
        );
        assert_eq!(store.calls().first(), Some(&StoreCall::Open));
    }

    #[test]
    fn test_on_demand_open_reads_root_only() {
        let store = seeded();
        let mut config = Config::open(
            store.clone(),
            ConfigOptions::default().with_load_policy(LoadPolicy::OnDemand),
        )
        .unwrap();
        let forms = config.root_ref().find_sub_node("Forms").unwrap();
        assert!(!forms.is_loaded());
        assert_eq!(config.root().get_item("Top", 0).unwrap(), 1);

        store.clear_calls();
        let main = config.root().node("Forms").node("Main");
        assert_eq!(main.get_item("Width", 0u32).unwrap(), 640);
        // Forms itself was never touched by a fallible accessor.
        assert!(!config.root_ref().find_sub_node("Forms").unwrap().is_loaded());
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Open,
                StoreCall::CreateValueList(ConfigPath::parse("Forms/Main")),
                StoreCall::CreateNodeList(ConfigPath::parse("Forms/Main")),
                StoreCall::Close,
            ]
        );
    }

    #[test]
    fn test_flush_skips_unmodified_tree() {
        let store = seeded();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        store.clear_calls();
        config.flush().unwrap();
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_flush_writes_and_settles() {
        let store = seeded();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        config.root().node("Forms").node("Main").put_item("Width", 800u32).unwrap();
        config.root().delete_item("Top").unwrap();
        store.clear_calls();
        config.flush().unwrap();

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Open,
                StoreCall::SaveValueList(ConfigPath::root(), SaveMode::Dirty),
                StoreCall::SaveValueList(ConfigPath::parse("Forms/Main"), SaveMode::Dirty),
                StoreCall::Flush,
                StoreCall::Close,
            ]
        );
        assert_eq!(store.value(&ConfigPath::parse("Forms/Main"), "Width"), Some(Value::UInt(800)));
        assert_eq!(store.value(&ConfigPath::root(), "Top"), None);
        assert!(!config.is_modified());
        assert_eq!(config.root_ref().operation("Top"), None);
    }

    #[test]
    fn test_second_identical_put_after_flush_is_noop() {
        let store = MemoryStore::new();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        assert!(config.root().put_item("Name", String::from("x")).unwrap());
        config.flush().unwrap();
        assert!(!config.root().put_item("Name", String::from("x")).unwrap());
        assert_eq!(config.root_ref().operation("Name"), Some(Operation::None));
        assert!(!config.is_modified());
    }

    #[test]
    fn test_always_flush_rewrites_unmodified_nodes() {
        let store = seeded();
        let options = ConfigOptions::default().with_always_flush_node(true);
        let mut config = Config::open(store.clone(), options).unwrap();
        store.clear_calls();
        config.flush().unwrap();
        let saves: Vec<_> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::SaveValueList(path, mode) => Some((path.to_string(), mode)),
                _ => None,
            })
            .collect();
        assert_eq!(
            saves,
            [
                ("/".to_string(), SaveMode::All),
                ("/Forms".to_string(), SaveMode::All),
                ("/Forms/About".to_string(), SaveMode::All),
                ("/Forms/Main".to_string(), SaveMode::All),
            ]
        );
    }

    #[test]
    fn test_read_only_never_writes() {
        let store = seeded();
        let options = ConfigOptions::default().with_read_only(true);
        let mut config = Config::open(store.clone(), options).unwrap();
        config.root().put_item("Top", 2).unwrap();
        store.clear_calls();
        config.flush().unwrap();
        drop(config);
        assert!(store.calls().is_empty());
        assert_eq!(store.value(&ConfigPath::root(), "Top"), Some(Value::Int(1)));
    }

    #[test]
    fn test_failed_flush_keeps_changes_for_retry() {
        let store = seeded();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        config.root().put_item("Top", 2).unwrap();
        store.fail_saves(true);
        assert!(matches!(config.flush(), Err(Error::Backend(_))));
        assert_eq!(config.root_ref().operation("Top"), Some(Operation::Write));
        assert_eq!(store.calls().last(), Some(&StoreCall::Close));

        store.fail_saves(false);
        config.flush().unwrap();
        assert_eq!(store.value(&ConfigPath::root(), "Top"), Some(Value::Int(2)));
    }

    #[test]
    fn test_drop_flushes() {
        let store = MemoryStore::new();
        {
            let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
            config.root().node("A").put_item("v", 1u8).unwrap();
        }
        assert_eq!(store.value(&ConfigPath::parse("A"), "v"), Some(Value::UChar(1)));
    }

    #[test]
    fn test_close_reports_error() {
        let store = MemoryStore::new();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        config.root().put_item("v", 1).unwrap();
        store.fail_saves(true);
        assert!(config.close().is_err());
    }

    #[test]
    fn test_clear_root_deletes_store_content() {
        let store = seeded();
        let mut config = Config::open(store.clone(), ConfigOptions::default()).unwrap();
        config.root().clear();
        config.flush().unwrap();
        assert!(!store.node_exists(&ConfigPath::parse("Forms")));
        assert_eq!(store.value(&ConfigPath::root(), "Top"), None);
        assert_eq!(config.root().node_count().unwrap(), 0);
        assert!(!config.root_ref().is_deleted());
    }
}
