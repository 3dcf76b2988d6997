//! Process-wide configuration instances
//!
//! One [`Config`] per backend kind, created on first use from an
//! [`AppIdentity`]. A `Config` is not `Send`, so each thread owns its own
//! instances. [`shutdown`] flushes and drops them; a thread exiting without
//! calling it flushes through the `Config` destructor.

use std::cell::RefCell;
use std::path::PathBuf;
use std::thread::LocalKey;

use tracing::info;

use crate::backend::{Hive, JsonStore, RegistryStore, XmlStore};
use crate::config::{Config, ConfigOptions};
use crate::constants::registry::{HIVE_DIR, HIVE_FILE};
use crate::constants::{json, xml};
use crate::error::{Error, Result};

/// Who the configuration belongs to. Files live under
/// `<config dir>/<company>/<product>/<version>/<name>.<ext>` and registry
/// keys under `Software\<company>\<product>\<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub company: String,
    pub product: String,
    pub version: String,
    pub name: String,
    base_dir: Option<PathBuf>,
}

impl AppIdentity {
    pub fn new(
        company: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            product: product.into(),
            version: version.into(),
            name: name.into(),
            base_dir: None,
        }
    }

    /// Keep files under `dir` instead of the user config directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Document path for the given file extension.
    pub fn file_path(&self, extension: &str) -> PathBuf {
        let mut path = self.base_dir();
        path.push(&self.company);
        path.push(&self.product);
        path.push(&self.version);
        path.push(format!("{}.{extension}", self.name));
        path
    }

    pub fn hive_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(HIVE_DIR).join(HIVE_FILE),
            None => Hive::default_path(),
        }
    }
}

type Slot = RefCell<Option<Config>>;

thread_local! {
    static JSON_CONFIG: Slot = const { RefCell::new(None) };
    static XML_CONFIG: Slot = const { RefCell::new(None) };
    static REGISTRY_CONFIG: Slot = const { RefCell::new(None) };
}

fn with_instance<R>(
    slot: &'static LocalKey<Slot>,
    open: impl FnOnce() -> Result<Config>,
    f: impl FnOnce(&mut Config) -> R,
) -> Result<R> {
    slot.with(|cell| {
        let mut instance = cell
            .try_borrow_mut()
            .map_err(|_| Error::backend("configuration instance is already in use"))?;
        let config = match &mut *instance {
            Some(config) => config,
            empty => empty.insert(open()?),
        };
        Ok(f(config))
    })
}

/// Run `f` on this thread's JSON configuration. Later calls reuse the
/// instance opened by the first one, whatever `app` they pass.
pub fn with_json_config<R>(app: &AppIdentity, f: impl FnOnce(&mut Config) -> R) -> Result<R> {
    with_instance(
        &JSON_CONFIG,
        || {
            let path = app.file_path(json::EXTENSION);
            info!(path = %path.display(), "Opening JSON configuration");
            Config::open(JsonStore::new(path), ConfigOptions::default())
        },
        f,
    )
}

pub fn with_xml_config<R>(app: &AppIdentity, f: impl FnOnce(&mut Config) -> R) -> Result<R> {
    with_instance(
        &XML_CONFIG,
        || {
            let path = app.file_path(xml::EXTENSION);
            info!(path = %path.display(), "Opening XML configuration");
            Config::open(XmlStore::new(path), ConfigOptions::default())
        },
        f,
    )
}

pub fn with_registry_config<R>(app: &AppIdentity, f: impl FnOnce(&mut Config) -> R) -> Result<R> {
    with_instance(
        &REGISTRY_CONFIG,
        || {
            let hive = Hive::open_file(app.hive_path())?;
            let store = RegistryStore::for_app(hive, &app.company, &app.product, &app.version);
            info!(key = %store.root_key(), "Opening registry configuration");
            Config::open(store, ConfigOptions::default())
        },
        f,
    )
}

/// Flush and drop this thread's instances. Every instance is closed; the
/// first flush error is returned.
pub fn shutdown() -> Result<()> {
    let mut outcome = Ok(());
    for slot in [&JSON_CONFIG, &XML_CONFIG, &REGISTRY_CONFIG] {
        let instance = slot.with(|cell| cell.try_borrow_mut().map(|mut c| c.take()));
        let closed = match instance {
            Ok(Some(config)) => config.close(),
            Ok(None) => Ok(()),
            Err(_) => Err(Error::backend("configuration instance is still in use")),
        };
        if outcome.is_ok() {
            outcome = closed;
        }
    }
    outcome
}
