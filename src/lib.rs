//! Hierarchical, typed configuration tree
//!
//! A [`Config`] owns a tree of [`ConfigNode`]s holding named, typed
//! [`Value`]s, and a [`ConfigStore`] that loads and flushes it. Three
//! persisted forms are provided: JSON documents ([`JsonStore`]), XML
//! documents ([`XmlStore`]) and a registry-style key store
//! ([`RegistryStore`]).
//!
//! ```no_run
//! use cfgtree::{Config, ConfigOptions, JsonStore};
//!
//! # fn main() -> cfgtree::Result<()> {
//! let mut config = Config::open(JsonStore::new("settings.json"), ConfigOptions::default())?;
//! let main = config.root().sub_node("Forms").sub_node("Main");
//! let width: i32 = main.get_item("Width", 640)?;
//! main.put_item("Width", width + 10)?;
//! config.close()
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod singleton;
pub mod store;
pub mod value;

pub use backend::{Hive, JsonStore, MemoryStore, RegistryStore, XmlStore};
pub use config::{Config, ConfigNode, ConfigOptions, EnumTable, LoadPolicy};
pub use error::{Error, Result};
pub use store::{ConfigPath, ConfigStore, Operation};
pub use value::{ByteArray, ConfigValue, Currency, Long, TypeTag, ULong, Value};
