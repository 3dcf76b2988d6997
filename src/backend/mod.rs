//! Storage backends
//!
//! Each backend implements [`ConfigStore`](crate::store::ConfigStore) for one
//! persisted form of the tree.

pub mod json;
pub mod memory;
pub mod registry;
pub mod xml;

pub use json::JsonStore;
pub use memory::{MemoryStore, StoreCall};
pub use registry::{Hive, NativeKind, NativeValue, RegistryStore};
pub use xml::XmlStore;
