//! Configuration tree
//!
//! - **node**: `ConfigNode`, values with their pending operations and child nodes
//! - **tree**: `Config`, the root node bound to a store, with load and flush
//! - **options**: construction-time flags
//! - **enums**: name tables for enum persistence

pub mod enums;
pub mod node;
pub mod options;
pub mod tree;

pub use enums::EnumTable;
pub use node::{ConfigNode, NodeList};
pub use options::{ConfigOptions, LoadPolicy};
pub use tree::Config;
