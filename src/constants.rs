//! Wire-format constants
//!
//! Every literal that ends up in a persisted document or key store lives here,
//! so the backends and their tests agree on a single source of truth.

/// JSON document layout
pub mod json {
    /// Object holding the child nodes of a node
    pub const NODES: &str = "nodes";

    /// Object holding the values of a node
    pub const VALUES: &str = "values";

    /// File extension used by the process-wide accessor
    pub const EXTENSION: &str = "json";
}

/// XML document layout
pub mod xml {
    pub const VERSION: &str = "1.0";
    pub const ENCODING: &str = "UTF-8";
    pub const STANDALONE: &str = "yes";

    /// Document element
    pub const APPLICATION: &str = "application";

    /// Container for the root node's `<values>` and `<nodes>`
    pub const CONFIG: &str = "config";

    pub const NODES: &str = "nodes";
    pub const NODE: &str = "node";
    pub const VALUES: &str = "values";
    pub const VALUE: &str = "value";

    /// Attribute addressing a `<node>` or `<value>` inside its container
    pub const NAME_ATTR: &str = "name";

    /// Attribute carrying the symbolic type tag of a `<value>`
    pub const TYPE_ATTR: &str = "type";

    /// Spaces per indentation level
    pub const INDENT: usize = 2;

    /// File extension used by the process-wide accessor
    pub const EXTENSION: &str = "xml";
}

/// Hierarchical key store layout
pub mod registry {
    /// Separator between key names
    pub const KEY_SEPARATOR: char = '\\';

    /// Prefix of the per-application root key
    pub const SOFTWARE_PREFIX: &str = "Software";

    /// Directory (under the user config dir) holding the default hive file
    pub const HIVE_DIR: &str = "cfgtree";

    /// File name of the default user hive
    pub const HIVE_FILE: &str = "user.hive";
}

/// Fixed-point currency format
pub mod currency {
    /// Raw units per whole currency unit (four decimal places)
    pub const SCALE: i64 = 10_000;

    /// Number of decimal places kept
    pub const DECIMALS: usize = 4;
}

/// OLE automation dates (registry date encoding)
pub mod ole_date {
    /// Day zero of the OLE calendar: 1899-12-30
    pub const EPOCH: (i32, u32, u32) = (1899, 12, 30);

    pub const MILLIS_PER_DAY: f64 = 86_400_000.0;
}
