//! Construction-time options shared by every backend

/// When stored nodes are read into the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Read the whole tree when the config is opened.
    #[default]
    Eager,
    /// Read the root when opened; every other node the first time it is
    /// accessed.
    OnDemand,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOptions {
    /// Never write anything back.
    pub read_only: bool,
    /// Rewrite every node and every value on flush, modified or not.
    pub always_flush_node: bool,
    pub load_policy: LoadPolicy,
}

impl ConfigOptions {
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_always_flush_node(mut self, always: bool) -> Self {
        self.always_flush_node = always;
        self
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }
}
