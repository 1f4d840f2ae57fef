//! # System Constants
//!
//! Operation names understood by each action engine, plus the default
//! capacities and intervals used when no configuration is supplied.

/// Operations served by the current value table engine
pub mod cvt {
    pub const CREATE_TAG: &str = "create_tag";
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const ATTACH_OBSERVER: &str = "attach_observer";
    pub const DETACH_OBSERVER: &str = "detach_observer";
    pub const GET_TAG_BY_NAME: &str = "get_tag_by_name";
    pub const GET_TAGS: &str = "get_tags";

    pub const OPERATIONS: &[&str] = &[
        CREATE_TAG,
        READ,
        WRITE,
        ATTACH_OBSERVER,
        DETACH_OBSERVER,
        GET_TAG_BY_NAME,
        GET_TAGS,
    ];
}

/// Operations served by the machines logger engine
pub mod machines {
    pub const CREATE: &str = "create";
    pub const PUT: &str = "put";
    pub const READ_ALL: &str = "read_all";
    pub const READ_CONFIG: &str = "read_config";
    pub const BIND_TAG: &str = "bind_tag";
    pub const UNBIND_TAG: &str = "unbind_tag";
    pub const READ_BINDINGS: &str = "read_bindings";

    pub const OPERATIONS: &[&str] = &[
        CREATE,
        PUT,
        READ_ALL,
        READ_CONFIG,
        BIND_TAG,
        UNBIND_TAG,
        READ_BINDINGS,
    ];
}

/// Parameter keys shared by engine façades and handlers
pub mod params {
    pub const NAME: &str = "name";
    pub const VALUE: &str = "value";
    pub const DEFINITION: &str = "definition";
    pub const OBSERVER: &str = "observer";
    pub const TAG_NAME: &str = "tag_name";
    pub const MACHINE_NAME: &str = "machine_name";
    pub const DEFAULT_TAG_NAME: &str = "default_tag_name";
}

/// System-wide defaults
pub mod defaults {
    /// Delivery queue capacity for a tag observer before the oldest entry is evicted
    pub const OBSERVER_QUEUE_CAPACITY: usize = 1024;
    /// Inbox capacity per registered state machine
    pub const MACHINE_INBOX_CAPACITY: usize = 256;
    /// Interval used for state machines registered without an explicit one
    pub const MACHINE_INTERVAL_MS: u64 = 1000;
    /// Shortest interval accepted by the scheduler
    pub const MIN_MACHINE_INTERVAL_MS: u64 = 10;
    /// Idle wake-up period of the sync group when it has nothing scheduled
    pub const SYNC_IDLE_POLL_MS: u64 = 500;
    pub const DATABASE_URL: &str = "sqlite::memory:";
    pub const DATABASE_MAX_CONNECTIONS: u32 = 1;
}
