/// Error code registry for sitecoord
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Coordination invariant violations
/// - 3000-3999: Transaction phase errors
/// - 4000-4999: Collaborator errors (shuffle worker, site wiring)
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_VALIDATION_FAILED: u16 = 1003;

    // Coordination invariant violations (2000-2999)
    pub const COORD_ALREADY_INITIALIZED: u16 = 2001;
    pub const COORD_NOT_INITIALIZED: u16 = 2002;
    pub const COORD_INVALID_TARGET: u16 = 2003;
    pub const COORD_DUPLICATE_PARTITION: u16 = 2004;
    pub const COORD_UNKNOWN_PARTITION: u16 = 2005;
    pub const COORD_COUNT_MISMATCH: u16 = 2006;
    pub const COORD_ALREADY_DELIVERED: u16 = 2007;
    pub const COORD_NOT_UNBLOCKED: u16 = 2008;

    // Transaction phase errors (3000-3999)
    pub const PHASE_INVALID_TRANSITION: u16 = 3001;
    pub const PHASE_TRANSACTION_DROPPED: u16 = 3002;

    // Collaborator errors (4000-4999)
    pub const SHUFFLE_WORKER_MISSING: u16 = 4001;
    pub const SHUFFLE_QUEUE_CLOSED: u16 = 4002;
}

/// Get a human-readable description of an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Failed to parse configuration",
        1003 => "Configuration validation failed",

        2001 => "Callback initialized twice without finishing",
        2002 => "Callback used before initialization",
        2003 => "Expected completion count must be positive",
        2004 => "Partition reported completion more than once",
        2005 => "Partition is not local to this site",
        2006 => "Reported partitions do not match the expected count",
        2007 => "Original response was already delivered",
        2008 => "Response requested before the callback unblocked",

        3001 => "Invalid transaction phase transition",
        3002 => "Transaction handle was dropped before the phase completed",

        4001 => "No shuffle worker registered with the site",
        4002 => "Shuffle queue is closed",

        _ => "Unknown error code",
    }
}
