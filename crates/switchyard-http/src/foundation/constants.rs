pub const DEFAULT_REQUEST_TIMEOUT_SECS: u32 = 10;
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1 << 20; // 1MB
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024; // 16MB
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u32 = 5;

/// Upper bound on the header entries handed to the engine per request
pub const DEFAULT_MAX_CALLBACK_HEADERS: usize = 50;
/// Joins the values of a repeated header in the engine's header snapshot
pub const HEADER_VALUE_SEPARATOR: &str = "|";

pub const ROOT_PATH: &str = "/";
pub const NOT_FOUND_BODY: &str = "404 page not found\n";
pub const INTERNAL_ERROR_PREFIX: &str = "Internal Server Error: ";

/// Close code sent to every client when its server is stopped
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when a listener dies underneath its clients
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Frames a client may have queued but not yet written
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;
/// How long a stopping server waits for a client to take its close frame
/// before the connection is torn down
pub const CLOSE_WRITE_GRACE_MS: u64 = 250;
