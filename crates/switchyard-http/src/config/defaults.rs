//! Default configuration values

use crate::foundation::constants::*;

pub struct ServerDefaults;

impl ServerDefaults {
    pub const REQUEST_TIMEOUT_SECS: u64 = DEFAULT_REQUEST_TIMEOUT_SECS as u64;
    pub const MAX_HEADER_BYTES: usize = DEFAULT_MAX_HEADER_BYTES;
    pub const MAX_BODY_SIZE: usize = DEFAULT_MAX_BODY_SIZE;
    pub const SHUTDOWN_TIMEOUT_SECS: u64 = DEFAULT_SHUTDOWN_TIMEOUT_SECS as u64;
    pub const MAX_CALLBACK_HEADERS: usize = DEFAULT_MAX_CALLBACK_HEADERS;
}
