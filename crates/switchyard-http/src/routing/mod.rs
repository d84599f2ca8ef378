//! Per-instance path router
//!
//! Maps exact path strings to handlers, WebSocket endpoints and static mounts.

pub mod router;

pub use router::{normalize_path, PathRegistration, PathRouter, ResolvedRoute, RouteKind};
