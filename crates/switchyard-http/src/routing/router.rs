use crate::engine::{CallbackHandle, EngineHandle};
use crate::errors::{HubError, HubResult};
use crate::foundation::{ClientId, ROOT_PATH};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// What a registered path dispatches to
#[derive(Debug, Clone, PartialEq)]
pub enum PathRegistration {
    /// Plain request/response route; `None` once the owning interpreter is gone
    Handler { callback: Option<CallbackHandle> },
    /// Upgrade-capable route with the clients currently attached to it
    WebSocket {
        callback: Option<CallbackHandle>,
        clients: HashSet<ClientId>,
    },
    /// Files under `directory`, with the registered path stripped as a prefix
    StaticMount { directory: PathBuf },
}

impl PathRegistration {
    pub fn kind(&self) -> RouteKind {
        match self {
            PathRegistration::Handler { .. } => RouteKind::Handler,
            PathRegistration::WebSocket { .. } => RouteKind::WebSocket,
            PathRegistration::StaticMount { .. } => RouteKind::StaticMount,
        }
    }

    /// Live callback handle, if this registration has one
    pub fn callback(&self) -> Option<CallbackHandle> {
        match self {
            PathRegistration::Handler { callback } | PathRegistration::WebSocket { callback, .. } => *callback,
            PathRegistration::StaticMount { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Handler,
    WebSocket,
    StaticMount,
}

/// Route chosen for one request path, detached from the router
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRoute {
    Handler {
        path: String,
        callback: Option<CallbackHandle>,
    },
    WebSocket {
        path: String,
        callback: Option<CallbackHandle>,
    },
    Static {
        mount: String,
        directory: PathBuf,
        /// Request path with the mount stripped, always starting with `/`
        remainder: String,
    },
}

/// Empty path strings address the root; nothing else is rewritten
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        ROOT_PATH.to_string()
    } else {
        path.to_string()
    }
}

/// Path table of one server instance
#[derive(Debug, Default)]
pub struct PathRouter {
    paths: HashMap<String, PathRegistration>,
}

impl PathRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-insert; an existing path is never overwritten
    fn insert(&mut self, path: &str, registration: PathRegistration) -> HubResult<String> {
        let path = normalize_path(path);
        if self.paths.contains_key(&path) {
            return Err(HubError::path_registered(path));
        }
        debug!(%path, kind = ?registration.kind(), "Path registered");
        self.paths.insert(path.clone(), registration);
        Ok(path)
    }

    pub fn register_handler(&mut self, path: &str, callback: CallbackHandle) -> HubResult<String> {
        self.insert(path, PathRegistration::Handler { callback: Some(callback) })
    }

    pub fn register_websocket(&mut self, path: &str, callback: CallbackHandle) -> HubResult<String> {
        self.insert(
            path,
            PathRegistration::WebSocket {
                callback: Some(callback),
                clients: HashSet::new(),
            },
        )
    }

    pub fn register_static(&mut self, path: &str, directory: impl Into<PathBuf>) -> HubResult<String> {
        self.insert(
            path,
            PathRegistration::StaticMount {
                directory: directory.into(),
            },
        )
    }

    pub fn get(&self, path: &str) -> Option<&PathRegistration> {
        self.paths.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Find the route for a request path.
    ///
    /// Exact registrations win. Otherwise the longest static mount that is a
    /// path-segment prefix of `request_path` is chosen.
    pub fn resolve(&self, request_path: &str) -> Option<ResolvedRoute> {
        if let Some(registration) = self.paths.get(request_path) {
            let path = request_path.to_string();
            return Some(match registration {
                PathRegistration::Handler { callback } => ResolvedRoute::Handler {
                    path,
                    callback: *callback,
                },
                PathRegistration::WebSocket { callback, .. } => ResolvedRoute::WebSocket {
                    path,
                    callback: *callback,
                },
                PathRegistration::StaticMount { directory } => ResolvedRoute::Static {
                    mount: path,
                    directory: directory.clone(),
                    remainder: ROOT_PATH.to_string(),
                },
            });
        }

        self.paths
            .iter()
            .filter_map(|(mount, registration)| match registration {
                PathRegistration::StaticMount { directory } => {
                    strip_mount(mount, request_path).map(|rest| (mount, directory, rest))
                }
                _ => None,
            })
            .max_by_key(|(mount, _, _)| mount.len())
            .map(|(mount, directory, rest)| ResolvedRoute::Static {
                mount: mount.clone(),
                directory: directory.clone(),
                remainder: rest,
            })
    }

    /// Attach a client to a WebSocket path; false when the path is not one
    pub fn attach_client(&mut self, path: &str, client_id: ClientId) -> bool {
        match self.paths.get_mut(path) {
            Some(PathRegistration::WebSocket { clients, .. }) => clients.insert(client_id),
            _ => false,
        }
    }

    pub fn detach_client(&mut self, path: &str, client_id: &ClientId) -> bool {
        match self.paths.get_mut(path) {
            Some(PathRegistration::WebSocket { clients, .. }) => clients.remove(client_id),
            _ => false,
        }
    }

    /// Clients attached to a WebSocket path; `None` if the path is not a WebSocket route
    pub fn clients_at(&self, path: &str) -> Option<&HashSet<ClientId>> {
        match self.paths.get(path) {
            Some(PathRegistration::WebSocket { clients, .. }) => Some(clients),
            _ => None,
        }
    }

    /// Clear every callback owned by `engine`, keeping the path entries.
    ///
    /// Returns how many registrations became inert.
    pub fn invalidate(&mut self, engine: EngineHandle) -> usize {
        let mut cleared = 0;
        for registration in self.paths.values_mut() {
            let slot = match registration {
                PathRegistration::Handler { callback } | PathRegistration::WebSocket { callback, .. } => callback,
                PathRegistration::StaticMount { .. } => continue,
            };
            if slot.map_or(false, |handle| handle.belongs_to(engine)) {
                *slot = None;
                cleared += 1;
            }
        }
        cleared
    }
}

fn strip_mount(mount: &str, request_path: &str) -> Option<String> {
    let rest = request_path.strip_prefix(mount)?;
    if mount.ends_with('/') || rest.is_empty() || rest.starts_with('/') {
        if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            Some(format!("/{}", rest))
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CallbackRef;

    fn handle(engine: u64, callback: i64) -> CallbackHandle {
        CallbackHandle::new(EngineHandle(engine), CallbackRef(callback))
    }

    #[test]
    fn test_path_registered_once_across_variants() {
        let mut router = PathRouter::new();
        router.register_handler("/dup", handle(1, 1)).unwrap();

        assert!(matches!(
            router.register_handler("/dup", handle(1, 2)),
            Err(HubError::PathAlreadyRegistered { .. })
        ));
        assert!(matches!(
            router.register_websocket("/dup", handle(1, 3)),
            Err(HubError::PathAlreadyRegistered { .. })
        ));
        assert!(matches!(
            router.register_static("/dup", "/tmp"),
            Err(HubError::PathAlreadyRegistered { .. })
        ));
        // the first registration is untouched
        assert_eq!(router.get("/dup").and_then(|r| r.callback()), Some(handle(1, 1)));
    }

    #[test]
    fn test_empty_path_normalizes_to_root() {
        let mut router = PathRouter::new();
        assert_eq!(router.register_handler("", handle(1, 1)).unwrap(), "/");
        assert!(router.register_handler("/", handle(1, 2)).is_err());
        // no other normalization
        router.register_handler("/a/", handle(1, 3)).unwrap();
        router.register_handler("/a", handle(1, 4)).unwrap();
        router.register_handler("/A", handle(1, 5)).unwrap();
        assert_eq!(router.len(), 4);
    }

    #[test]
    fn test_invalidate_keeps_entries() {
        let mut router = PathRouter::new();
        router.register_handler("/one", handle(1, 1)).unwrap();
        router.register_websocket("/ws", handle(1, 2)).unwrap();
        router.register_handler("/other", handle(2, 1)).unwrap();

        assert_eq!(router.invalidate(EngineHandle(1)), 2);
        assert_eq!(router.get("/one").and_then(|r| r.callback()), None);
        assert_eq!(router.get("/ws").and_then(|r| r.callback()), None);
        assert_eq!(router.get("/other").and_then(|r| r.callback()), Some(handle(2, 1)));

        assert!(router.register_handler("/one", handle(3, 1)).is_err());
    }

    #[test]
    fn test_exact_match_and_static_prefix() {
        let mut router = PathRouter::new();
        router.register_static("/static", "/srv/a").unwrap();
        router.register_static("/static/img", "/srv/b").unwrap();
        router.register_handler("/static/special", handle(1, 1)).unwrap();

        assert!(matches!(
            router.resolve("/static/special"),
            Some(ResolvedRoute::Handler { .. })
        ));
        match router.resolve("/static/img/logo.png") {
            Some(ResolvedRoute::Static { directory, remainder, .. }) => {
                assert_eq!(directory, PathBuf::from("/srv/b"));
                assert_eq!(remainder, "/logo.png");
            }
            other => panic!("unexpected route {:?}", other),
        }
        match router.resolve("/static/index.html") {
            Some(ResolvedRoute::Static { mount, remainder, .. }) => {
                assert_eq!(mount, "/static");
                assert_eq!(remainder, "/index.html");
            }
            other => panic!("unexpected route {:?}", other),
        }
        assert!(router.resolve("/staticfile").is_none());
        assert!(router.resolve("/missing").is_none());
    }

    #[test]
    fn test_handler_paths_do_not_prefix_match() {
        let mut router = PathRouter::new();
        router.register_handler("/hello", handle(1, 1)).unwrap();
        assert!(router.resolve("/hello/world").is_none());
    }

    #[test]
    fn test_root_mount_serves_everything_unmatched() {
        let mut router = PathRouter::new();
        router.register_static("/", "/srv/root").unwrap();
        match router.resolve("/css/site.css") {
            Some(ResolvedRoute::Static { remainder, .. }) => assert_eq!(remainder, "/css/site.css"),
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn test_websocket_client_set() {
        let mut router = PathRouter::new();
        router.register_websocket("/ws", handle(1, 1)).unwrap();
        router.register_handler("/plain", handle(1, 2)).unwrap();
        let client = ClientId::new();

        assert!(router.attach_client("/ws", client));
        assert!(!router.attach_client("/plain", client));
        assert_eq!(router.clients_at("/ws").map(HashSet::len), Some(1));
        assert!(router.detach_client("/ws", &client));
        assert_eq!(router.clients_at("/ws").map(HashSet::len), Some(0));
        assert!(router.clients_at("/plain").is_none());
    }
}
