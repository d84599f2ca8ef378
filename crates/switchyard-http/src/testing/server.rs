//! Helpers for tests that run real listeners

use crate::foundation::ServerId;
use crate::server::ServerRegistry;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Wait until the server is bound and return an address a client can dial.
///
/// Wildcard binds are reported as loopback.
pub async fn wait_for_listener(registry: &ServerRegistry, id: ServerId) -> SocketAddr {
    let mut addr = registry
        .local_addr(id)
        .await
        .expect("server listener did not bind");
    if addr.ip().is_unspecified() {
        addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    addr
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
