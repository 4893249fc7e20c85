//! Per-port live connection tracking.
//!
//! Every accept and close on every I/O thread goes through one mutex over the
//! counter map, so counts are exact under concurrent traffic.

use crate::domain::port::Port;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{trace, warn};

/// Live connection counter with a per-port hard limit.
#[derive(Debug, Default)]
pub struct ConnectionLimiter {
    counts: Mutex<HashMap<String, usize>>,
}

impl ConnectionLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection. Returns `false` if the port is full; the
    /// connection must then be dropped and is not counted.
    pub fn on_accept(&self, port: &Port, remote: SocketAddr) -> bool {
        let mut counts = self.counts.lock();
        let count = counts.entry(port.name.clone()).or_insert(0);
        *count += 1;

        if port.limit != 0 && *count > port.limit {
            *count -= 1;
            trace!(
                port = %port.name,
                remote = %remote,
                limit = port.limit,
                "Port is full; dropping connection"
            );
            return false;
        }

        true
    }

    /// Forget a connection previously accepted on `port`.
    pub fn on_close(&self, port: &Port) {
        let mut counts = self.counts.lock();
        match counts.get_mut(&port.name) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    counts.remove(&port.name);
                }
            }
            _ => warn!(port = %port.name, "Close without matching accept"),
        }
    }

    /// Live connections on the named port.
    pub fn count(&self, port_name: &str) -> usize {
        self.counts.lock().get(port_name).copied().unwrap_or(0)
    }

    /// Live connections across all ports.
    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::port::Protocol;
    use proptest::prelude::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn port(name: &str, limit: usize) -> Port {
        let mut port = Port::new(name, IpAddr::V4(Ipv4Addr::LOCALHOST), 5005, [Protocol::Http]);
        port.limit = limit;
        port
    }

    fn remote() -> SocketAddr {
        "192.0.2.10:1234".parse().unwrap()
    }

    #[test]
    fn test_limit_admits_exactly_limit_connections() {
        let limiter = ConnectionLimiter::new();
        let port = port("rpc", 3);
        for _ in 0..3 {
            assert!(limiter.on_accept(&port, remote()));
        }
        assert!(!limiter.on_accept(&port, remote()));
        assert!(!limiter.on_accept(&port, remote()));
        assert_eq!(limiter.count("rpc"), 3);
    }

    #[test]
    fn test_close_frees_a_slot() {
        let limiter = ConnectionLimiter::new();
        let port = port("rpc", 1);
        assert!(limiter.on_accept(&port, remote()));
        assert!(!limiter.on_accept(&port, remote()));
        limiter.on_close(&port);
        assert!(limiter.on_accept(&port, remote()));
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let limiter = ConnectionLimiter::new();
        let port = port("rpc", 0);
        for _ in 0..1000 {
            assert!(limiter.on_accept(&port, remote()));
        }
        assert_eq!(limiter.count("rpc"), 1000);
    }

    #[test]
    fn test_ports_counted_independently() {
        let limiter = ConnectionLimiter::new();
        let a = port("a", 1);
        let b = port("b", 1);
        assert!(limiter.on_accept(&a, remote()));
        assert!(limiter.on_accept(&b, remote()));
        assert_eq!(limiter.total(), 2);
    }

    #[test]
    fn test_unmatched_close_never_goes_negative() {
        let limiter = ConnectionLimiter::new();
        let port = port("rpc", 2);
        limiter.on_close(&port);
        assert_eq!(limiter.count("rpc"), 0);
        assert!(limiter.on_accept(&port, remote()));
        assert!(limiter.on_accept(&port, remote()));
        assert!(!limiter.on_accept(&port, remote()));
    }

    #[test]
    fn test_concurrent_accept_close_is_exact() {
        let limiter = Arc::new(ConnectionLimiter::new());
        let port = Arc::new(port("rpc", 0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let port = Arc::clone(&port);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(limiter.on_accept(&port, remote()));
                        limiter.on_close(&port);
                    }
                    for _ in 0..10 {
                        limiter.on_accept(&port, remote());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(limiter.count("rpc"), 80);
    }

    proptest! {
        #[test]
        fn prop_counter_tracks_live_connections(
            limit in 0usize..8,
            ops in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let limiter = ConnectionLimiter::new();
            let port = port("rpc", limit);
            let mut live = 0usize;

            for accept in ops {
                if accept {
                    let admitted = limiter.on_accept(&port, remote());
                    let expected = limit == 0 || live < limit;
                    prop_assert_eq!(admitted, expected);
                    if admitted {
                        live += 1;
                    }
                } else if live > 0 {
                    limiter.on_close(&port);
                    live -= 1;
                }
                prop_assert_eq!(limiter.count("rpc"), live);
            }
        }
    }
}
