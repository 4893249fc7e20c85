//! In-memory resource manager.
//!
//! Each caller identity owns a decaying balance: charges add to it and it
//! shrinks by `1 / decay_window` per second, so a steady trickle of cheap
//! requests settles well below the thresholds while a burst of heavy ones
//! crosses them.
//!
//! Entries live in a concurrent map so lookups from many request tasks never
//! contend on a single lock. Idle entries are dropped by [`cleanup_task`].

use crate::domain::config::ResourceConfig;
use crate::domain::fees::Charge;
use crate::ports::outbound::{Consumer, Disposition, ResourceManager};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Inbound(IpAddr),
    Unlimited(String),
}

/// Balance that decays toward zero over `window`.
#[derive(Debug)]
struct DecayingBalance {
    value: f64,
    updated: Instant,
}

impl DecayingBalance {
    fn new(now: Instant) -> Self {
        Self {
            value: 0.0,
            updated: now,
        }
    }

    fn decay(&mut self, now: Instant, window: Duration) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        if elapsed > 0.0 {
            let window = window.as_secs_f64();
            self.value *= ((window - 1.0) / window).max(0.0).powf(elapsed);
            self.updated = now;
        }
    }
}

#[derive(Debug)]
struct Entry {
    label: String,
    unlimited: bool,
    balance: Mutex<DecayingBalance>,
    last_access: Mutex<Instant>,
}

impl Entry {
    fn new(label: String, unlimited: bool, now: Instant) -> Self {
        Self {
            label,
            unlimited,
            balance: Mutex::new(DecayingBalance::new(now)),
            last_access: Mutex::new(now),
        }
    }

    fn balance_at(&self, now: Instant, window: Duration) -> i64 {
        let mut balance = self.balance.lock();
        balance.decay(now, window);
        balance.value as i64
    }

    fn add_at(&self, cost: i32, now: Instant, window: Duration) -> i64 {
        *self.last_access.lock() = now;
        let mut balance = self.balance.lock();
        balance.decay(now, window);
        balance.value += f64::from(cost);
        balance.value as i64
    }
}

/// Consumer handed out by [`InMemoryResourceManager`].
pub struct InMemoryConsumer {
    entry: Arc<Entry>,
    config: Arc<ResourceConfig>,
}

impl InMemoryConsumer {
    /// Current decayed balance.
    pub fn balance(&self) -> i64 {
        self.entry
            .balance_at(Instant::now(), self.config.decay_window)
    }

    fn disposition(&self, balance: i64) -> Disposition {
        if self.entry.unlimited {
            Disposition::Ok
        } else if balance >= self.config.drop_threshold {
            Disposition::Drop
        } else if balance >= self.config.warning_threshold {
            Disposition::Warn
        } else {
            Disposition::Ok
        }
    }
}

impl Consumer for InMemoryConsumer {
    fn disconnect(&self) -> bool {
        self.disposition(self.balance()) == Disposition::Drop
    }

    fn charge(&self, fee: Charge) -> Disposition {
        let balance = self
            .entry
            .add_at(fee.cost(), Instant::now(), self.config.decay_window);
        let disposition = self.disposition(balance);
        if disposition == Disposition::Warn {
            info!(consumer = %self.entry.label, balance = balance, fee = %fee, "Load warning");
        }
        disposition
    }

    fn is_unlimited(&self) -> bool {
        self.entry.unlimited
    }

    fn label(&self) -> String {
        self.entry.label.clone()
    }
}

/// Resource manager keeping balances in process memory.
pub struct InMemoryResourceManager {
    entries: DashMap<Key, Arc<Entry>>,
    config: Arc<ResourceConfig>,
}

impl InMemoryResourceManager {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config: Arc::new(config),
        }
    }

    fn consumer(&self, key: Key, label: String, unlimited: bool) -> Arc<dyn Consumer> {
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| {
                debug!(consumer = %label, unlimited = unlimited, "New resource consumer");
                Arc::new(Entry::new(label, unlimited, Instant::now()))
            })
            .clone();
        Arc::new(InMemoryConsumer {
            entry,
            config: Arc::clone(&self.config),
        })
    }

    /// Forget entries idle for longer than the configured expiration that no
    /// consumer currently holds. Returns how many were removed.
    pub fn expire(&self) -> usize {
        self.expire_at(Instant::now())
    }

    fn expire_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let expiration = self.config.expiration;
        self.entries.retain(|_, entry| {
            Arc::strong_count(entry) > 1
                || now.saturating_duration_since(*entry.last_access.lock()) < expiration
        });
        before.saturating_sub(self.entries.len())
    }

    /// Tracked caller identities.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl ResourceManager for InMemoryResourceManager {
    fn new_inbound_endpoint(&self, address: IpAddr) -> Arc<dyn Consumer> {
        self.consumer(Key::Inbound(address), address.to_string(), false)
    }

    fn new_unlimited_endpoint(&self, label: &str) -> Arc<dyn Consumer> {
        self.consumer(Key::Unlimited(label.to_string()), label.to_string(), true)
    }
}

/// Background task that expires idle entries.
pub async fn cleanup_task(manager: Arc<InMemoryResourceManager>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = manager.expire();
        if removed > 0 {
            debug!(removed = removed, "Expired idle resource consumers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::{FEE_HIGH_BURDEN_RPC, FEE_REFERENCE_RPC};

    fn manager() -> InMemoryResourceManager {
        InMemoryResourceManager::new(ResourceConfig::default())
    }

    fn ip() -> IpAddr {
        "203.0.113.5".parse().unwrap()
    }

    #[test]
    fn test_same_address_shares_balance() {
        let manager = manager();
        manager.new_inbound_endpoint(ip()).charge(FEE_REFERENCE_RPC);
        manager.new_inbound_endpoint(ip()).charge(FEE_REFERENCE_RPC);
        assert_eq!(manager.entry_count(), 1);

        let consumer = manager.new_inbound_endpoint(ip());
        assert_eq!(consumer.label(), "203.0.113.5");
    }

    #[test]
    fn test_heavy_load_crosses_thresholds() {
        let manager = manager();
        let consumer = manager.new_inbound_endpoint(ip());
        assert!(!consumer.disconnect());
        assert_eq!(consumer.charge(FEE_HIGH_BURDEN_RPC), Disposition::Ok);
        assert_eq!(consumer.charge(FEE_HIGH_BURDEN_RPC), Disposition::Warn);
        for _ in 0..4 {
            consumer.charge(FEE_HIGH_BURDEN_RPC);
        }
        assert!(consumer.disconnect());
    }

    #[test]
    fn test_unlimited_never_disconnects() {
        let manager = manager();
        let consumer = manager.new_unlimited_endpoint("127.0.0.1:0");
        for _ in 0..20 {
            assert_eq!(consumer.charge(FEE_HIGH_BURDEN_RPC), Disposition::Ok);
        }
        assert!(!consumer.disconnect());
        assert!(consumer.is_unlimited());
    }

    #[test]
    fn test_balance_decays() {
        let now = Instant::now();
        let window = Duration::from_secs(32);
        let entry = Entry::new("x".into(), false, now);
        entry.add_at(3200, now, window);
        let later = entry.balance_at(now + Duration::from_secs(32), window);
        assert!(later < 3200 && later > 1000, "balance {later}");
        let much_later = entry.balance_at(now + Duration::from_secs(600), window);
        assert!(much_later < 10, "balance {much_later}");
    }

    #[test]
    fn test_expire_removes_only_idle_unheld_entries() {
        let manager = manager();
        let held = manager.new_inbound_endpoint("203.0.113.6".parse().unwrap());
        manager.new_inbound_endpoint(ip());

        let future = Instant::now() + Duration::from_secs(301);
        assert_eq!(manager.expire_at(future), 1);
        assert_eq!(manager.entry_count(), 1);

        drop(held);
        assert_eq!(manager.expire_at(future), 1);
        assert_eq!(manager.entry_count(), 0);
    }

    #[test]
    fn test_recent_entries_survive_expire() {
        let manager = manager();
        manager.new_inbound_endpoint(ip());
        assert_eq!(manager.expire(), 0);
        assert_eq!(manager.entry_count(), 1);
    }
}
