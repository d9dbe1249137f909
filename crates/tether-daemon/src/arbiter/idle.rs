//! Per-client activity tracking for idle demotion
//!
//! Time is injected through `*_at` parameters so the sweep logic can be
//! tested without sleeping; the daemon's sweep task supplies wall-clock time.

use dashmap::DashMap;

use tether_core::ClientId;

/// Tracks the last input activity of every registered client
#[derive(Debug, Default)]
pub struct IdleDetector {
    last_activity: DashMap<ClientId, u64>,
}

impl IdleDetector {
    /// Create an empty detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity for a client at the given time
    pub fn touch(&self, client_id: &ClientId, now: u64) {
        self.last_activity.insert(client_id.clone(), now);
    }

    /// Last recorded activity, if the client is registered
    pub fn last_activity(&self, client_id: &ClientId) -> Option<u64> {
        self.last_activity.get(client_id).map(|v| *v)
    }

    /// Whether the client has been quiet for at least `threshold_ms`.
    /// Unregistered clients are never idle.
    pub fn is_idle_at(&self, client_id: &ClientId, now: u64, threshold_ms: u64) -> bool {
        match self.last_activity(client_id) {
            Some(last) => now.saturating_sub(last) >= threshold_ms,
            None => false,
        }
    }

    /// Every registered client quiet for at least `threshold_ms`
    pub fn idle_clients_at(&self, now: u64, threshold_ms: u64) -> Vec<ClientId> {
        self.last_activity
            .iter()
            .filter(|e| now.saturating_sub(*e.value()) >= threshold_ms)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Forget a client entirely. Called on disconnect.
    pub fn unregister(&self, client_id: &ClientId) {
        self.last_activity.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_resets_idle_clock() {
        let detector = IdleDetector::new();
        let client = ClientId::from("c1");

        detector.touch(&client, 1_000);
        assert!(detector.is_idle_at(&client, 31_000, 30_000));

        detector.touch(&client, 31_000);
        assert!(!detector.is_idle_at(&client, 60_999, 30_000));
        assert!(detector.is_idle_at(&client, 61_000, 30_000));
    }

    #[test]
    fn test_unregistered_client_is_never_idle() {
        let detector = IdleDetector::new();
        assert!(!detector.is_idle_at(&ClientId::from("ghost"), u64::MAX, 0));
    }

    #[test]
    fn test_unregister_removes_from_sweep() {
        let detector = IdleDetector::new();
        let a = ClientId::from("a");
        let b = ClientId::from("b");
        detector.touch(&a, 0);
        detector.touch(&b, 0);

        detector.unregister(&a);
        let idle = detector.idle_clients_at(50_000, 30_000);
        assert_eq!(idle, vec![b]);
    }
}
