//! Writer contender queue
//!
//! Clients waiting for the writer role on an agent. Selection order is
//! deterministic: higher priority class first, then earlier enqueue time,
//! then lexicographic client id as the tiebreak.

use tether_core::ClientId;

/// A client waiting for the writer grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contender {
    /// Waiting client
    pub client_id: ClientId,
    /// Priority class (higher wins)
    pub class: u8,
    /// When the client joined the queue (unix millis)
    pub enqueued_at: u64,
}

impl Contender {
    /// Whether this contender is selected before `other`
    fn outranks(&self, other: &Contender) -> bool {
        (
            std::cmp::Reverse(self.class),
            self.enqueued_at,
            &self.client_id,
        ) < (
            std::cmp::Reverse(other.class),
            other.enqueued_at,
            &other.client_id,
        )
    }
}

/// Errors from [`ContenderQueue::push`]
#[derive(Debug, PartialEq, Eq)]
pub enum PushError {
    /// The queue already holds `max_len` contenders
    Full,
}

/// Bounded queue of writer contenders for one agent
#[derive(Debug)]
pub struct ContenderQueue {
    entries: Vec<Contender>,
    max_len: usize,
}

impl ContenderQueue {
    /// Create an empty queue bounded at `max_len` contenders
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_len,
        }
    }

    /// Add a contender. Re-queueing an already-queued client is a no-op
    /// (the original enqueue time is kept).
    pub fn push(&mut self, contender: Contender) -> Result<(), PushError> {
        if self.entries.iter().any(|c| c.client_id == contender.client_id) {
            return Ok(());
        }
        if self.entries.len() >= self.max_len {
            return Err(PushError::Full);
        }
        self.entries.push(contender);
        Ok(())
    }

    /// Remove a client from the queue, if queued
    pub fn remove(&mut self, client_id: &ClientId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|c| &c.client_id != client_id);
        self.entries.len() != before
    }

    /// Remove and return the highest-ranked contender
    pub fn pop_best(&mut self) -> Option<Contender> {
        let best = self
            .entries
            .iter()
            .enumerate()
            .reduce(|a, b| if b.1.outranks(a.1) { b } else { a })?
            .0;
        Some(self.entries.swap_remove(best))
    }

    /// Peek the highest-ranked contender without removing it
    pub fn peek_best(&self) -> Option<&Contender> {
        self.entries
            .iter()
            .reduce(|a, b| if b.outranks(a) { b } else { a })
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queued contenders
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contender(id: &str, class: u8, at: u64) -> Contender {
        Contender {
            client_id: ClientId::from(id),
            class,
            enqueued_at: at,
        }
    }

    #[test]
    fn test_higher_class_pops_first() {
        let mut q = ContenderQueue::new(8);
        q.push(contender("pc", 0, 100)).unwrap();
        q.push(contender("mobile", 1, 200)).unwrap();

        assert_eq!(q.pop_best().unwrap().client_id, ClientId::from("mobile"));
        assert_eq!(q.pop_best().unwrap().client_id, ClientId::from("pc"));
    }

    #[test]
    fn test_same_class_is_fifo() {
        let mut q = ContenderQueue::new(8);
        q.push(contender("late", 0, 300)).unwrap();
        q.push(contender("early", 0, 100)).unwrap();

        assert_eq!(q.pop_best().unwrap().client_id, ClientId::from("early"));
    }

    #[test]
    fn test_client_id_breaks_full_ties() {
        let mut q = ContenderQueue::new(8);
        q.push(contender("bbb", 0, 100)).unwrap();
        q.push(contender("aaa", 0, 100)).unwrap();

        assert_eq!(q.pop_best().unwrap().client_id, ClientId::from("aaa"));
    }

    #[test]
    fn test_capacity_enforced() {
        let mut q = ContenderQueue::new(2);
        q.push(contender("a", 0, 1)).unwrap();
        q.push(contender("b", 0, 2)).unwrap();
        assert_eq!(q.push(contender("c", 0, 3)), Err(PushError::Full));
    }

    #[test]
    fn test_requeue_is_idempotent() {
        let mut q = ContenderQueue::new(2);
        q.push(contender("a", 0, 1)).unwrap();
        q.push(contender("a", 0, 9)).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_best().unwrap().enqueued_at, 1);
    }

    #[test]
    fn test_remove() {
        let mut q = ContenderQueue::new(8);
        q.push(contender("a", 0, 1)).unwrap();
        assert!(q.remove(&ClientId::from("a")));
        assert!(!q.remove(&ClientId::from("a")));
        assert!(q.is_empty());
    }
}
