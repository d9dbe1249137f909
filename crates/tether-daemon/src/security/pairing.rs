//! Short-lived pairing codes for first-contact device enrollment
//!
//! A pairing code is a 6-character human-typable stand-in for a session
//! token. The alphabet excludes glyphs that read ambiguously on a phone
//! screen (0/O, 1/I/L). Codes live for a few minutes, one active per
//! session, and are consumed on successful redemption.

use dashmap::DashMap;
use rand::Rng;

use tether_core::{PairingError, SessionId};

/// Characters a code can contain. No 0/O and no 1/I/L.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
/// Code length in characters
pub const CODE_LEN: usize = 6;

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Uppercase and strip all whitespace from user-typed input
fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone)]
struct CodeRecord {
    code: String,
    issued_at: u64,
}

/// Active pairing codes, at most one per session
pub struct PairingCodeManager {
    codes: DashMap<SessionId, CodeRecord>,
    /// Code lifetime in millis
    lifetime_ms: u64,
}

impl PairingCodeManager {
    /// Create a manager with the given code lifetime
    pub fn new(lifetime_ms: u64) -> Self {
        Self {
            codes: DashMap::new(),
            lifetime_ms,
        }
    }

    /// Issue a code for a session. Any prior code for the same session is
    /// revoked.
    pub fn issue_at(&self, session_id: &SessionId, now: u64) -> String {
        let code = generate_code();
        self.codes.insert(
            session_id.clone(),
            CodeRecord {
                code: code.clone(),
                issued_at: now,
            },
        );
        tracing::info!("Issued pairing code for session {}", session_id);
        code
    }

    /// Redeem a typed code for its session. Matching is case-insensitive
    /// and ignores whitespace; a successful redemption consumes the code.
    pub fn redeem_at(&self, input: &str, now: u64) -> Result<SessionId, PairingError> {
        let normalized = normalize(input);

        let found = self
            .codes
            .iter()
            .find(|e| e.code == normalized)
            .map(|e| (e.key().clone(), e.issued_at));
        let Some((session_id, issued_at)) = found else {
            return Err(PairingError::Invalid);
        };

        if now.saturating_sub(issued_at) >= self.lifetime_ms {
            self.codes.remove(&session_id);
            return Err(PairingError::Expired);
        }

        self.codes.remove(&session_id);
        tracing::info!("Pairing code redeemed for session {}", session_id);
        Ok(session_id)
    }

    /// Drop expired codes
    pub fn cleanup_at(&self, now: u64) {
        self.codes
            .retain(|_, record| now.saturating_sub(record.issued_at) < self.lifetime_ms);
    }

    /// Number of active codes
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether no code is active
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFETIME: u64 = 300_000;

    #[test]
    fn test_code_shape() {
        let mgr = PairingCodeManager::new(LIFETIME);
        let code = mgr.issue_at(&SessionId::from("s1"), 0);

        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        for forbidden in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!code.as_bytes().contains(&forbidden));
        }
    }

    #[test]
    fn test_redeem_is_case_and_whitespace_insensitive() {
        let mgr = PairingCodeManager::new(LIFETIME);
        let session = SessionId::from("s1");
        let code = mgr.issue_at(&session, 0);

        let sloppy = format!("  {} \n", code.to_lowercase());
        assert_eq!(mgr.redeem_at(&sloppy, 100), Ok(session));
    }

    #[test]
    fn test_redeem_consumes_the_code() {
        let mgr = PairingCodeManager::new(LIFETIME);
        let code = mgr.issue_at(&SessionId::from("s1"), 0);

        assert!(mgr.redeem_at(&code, 100).is_ok());
        assert_eq!(mgr.redeem_at(&code, 200), Err(PairingError::Invalid));
    }

    #[test]
    fn test_expired_code() {
        let mgr = PairingCodeManager::new(LIFETIME);
        let code = mgr.issue_at(&SessionId::from("s1"), 0);

        assert_eq!(mgr.redeem_at(&code, LIFETIME), Err(PairingError::Expired));
    }

    #[test]
    fn test_new_code_revokes_prior() {
        let mgr = PairingCodeManager::new(LIFETIME);
        let session = SessionId::from("s1");
        let first = mgr.issue_at(&session, 0);
        let second = mgr.issue_at(&session, 1_000);

        if first != second {
            assert_eq!(mgr.redeem_at(&first, 2_000), Err(PairingError::Invalid));
        }
        assert_eq!(mgr.redeem_at(&second, 2_000), Ok(session));
    }

    #[test]
    fn test_cleanup_drops_expired_only() {
        let mgr = PairingCodeManager::new(LIFETIME);
        mgr.issue_at(&SessionId::from("old"), 0);
        mgr.issue_at(&SessionId::from("new"), LIFETIME);

        mgr.cleanup_at(LIFETIME + 1);
        assert_eq!(mgr.len(), 1);
    }
}
