//! Session token issuance, rotation, and validation
//!
//! Tokens are 32 random bytes, hex encoded, bound to a session id. A session
//! holds at most one current and one previous token; rotation keeps the
//! outgoing token valid for a short grace window so in-flight clients can
//! finish their handshake against either.

use dashmap::DashMap;
use rand::RngCore;

use tether_core::{SessionId, TokenError};

/// Byte-wise comparison that does not short-circuit on the first mismatch
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
struct TokenRecord {
    token: String,
    /// Issue time for current tokens, rotation time for previous ones
    since: u64,
}

#[derive(Debug, Clone)]
struct SessionTokens {
    current: TokenRecord,
    previous: Option<TokenRecord>,
}

/// Token registry for every authenticated session
pub struct TokenManager {
    sessions: DashMap<SessionId, SessionTokens>,
    /// How long a current token stays valid (millis)
    lifetime_ms: u64,
    /// How long a rotated-out token stays valid (millis)
    grace_ms: u64,
}

impl TokenManager {
    /// Create a manager with the given token lifetime and rotation grace
    pub fn new(lifetime_ms: u64, grace_ms: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            lifetime_ms,
            grace_ms,
        }
    }

    /// Issue a fresh token for a session, replacing any existing tokens
    pub fn issue_at(&self, session_id: &SessionId, now: u64) -> String {
        let token = generate_token();
        self.sessions.insert(
            session_id.clone(),
            SessionTokens {
                current: TokenRecord {
                    token: token.clone(),
                    since: now,
                },
                previous: None,
            },
        );
        tracing::info!("Issued token for session {}", session_id);
        token
    }

    /// Rotate a session's token. The outgoing token stays valid for the
    /// grace window; any older previous token is dropped. Returns `None`
    /// for unknown sessions.
    pub fn rotate_at(&self, session_id: &SessionId, now: u64) -> Option<String> {
        let mut entry = self.sessions.get_mut(session_id)?;
        let token = generate_token();
        let outgoing = TokenRecord {
            token: entry.current.token.clone(),
            since: now,
        };
        entry.current = TokenRecord {
            token: token.clone(),
            since: now,
        };
        entry.previous = Some(outgoing);
        tracing::info!("Rotated token for session {}", session_id);
        Some(token)
    }

    /// Resolve a presented token to its session.
    ///
    /// A current token past its lifetime, or a previous token past its
    /// grace window, yields `Expired`; an unknown token yields `Invalid`.
    pub fn validate_at(&self, presented: &str, now: u64) -> Result<SessionId, TokenError> {
        for entry in self.sessions.iter() {
            if constant_time_eq(&entry.current.token, presented) {
                if now.saturating_sub(entry.current.since) >= self.lifetime_ms {
                    return Err(TokenError::Expired);
                }
                return Ok(entry.key().clone());
            }
            if let Some(previous) = &entry.previous {
                if constant_time_eq(&previous.token, presented) {
                    if now.saturating_sub(previous.since) >= self.grace_ms {
                        return Err(TokenError::Expired);
                    }
                    return Ok(entry.key().clone());
                }
            }
        }
        Err(TokenError::Invalid)
    }

    /// Drop a session's tokens entirely
    pub fn revoke(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    /// Sweep out previous tokens past their grace window and sessions whose
    /// current token has expired
    pub fn cleanup_at(&self, now: u64) {
        self.sessions.retain(|_, tokens| {
            if tokens
                .previous
                .as_ref()
                .is_some_and(|p| now.saturating_sub(p.since) >= self.grace_ms)
            {
                tokens.previous = None;
            }
            now.saturating_sub(tokens.current.since) < self.lifetime_ms
        });
    }

    /// Number of sessions with live tokens
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session holds a token
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
