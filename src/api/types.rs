//! Shared types for the API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::Account;
use crate::state::AppState;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `AppState` plus the in-process stores.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<AppState>,
    pub sessions: Arc<Mutex<SessionStore>>,
    pub rate_limiter: Arc<Mutex<Box<dyn RateLimitStore>>>,
    pub lockout: Arc<Mutex<LoginLockout>>,
}

impl ApiContext {
    pub fn new(state: Arc<AppState>) -> Self {
        let config = &state.config;
        let sessions = SessionStore::new(Duration::from_secs(config.token_ttl_secs));
        let lockout = LoginLockout::new(
            config.login_max_failures,
            Duration::from_secs(config.login_lockout_secs),
        );
        Self {
            state,
            sessions: Arc::new(Mutex::new(sessions)),
            rate_limiter: Arc::new(Mutex::new(Box::new(FixedWindowStore::new()))),
            lockout: Arc::new(Mutex::new(lockout)),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Account context — injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions after the
/// bearer token resolves to a live account.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub account: Account,
}

// ═══════════════════════════════════════════════════════════
// Bearer tokens
// ═══════════════════════════════════════════════════════════

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

struct Session {
    account_id: Uuid,
    expires_at: Instant,
}

/// In-memory session store: token digest → account. Sessions die with
/// the process; clients re-authenticate on restart.
pub struct SessionStore {
    sessions: HashMap<[u8; 32], Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Issue a fresh token for an account and return the cleartext form.
    /// Only the digest is retained.
    pub fn issue(&mut self, account_id: Uuid) -> String {
        if self.sessions.len() > 10_000 {
            self.cleanup();
        }
        let token = generate_token();
        self.sessions.insert(
            hash_token(&token),
            Session {
                account_id,
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Resolve a presented token to an account id, if valid and unexpired.
    pub fn resolve(&mut self, token: &str) -> Option<Uuid> {
        let digest = hash_token(token);
        match self.sessions.get(&digest) {
            Some(session) if Instant::now() < session.expires_at => Some(session.account_id),
            Some(_) => {
                self.sessions.remove(&digest);
                None
            }
            None => None,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, s| now < s.expires_at);
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiting — bounded, time-bucketed, behind a store trait
// ═══════════════════════════════════════════════════════════

/// Requests-per-window quota for one action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: u32,
    pub window: Duration,
}

/// Counter store keyed by (identity, action). The in-memory
/// implementation suits a single instance; a shared-cache implementation
/// can replace it without touching middleware or controllers.
pub trait RateLimitStore: Send {
    /// `Ok(())` within quota, `Err(retry_after_secs)` when exceeded.
    fn check(
        &mut self,
        identity: &str,
        action: &str,
        quota: RateQuota,
        now: Instant,
    ) -> Result<(), u64>;
}

struct Bucket {
    window_start: Instant,
    window: Duration,
    count: u32,
}

/// Fixed-window counters, one bucket per (identity, action). Expired
/// buckets are pruned when the map grows, keeping memory bounded.
pub struct FixedWindowStore {
    buckets: HashMap<(String, String), Bucket>,
}

const BUCKET_CLEANUP_THRESHOLD: usize = 10_000;

impl FixedWindowStore {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    fn cleanup(&mut self, now: Instant) {
        self.buckets
            .retain(|_, b| now.duration_since(b.window_start) < b.window);
    }
}

impl Default for FixedWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitStore for FixedWindowStore {
    fn check(
        &mut self,
        identity: &str,
        action: &str,
        quota: RateQuota,
        now: Instant,
    ) -> Result<(), u64> {
        if self.buckets.len() > BUCKET_CLEANUP_THRESHOLD {
            self.cleanup(now);
        }

        let bucket = self
            .buckets
            .entry((identity.to_string(), action.to_string()))
            .or_insert(Bucket {
                window_start: now,
                window: quota.window,
                count: 0,
            });

        // Window elapsed: start a fresh one.
        if now.duration_since(bucket.window_start) >= quota.window {
            bucket.window_start = now;
            bucket.window = quota.window;
            bucket.count = 0;
        }

        if bucket.count >= quota.limit {
            let elapsed = now.duration_since(bucket.window_start);
            let remaining = quota.window.saturating_sub(elapsed);
            return Err(remaining.as_secs().max(1));
        }

        bucket.count += 1;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Login lockout
// ═══════════════════════════════════════════════════════════

struct LockEntry {
    failures: u32,
    locked_until: Option<Instant>,
}

/// Tracks failed logins per email and locks the credential after too
/// many in a row. Cleared on successful login.
pub struct LoginLockout {
    entries: HashMap<String, LockEntry>,
    max_failures: u32,
    lockout: Duration,
}

impl LoginLockout {
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_failures,
            lockout,
        }
    }

    /// `Ok(())` when the credential may attempt a login,
    /// `Err(retry_after_secs)` while locked.
    pub fn check(&mut self, email: &str, now: Instant) -> Result<(), u64> {
        if let Some(entry) = self.entries.get(email) {
            if let Some(until) = entry.locked_until {
                if now < until {
                    return Err(until.duration_since(now).as_secs().max(1));
                }
            }
        }
        Ok(())
    }

    /// Record a failed attempt; trips the lock at the threshold.
    pub fn record_failure(&mut self, email: &str, now: Instant) {
        // Bounded: under insertion pressure, keep only live locks.
        if self.entries.len() > 10_000 {
            self.entries
                .retain(|_, e| e.locked_until.map(|u| now < u).unwrap_or(false));
        }

        let entry = self.entries.entry(email.to_string()).or_insert(LockEntry {
            failures: 0,
            locked_until: None,
        });

        // A lapsed lock resets the count before this failure.
        if let Some(until) = entry.locked_until {
            if now >= until {
                entry.failures = 0;
                entry.locked_until = None;
            }
        }

        entry.failures += 1;
        if entry.failures >= self.max_failures {
            entry.locked_until = Some(now + self.lockout);
            tracing::warn!(email, failures = entry.failures, "Login lockout tripped");
        }
    }

    pub fn clear(&mut self, email: &str) {
        self.entries.remove(email);
    }
}
