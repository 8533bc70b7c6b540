//! Permission gate for the commit path.
//!
//! The claim machinery itself lives with the auth collaborator; this
//! pipeline only ever consumes its boolean verdict. The cache keeps that
//! verdict per subject with an explicit timestamp and TTL so tests can
//! expire or bypass it deterministically - no module-level state, no
//! ambient clock.

use std::collections::BTreeMap;

use time::{Duration, OffsetDateTime};

/// An already-resolved permission check.
pub trait AccessGate {
    fn has_elevated_access(&self, subject: &str) -> bool;
}

/// Fixed verdict, for tests and for callers (like the CLI) that receive
/// the resolved boolean from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticGate {
    allowed: bool,
}

impl StaticGate {
    #[must_use]
    pub fn new(allowed: bool) -> Self {
        Self { allowed }
    }

    #[must_use]
    pub fn allow() -> Self {
        Self::new(true)
    }

    #[must_use]
    pub fn deny() -> Self {
        Self::new(false)
    }
}

impl AccessGate for StaticGate {
    fn has_elevated_access(&self, _subject: &str) -> bool {
        self.allowed
    }
}

/// One cached verdict, fully inspectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDecision {
    pub subject: String,
    pub allowed: bool,
    pub checked_at: OffsetDateTime,
}

/// TTL cache over any gate, keyed by subject.
///
/// Callers pass `now` explicitly; an entry older than the TTL is
/// re-resolved through the inner gate and replaced.
#[derive(Debug, Clone)]
pub struct CachedGate<G> {
    inner: G,
    ttl: Duration,
    entries: BTreeMap<String, CachedDecision>,
}

impl<G: AccessGate> CachedGate<G> {
    #[must_use]
    pub fn new(inner: G, ttl: Duration) -> Self {
        Self { inner, ttl, entries: BTreeMap::new() }
    }

    /// Resolve `subject`, consulting the cache first.
    pub fn check(&mut self, subject: &str, now: OffsetDateTime) -> bool {
        if let Some(entry) = self.entries.get(subject) {
            if now - entry.checked_at < self.ttl {
                return entry.allowed;
            }
        }

        let allowed = self.inner.has_elevated_access(subject);
        self.entries.insert(
            subject.to_string(),
            CachedDecision { subject: subject.to_string(), allowed, checked_at: now },
        );
        allowed
    }

    /// Drop one subject's cached verdict, e.g. after a role change.
    pub fn invalidate(&mut self, subject: &str) {
        self.entries.remove(subject);
    }

    /// Drop every entry older than the TTL.
    pub fn evict_expired(&mut self, now: OffsetDateTime) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.checked_at < ttl);
    }

    /// The cache contents, for inspection in tests and diagnostics.
    pub fn entries(&self) -> impl Iterator<Item = &CachedDecision> {
        self.entries.values()
    }
}
