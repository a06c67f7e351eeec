//! Change counters
//!
//! A source owns a [`ChangeTracker`] and bumps it on every mutation; each
//! consumer keeps the [`AppliedVersion`] it last pushed to the native engine
//! and re-pushes when the two differ.

/// Monotonic mutation counter of a resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeTracker(u64);

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    pub fn changed(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.0
    }
}

/// The version of a tracked source that a consumer last pushed downstream.
///
/// Starts out stale so the first comparison always reports a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedVersion(Option<u64>);

impl AppliedVersion {
    #[inline]
    #[must_use]
    pub fn is_stale(&self, version: u64) -> bool {
        self.0 != Some(version)
    }

    #[inline]
    pub fn mark(&mut self, version: u64) {
        self.0 = Some(version);
    }

    /// Forces the next comparison to report a change.
    #[inline]
    pub fn invalidate(&mut self) {
        self.0 = None;
    }
}
