// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of a mailbox inside one environment.
///
/// Ids are assigned from a monotonic per-environment counter, so they are
/// unique for the lifetime of the environment and cheap to copy and compare.
///
/// # Example
/// ```rust
/// use agentry::util::MailboxId;
///
/// let id = MailboxId::from_raw(42);
/// assert_eq!(id.raw(), 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxId(u64);

impl MailboxId {
    /// Build an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of an agent inside one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentId(u64);

impl AgentId {
    /// Build an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a coop inside one environment.
///
/// Assigned by the coop repository at registration time; strictly
/// monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoopId(u64);

impl CoopId {
    /// Build an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for CoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id generator shared by one environment.
///
/// The first issued value is 1; 0 is reserved so that a raw value of 0 can
/// serve as "not an id" in diagnostics.
#[derive(Debug)]
pub(crate) struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_id_roundtrip() {
        let id = MailboxId::from_raw(7);
        assert_eq!(id.raw(), 7);
        assert_eq!(format!("{id}"), "7");
    }

    #[test]
    fn test_agent_id_ordering() {
        assert!(AgentId::from_raw(1) < AgentId::from_raw(2));
    }

    #[test]
    fn test_coop_id_equality() {
        assert_eq!(CoopId::from_raw(3), CoopId::from_raw(3));
        assert_ne!(CoopId::from_raw(3), CoopId::from_raw(4));
    }

    #[test]
    fn test_generator_is_monotonic() {
        let generator = IdGenerator::new();
        let a = generator.next();
        let b = generator.next();
        let c = generator.next();
        assert_eq!(a, 1);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_generator_unique_across_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let generator = Arc::new(IdGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let generator = Arc::clone(&generator);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| generator.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
    }
}
