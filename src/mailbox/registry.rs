// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
use super::traits::MboxRef;
use crate::error::{Result, RuntimeError};

/// Namespace used by plain `create_named_mbox` calls.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The per-environment registry of named mailboxes.
///
/// `introduce` is idempotent: the first caller for a `(namespace, name)`
/// pair runs the factory and registers the result, every later caller gets
/// the same mailbox back and the factory never runs again. A factory error
/// propagates and leaves the pair unregistered.
pub struct NamedMboxRegistry {
    map: DashMap<(String, String), MboxRef>,
}

impl NamedMboxRegistry {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Look up or create the mailbox registered under `(namespace, name)`.
    pub fn introduce(
        &self,
        namespace: &str,
        name: &str,
        factory: impl FnOnce() -> Result<MboxRef>,
    ) -> Result<MboxRef> {
        if namespace.is_empty() || name.is_empty() {
            return Err(RuntimeError::EmptyName);
        }

        // The entry guard keeps the pair locked while the factory runs, so
        // concurrent callers cannot run it twice.
        match self.map.entry((namespace.to_string(), name.to_string())) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let mbox = factory()?;
                entry.insert(mbox.clone());
                Ok(mbox)
            }
        }
    }

    /// Look up an already-registered mailbox.
    pub fn find(&self, namespace: &str, name: &str) -> Result<MboxRef> {
        self.map
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::MailboxNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every registration. Called during environment teardown.
    pub(crate) fn clear(&self) {
        self.map.clear();
    }
}
