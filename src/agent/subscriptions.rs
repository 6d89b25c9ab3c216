//! Per-agent subscription storage.
//!
//! Storage is adaptive by size: a plain vector with linear search up to a
//! threshold, then a hash map. Agents rarely hold more than a handful of
//! subscriptions, and for those the vector wins on every metric; the map
//! keeps lookup O(1) amortized for the outliers.

// Layer 1: Standard library imports
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

// Layer 3: Internal module imports
use super::context::AgentContext;
use super::state::StateId;
use super::traits::AgentResult;
use crate::mailbox::{Mailbox, MboxRef};
use crate::message::{MessageRef, TypeKey};
use crate::util::MailboxId;

/// Default point at which the vector layout switches to the map layout.
pub(crate) const DEFAULT_STORAGE_THRESHOLD: usize = 8;

/// Type-erased handler invoked with exclusive access to the agent.
pub(crate) type ExclusiveHandlerFn =
    dyn Fn(&mut dyn Any, &mut AgentContext<'_>, &MessageRef) -> AgentResult + Send + Sync;

/// Type-erased handler invoked with shared access to the agent.
///
/// Thread-safe handlers get no context: subscription and state mutation
/// are not available to them, by construction.
pub(crate) type SharedHandlerFn = dyn Fn(&dyn Any, &MessageRef) -> AgentResult + Send + Sync;

/// What a subscription entry does when a matching message arrives.
#[derive(Clone)]
pub(crate) enum HandlerAction {
    /// Final handler, exclusive access.
    Exclusive(Arc<ExclusiveHandlerFn>),
    /// Final handler, shared access (thread-safe).
    Shared(Arc<SharedHandlerFn>),
    /// Intermediate: switch state and re-dispatch the same message.
    Transfer(StateId),
    /// Intermediate: switch state, do not re-dispatch.
    JustSwitch(StateId),
    /// Intermediate: consume the message silently.
    Suppress,
}

impl HandlerAction {
    pub(crate) fn is_shared(&self) -> bool {
        matches!(self, HandlerAction::Shared(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionKey {
    pub(crate) mbox: MailboxId,
    pub(crate) type_key: TypeKey,
    pub(crate) state: StateId,
}

pub(crate) struct SubscriptionEntry {
    pub(crate) mbox_ref: MboxRef,
    pub(crate) action: HandlerAction,
}

enum Layout {
    Small(Vec<(SubscriptionKey, SubscriptionEntry)>),
    Large(HashMap<SubscriptionKey, SubscriptionEntry>),
}

/// Adaptive storage of one agent's subscriptions.
pub(crate) struct SubscriptionStorage {
    layout: Layout,
    threshold: usize,
}

impl SubscriptionStorage {
    pub(crate) fn new(threshold: Option<usize>) -> Self {
        Self {
            layout: Layout::Small(Vec::new()),
            threshold: threshold.unwrap_or(DEFAULT_STORAGE_THRESHOLD),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &self.layout {
            Layout::Small(entries) => entries.len(),
            Layout::Large(map) => map.len(),
        }
    }

    pub(crate) fn contains(&self, key: &SubscriptionKey) -> bool {
        match &self.layout {
            Layout::Small(entries) => entries.iter().any(|(k, _)| k == key),
            Layout::Large(map) => map.contains_key(key),
        }
    }

    /// Insert a new entry. The caller has already checked for duplicates.
    pub(crate) fn insert(&mut self, key: SubscriptionKey, entry: SubscriptionEntry) {
        match &mut self.layout {
            Layout::Small(entries) => {
                entries.push((key, entry));
                if entries.len() > self.threshold {
                    let map: HashMap<_, _> = entries.drain(..).collect();
                    self.layout = Layout::Large(map);
                }
            }
            Layout::Large(map) => {
                map.insert(key, entry);
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &SubscriptionKey) -> Option<SubscriptionEntry> {
        match &mut self.layout {
            Layout::Small(entries) => entries
                .iter()
                .position(|(k, _)| k == key)
                .map(|pos| entries.remove(pos).1),
            Layout::Large(map) => map.remove(key),
        }
    }

    /// Remove the entries of every state for `(mbox, type)`; returns how
    /// many were removed.
    pub(crate) fn remove_all_states(&mut self, mbox: MailboxId, type_key: TypeKey) -> usize {
        match &mut self.layout {
            Layout::Small(entries) => {
                let before = entries.len();
                entries.retain(|(k, _)| !(k.mbox == mbox && k.type_key == type_key));
                before - entries.len()
            }
            Layout::Large(map) => {
                let before = map.len();
                map.retain(|k, _| !(k.mbox == mbox && k.type_key == type_key));
                before - map.len()
            }
        }
    }

    pub(crate) fn find(&self, key: &SubscriptionKey) -> Option<&SubscriptionEntry> {
        match &self.layout {
            Layout::Small(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, e)| e),
            Layout::Large(map) => map.get(key),
        }
    }

    /// Look the action up walking `path` (leaf first) until a state has an
    /// entry for `(mbox, type)`.
    pub(crate) fn find_on_path(
        &self,
        mbox: MailboxId,
        type_key: TypeKey,
        path: &[StateId],
    ) -> Option<(StateId, HandlerAction)> {
        for state in path {
            let key = SubscriptionKey {
                mbox,
                type_key,
                state: *state,
            };
            if let Some(entry) = self.find(&key) {
                return Some((*state, entry.action.clone()));
            }
        }
        None
    }

    /// Number of entries referencing `(mbox, type)` across all states.
    pub(crate) fn usage_count(&self, mbox: MailboxId, type_key: TypeKey) -> usize {
        let matches = |k: &SubscriptionKey| k.mbox == mbox && k.type_key == type_key;
        match &self.layout {
            Layout::Small(entries) => entries.iter().filter(|(k, _)| matches(k)).count(),
            Layout::Large(map) => map.keys().filter(|k| matches(k)).count(),
        }
    }

    /// Is there a subscription for `(mbox, type)` in any state / in `state`?
    pub(crate) fn has_subscription(
        &self,
        mbox: MailboxId,
        type_key: TypeKey,
        state: Option<StateId>,
    ) -> bool {
        match state {
            Some(state) => self.contains(&SubscriptionKey {
                mbox,
                type_key,
                state,
            }),
            None => self.usage_count(mbox, type_key) > 0,
        }
    }

    /// Unique `(mbox, type)` pairs currently referenced; used for teardown.
    pub(crate) fn referenced_pairs(&self) -> Vec<(MboxRef, TypeKey)> {
        let mut seen: Vec<(MailboxId, TypeKey)> = Vec::new();
        let mut result = Vec::new();
        let mut visit = |key: &SubscriptionKey, entry: &SubscriptionEntry| {
            if !seen.contains(&(key.mbox, key.type_key)) {
                seen.push((key.mbox, key.type_key));
                result.push((Arc::clone(&entry.mbox_ref), key.type_key));
            }
        };
        match &self.layout {
            Layout::Small(entries) => {
                for (k, e) in entries {
                    visit(k, e);
                }
            }
            Layout::Large(map) => {
                for (k, e) in map {
                    visit(k, e);
                }
            }
        }
        result
    }

    pub(crate) fn clear(&mut self) {
        match &mut self.layout {
            Layout::Small(entries) => entries.clear(),
            Layout::Large(map) => map.clear(),
        }
    }
}

/// Deadletter handlers: per `(mailbox, type)`, state-independent.
pub(crate) struct DeadletterRegistry {
    entries: HashMap<(MailboxId, TypeKey), SubscriptionEntry>,
}

impl DeadletterRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub(crate) fn contains(&self, mbox: MailboxId, type_key: TypeKey) -> bool {
        self.entries.contains_key(&(mbox, type_key))
    }

    pub(crate) fn insert(&mut self, mbox: MailboxId, type_key: TypeKey, entry: SubscriptionEntry) {
        self.entries.insert((mbox, type_key), entry);
    }

    pub(crate) fn remove(&mut self, mbox: MailboxId, type_key: TypeKey) -> Option<SubscriptionEntry> {
        self.entries.remove(&(mbox, type_key))
    }

    pub(crate) fn find(&self, mbox: MailboxId, type_key: TypeKey) -> Option<&SubscriptionEntry> {
        self.entries.get(&(mbox, type_key))
    }

    pub(crate) fn referenced_pairs(&self) -> Vec<(MboxRef, TypeKey)> {
        self.entries
            .iter()
            .map(|((_, type_key), entry)| (Arc::clone(&entry.mbox_ref), *type_key))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Delivery filters installed by one agent, tracked for teardown.
pub(crate) struct FilterRegistry {
    entries: Vec<(MboxRef, TypeKey)>,
}

impl FilterRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an installation; returns true when it replaced an earlier one.
    pub(crate) fn record(&mut self, mbox: &MboxRef, type_key: TypeKey) -> bool {
        let existed = self
            .entries
            .iter()
            .any(|(m, k)| m.id() == mbox.id() && *k == type_key);
        if !existed {
            self.entries.push((Arc::clone(mbox), type_key));
        }
        existed
    }

    pub(crate) fn forget(&mut self, mbox: &MboxRef, type_key: TypeKey) {
        self.entries
            .retain(|(m, k)| !(m.id() == mbox.id() && *k == type_key));
    }

    pub(crate) fn drain(&mut self) -> Vec<(MboxRef, TypeKey)> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(mbox: MailboxId, state: StateId) -> SubscriptionKey {
        SubscriptionKey {
            mbox,
            type_key: TypeKey::immutable::<u32>(),
            state,
        }
    }

    fn entry(mbox_ref: &MboxRef) -> SubscriptionEntry {
        SubscriptionEntry {
            mbox_ref: Arc::clone(mbox_ref),
            action: HandlerAction::Suppress,
        }
    }

    #[test]
    fn test_storage_switches_layout_past_threshold() {
        let env = crate::environment::Environment::core_for_tests();
        let mbox = env.create_mbox();
        let mbox_id = mbox.id();

        let mut storage = SubscriptionStorage::new(Some(3));
        for state in 0..5 {
            storage.insert(key(mbox_id, state), entry(&mbox));
        }

        assert_eq!(storage.len(), 5);
        for state in 0..5 {
            assert!(storage.contains(&key(mbox_id, state)));
        }
        assert!(matches!(storage.layout, Layout::Large(_)));
    }

    #[test]
    fn test_find_on_path_prefers_the_leaf() {
        let env = crate::environment::Environment::core_for_tests();
        let mbox = env.create_mbox();
        let mbox_id = mbox.id();

        let mut storage = SubscriptionStorage::new(None);
        storage.insert(key(mbox_id, 0), entry(&mbox));
        storage.insert(key(mbox_id, 2), entry(&mbox));

        let found = storage.find_on_path(mbox_id, TypeKey::immutable::<u32>(), &[2, 1, 0]);
        assert_eq!(found.map(|(state, _)| state), Some(2));

        let fallback = storage.find_on_path(mbox_id, TypeKey::immutable::<u32>(), &[1, 0]);
        assert_eq!(fallback.map(|(state, _)| state), Some(0));
    }

    #[test]
    fn test_remove_all_states_counts() {
        let env = crate::environment::Environment::core_for_tests();
        let mbox = env.create_mbox();
        let mbox_id = mbox.id();

        let mut storage = SubscriptionStorage::new(None);
        storage.insert(key(mbox_id, 0), entry(&mbox));
        storage.insert(key(mbox_id, 1), entry(&mbox));

        assert_eq!(storage.usage_count(mbox_id, TypeKey::immutable::<u32>()), 2);
        assert_eq!(storage.remove_all_states(mbox_id, TypeKey::immutable::<u32>()), 2);
        assert!(!storage.has_subscription(mbox_id, TypeKey::immutable::<u32>(), None));
    }

    #[test]
    fn test_referenced_pairs_deduplicate() {
        let env = crate::environment::Environment::core_for_tests();
        let mbox = env.create_mbox();
        let mbox_id = mbox.id();

        let mut storage = SubscriptionStorage::new(None);
        storage.insert(key(mbox_id, 0), entry(&mbox));
        storage.insert(key(mbox_id, 1), entry(&mbox));

        assert_eq!(storage.referenced_pairs().len(), 1);
    }
}
