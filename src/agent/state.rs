//! Hierarchical agent states.
//!
//! States form a tree per agent; the active state is always a leaf, and
//! "being in state S" means S is on the path from the leaf to the root.
//! Transitions exit up to the lowest common ancestor, move the pointer,
//! descend along initial-substate links and enter down to the new leaf.
//! A state may carry a time limit: a timer armed on entry that forces a
//! transition to a target state unless something else changes state first.

// Layer 1: Standard library imports
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

// Layer 3: Internal module imports
use crate::error::{Result, RuntimeError};
use crate::message::TypeKey;
use crate::timer::TimerHandle;

/// Index of a state inside one agent's state tree.
pub(crate) type StateId = usize;

/// Id of the default state every agent starts in.
pub(crate) const DEFAULT_STATE: StateId = 0;

/// Entry/exit action of a state.
pub(crate) type StateActionFn = dyn Fn(&mut dyn Any) + Send + Sync;

/// Cheap handle to one state of one agent.
///
/// Obtained from [`AgentContext::so_define_state`] and friends; meaningful
/// only for the agent that defined it.
///
/// [`AgentContext::so_define_state`]: crate::agent::AgentContext::so_define_state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    pub(crate) id: StateId,
}

impl State {
    /// The default state every agent starts in.
    pub fn default_state() -> Self {
        Self { id: DEFAULT_STATE }
    }
}

/// Message the runtime sends itself when a state time limit elapses.
#[derive(Debug, Clone)]
pub(crate) struct TimeLimitExpired {
    pub(crate) state: StateId,
    pub(crate) token: u64,
}

/// True for message keys that belong to the runtime, not to user code.
pub(crate) fn is_internal_key(key: TypeKey) -> bool {
    key == TypeKey::immutable::<TimeLimitExpired>()
}

pub(crate) struct StateNode {
    name: String,
    parent: Option<StateId>,
    initial_substate: Option<StateId>,
    time_limit: Option<(Duration, StateId)>,
    pub(crate) on_enter: Option<Arc<StateActionFn>>,
    pub(crate) on_exit: Option<Arc<StateActionFn>>,
}

/// The planned effect of one state transition.
pub(crate) struct TransitionPlan {
    /// States to exit, leaf first.
    pub(crate) exits: Vec<StateId>,
    /// States to enter, outermost first.
    pub(crate) enters: Vec<StateId>,
    /// The new current leaf.
    pub(crate) leaf: StateId,
}

/// One agent's state tree plus the current-leaf pointer.
pub(crate) struct StateMachine {
    nodes: Vec<StateNode>,
    current: StateId,
    /// Bumped on every (re-)arming; stale timeout messages are recognized
    /// by a token mismatch.
    pub(crate) limit_token: u64,
    /// Live timer of the innermost time-limited state on the current path.
    pub(crate) limit_timer: Option<TimerHandle>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![StateNode {
                name: "<DEFAULT>".to_string(),
                parent: None,
                initial_substate: None,
                time_limit: None,
                on_enter: None,
                on_exit: None,
            }],
            current: DEFAULT_STATE,
            limit_token: 0,
            limit_timer: None,
        }
    }

    pub(crate) fn define(&mut self, name: &str, parent: Option<StateId>) -> StateId {
        let id = self.nodes.len();
        self.nodes.push(StateNode {
            name: name.to_string(),
            parent,
            initial_substate: None,
            time_limit: None,
            on_enter: None,
            on_exit: None,
        });
        id
    }

    pub(crate) fn set_initial_substate(&mut self, parent: StateId, child: StateId) {
        if self.nodes[parent].initial_substate.is_none() {
            self.nodes[parent].initial_substate = Some(child);
        }
    }

    pub(crate) fn set_time_limit(&mut self, state: StateId, limit: Duration, target: StateId) {
        self.nodes[state].time_limit = Some((limit, target));
    }

    pub(crate) fn set_on_enter(&mut self, state: StateId, action: Arc<StateActionFn>) {
        self.nodes[state].on_enter = Some(action);
    }

    pub(crate) fn set_on_exit(&mut self, state: StateId, action: Arc<StateActionFn>) {
        self.nodes[state].on_exit = Some(action);
    }

    pub(crate) fn name_of(&self, id: StateId) -> &str {
        &self.nodes[id].name
    }

    pub(crate) fn node(&self, id: StateId) -> &StateNode {
        &self.nodes[id]
    }

    pub(crate) fn current(&self) -> StateId {
        self.current
    }

    pub(crate) fn set_current(&mut self, id: StateId) {
        self.current = id;
    }

    /// Path from `id` up to the root, starting with `id` itself.
    pub(crate) fn path_to_root(&self, id: StateId) -> Vec<StateId> {
        let mut path = vec![id];
        let mut cursor = id;
        while let Some(parent) = self.nodes[cursor].parent {
            path.push(parent);
            cursor = parent;
        }
        path
    }

    /// Path from the current leaf up to the root.
    pub(crate) fn current_path(&self) -> Vec<StateId> {
        self.path_to_root(self.current)
    }

    /// True when `id` is on the path from the current leaf to the root.
    pub(crate) fn is_in(&self, id: StateId) -> bool {
        self.current_path().contains(&id)
    }

    /// Descend from `target` along initial-substate links to a leaf.
    pub(crate) fn resolve_leaf(&self, target: StateId) -> Result<StateId> {
        let mut cursor = target;
        let mut hops = 0;
        while self.has_children(cursor) {
            match self.nodes[cursor].initial_substate {
                Some(child) => cursor = child,
                None => {
                    return Err(RuntimeError::InitialSubstateMissing {
                        state: self.nodes[cursor].name.clone(),
                    })
                }
            }
            hops += 1;
            if hops > self.nodes.len() {
                return Err(RuntimeError::InitialSubstateMissing {
                    state: self.nodes[cursor].name.clone(),
                });
            }
        }
        Ok(cursor)
    }

    fn has_children(&self, id: StateId) -> bool {
        self.nodes.iter().any(|n| n.parent == Some(id))
    }

    /// Compute exits and enters for a transition to `target`.
    pub(crate) fn plan_transition(&self, target: StateId) -> Result<TransitionPlan> {
        let leaf = self.resolve_leaf(target)?;

        let old_path = self.current_path();
        let new_path = self.path_to_root(leaf);

        // Lowest common ancestor: the first state of the old path that also
        // lies on the new path. Everything above it stays untouched.
        let lca = old_path.iter().find(|s| new_path.contains(s)).copied();

        let exits: Vec<StateId> = match lca {
            Some(anchor) => old_path.iter().take_while(|s| **s != anchor).copied().collect(),
            None => old_path.clone(),
        };
        let mut enters: Vec<StateId> = match lca {
            Some(anchor) => new_path.iter().take_while(|s| **s != anchor).copied().collect(),
            None => new_path.clone(),
        };
        enters.reverse();

        Ok(TransitionPlan {
            exits,
            enters,
            leaf,
        })
    }

    /// Innermost state on the path of `leaf` that declares a time limit.
    pub(crate) fn active_time_limit(&self, leaf: StateId) -> Option<(StateId, Duration, StateId)> {
        self.path_to_root(leaf)
            .into_iter()
            .find_map(|id| self.nodes[id].time_limit.map(|(d, t)| (id, d, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> StateMachine {
        StateMachine::new()
    }

    #[test]
    fn test_default_state_is_current() {
        let sm = machine();
        assert_eq!(sm.current(), DEFAULT_STATE);
        assert!(sm.is_in(DEFAULT_STATE));
    }

    #[test]
    fn test_path_walks_parents() {
        let mut sm = machine();
        let top = sm.define("top", None);
        let mid = sm.define("mid", Some(top));
        let leaf = sm.define("leaf", Some(mid));

        assert_eq!(sm.path_to_root(leaf), vec![leaf, mid, top]);
    }

    #[test]
    fn test_resolve_leaf_follows_initial_substates() {
        let mut sm = machine();
        let top = sm.define("top", None);
        let child = sm.define("child", Some(top));
        sm.set_initial_substate(top, child);

        assert_eq!(sm.resolve_leaf(top).unwrap(), child);
    }

    #[test]
    fn test_resolve_leaf_without_initial_fails() {
        let mut sm = machine();
        let top = sm.define("top", None);
        let _child = sm.define("child", Some(top));

        assert!(matches!(
            sm.resolve_leaf(top),
            Err(RuntimeError::InitialSubstateMissing { .. })
        ));
    }

    #[test]
    fn test_transition_plan_exits_to_lca() {
        let mut sm = machine();
        let top = sm.define("top", None);
        let a = sm.define("a", Some(top));
        let b = sm.define("b", Some(top));
        sm.set_current(a);

        let plan = sm.plan_transition(b).unwrap();
        assert_eq!(plan.exits, vec![a]);
        assert_eq!(plan.enters, vec![b]);
        assert_eq!(plan.leaf, b);
    }

    #[test]
    fn test_transition_between_trees_crosses_roots() {
        let mut sm = machine();
        let left = sm.define("left", None);
        let right = sm.define("right", None);
        sm.set_current(left);

        let plan = sm.plan_transition(right).unwrap();
        assert_eq!(plan.exits, vec![left]);
        assert_eq!(plan.enters, vec![right]);
    }

    #[test]
    fn test_self_transition_reenters() {
        let mut sm = machine();
        let s = sm.define("s", None);
        sm.set_current(s);

        // Re-entering the same leaf exits and enters nothing above it; the
        // leaf itself is both exited and entered.
        let plan = sm.plan_transition(s).unwrap();
        assert!(plan.exits.is_empty());
        assert!(plan.enters.is_empty());
        assert_eq!(plan.leaf, s);
    }

    #[test]
    fn test_active_time_limit_finds_innermost() {
        let mut sm = machine();
        let top = sm.define("top", None);
        let leaf = sm.define("leaf", Some(top));
        sm.set_time_limit(top, Duration::from_secs(5), DEFAULT_STATE);

        let found = sm.active_time_limit(leaf);
        assert_eq!(found.map(|(id, _, _)| id), Some(top));
    }

    #[test]
    fn test_internal_key_recognition() {
        assert!(is_internal_key(TypeKey::immutable::<TimeLimitExpired>()));
        assert!(!is_internal_key(TypeKey::immutable::<String>()));
    }
}
