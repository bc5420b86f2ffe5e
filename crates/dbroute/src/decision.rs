//! Routing decisions.
//!
//! The [`DecisionEngine`] maps a [`RoutingContext`] to a [`Role`]:
//!
//! | hint        | role                                          |
//! |-------------|-----------------------------------------------|
//! | `ReadWrite` | primary                                       |
//! | `ReadOnly`  | a replica chosen by the selector, else primary |
//! | `Unknown`   | the default role (primary unless opted out)    |
//!
//! A context already pinned to a role always gets that role back. The engine
//! never waits for a hint and never infers one; an `Unknown` hint simply
//! takes the conservative default.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::{ReadOnlyHint, RoutingContext};
use crate::error::{Error, Result};
use crate::role::{ReplicaId, Role};

/// Strategy for picking one of several replicas.
pub trait ReplicaSelector: Send + Sync + fmt::Debug {
    /// Pick a replica from the non-empty `replicas` for `ctx`.
    fn select(&self, replicas: &[ReplicaId], ctx: &RoutingContext) -> Option<ReplicaId>;
}

/// Rotates through replicas on every call.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    /// Create a selector starting at the first replica.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplicaSelector for RoundRobin {
    fn select(&self, replicas: &[ReplicaId], _ctx: &RoutingContext) -> Option<ReplicaId> {
        if replicas.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % replicas.len();
        replicas.get(index).copied()
    }
}

/// Sends each transaction to a replica derived from its id; operations
/// outside a transaction always use the first replica.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticAffinity;

impl ReplicaSelector for StaticAffinity {
    fn select(&self, replicas: &[ReplicaId], ctx: &RoutingContext) -> Option<ReplicaId> {
        let index = match ctx.transaction_id() {
            Some(id) if !replicas.is_empty() => {
                let mut hasher = DefaultHasher::new();
                id.hash(&mut hasher);
                (hasher.finish() % replicas.len() as u64) as usize
            }
            _ => 0,
        };
        replicas.get(index).copied()
    }
}

/// Computes the target role for a routing context.
///
/// Cheap to clone; clones share the replica list and selector.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    default_role: Role,
    replicas: Arc<[ReplicaId]>,
    selector: Arc<dyn ReplicaSelector>,
}

impl DecisionEngine {
    /// Engine for the given replicas, defaulting to the primary and
    /// round-robin replica selection.
    pub fn new(replicas: impl IntoIterator<Item = ReplicaId>) -> Self {
        let mut replicas: Vec<ReplicaId> = replicas.into_iter().collect();
        replicas.sort_unstable();
        replicas.dedup();
        Self {
            default_role: Role::Primary,
            replicas: replicas.into(),
            selector: Arc::new(RoundRobin::new()),
        }
    }

    /// Use a different replica selection strategy.
    #[must_use]
    pub fn with_selector(mut self, selector: Arc<dyn ReplicaSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Route `Unknown` hints to `role`.
    ///
    /// A replica default is refused unless `allow_replica_default` is set,
    /// since a write issued under an unknown hint would then hit a replica.
    pub fn with_default_role(mut self, role: Role, allow_replica_default: bool) -> Result<Self> {
        if let Some(id) = role.replica_id() {
            if !allow_replica_default {
                return Err(Error::Config(format!(
                    "default role {role} is a replica; set allow_replica_default to opt in"
                )));
            }
            if !self.replicas.contains(&id) {
                return Err(Error::UnknownRole(role));
            }
        }
        self.default_role = role;
        Ok(self)
    }

    /// Decide which role serves `ctx`.
    ///
    /// Never fails and never blocks.
    #[must_use]
    pub fn decide(&self, ctx: &RoutingContext) -> Role {
        if let Some(role) = ctx.pinned_role() {
            return role;
        }

        let role = match ctx.hint() {
            ReadOnlyHint::ReadWrite => Role::Primary,
            ReadOnlyHint::ReadOnly => self
                .select_replica(ctx)
                .map_or(Role::Primary, Role::Replica),
            ReadOnlyHint::Unknown => self.default_role,
        };

        tracing::debug!(hint = %ctx.hint(), role = %role, "routing decision");
        role
    }

    fn select_replica(&self, ctx: &RoutingContext) -> Option<ReplicaId> {
        if self.replicas.is_empty() {
            return None;
        }
        self.selector
            .select(&self.replicas, ctx)
            .filter(|id| self.replicas.contains(id))
    }

    /// Role used for `Unknown` hints.
    #[must_use]
    pub fn default_role(&self) -> Role {
        self.default_role
    }

    /// Configured replicas, in ascending order.
    #[must_use]
    pub fn replicas(&self) -> &[ReplicaId] {
        &self.replicas
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn engine(replicas: &[u16]) -> DecisionEngine {
        DecisionEngine::new(replicas.iter().copied().map(ReplicaId))
    }

    #[test]
    fn test_read_write_and_unknown_go_to_primary() {
        let engine = engine(&[0]);
        assert_eq!(engine.decide(&RoutingContext::read_write()), Role::Primary);
        assert_eq!(engine.decide(&RoutingContext::new()), Role::Primary);
    }

    #[test]
    fn test_read_only_goes_to_replica() {
        let engine = engine(&[0]);
        assert_eq!(engine.decide(&RoutingContext::read_only()), Role::REPLICA);
    }

    #[test]
    fn test_read_only_without_replicas_falls_back_to_primary() {
        let engine = engine(&[]);
        assert_eq!(engine.decide(&RoutingContext::read_only()), Role::Primary);
    }

    #[test]
    fn test_round_robin_rotates() {
        let engine = engine(&[2, 0, 1]);
        let picks: Vec<Role> = (0..4)
            .map(|_| engine.decide(&RoutingContext::read_only()))
            .collect();
        assert_eq!(
            picks,
            vec![
                Role::replica(0),
                Role::replica(1),
                Role::replica(2),
                Role::replica(0)
            ]
        );
    }

    #[test]
    fn test_static_affinity_is_stable_per_transaction() {
        let engine = engine(&[0, 1, 2, 3]).with_selector(Arc::new(StaticAffinity));
        let ctx = RoutingContext::for_transaction(true);
        let first = engine.decide(&ctx);
        for _ in 0..10 {
            assert_eq!(engine.decide(&ctx), first);
        }
        assert_eq!(engine.decide(&RoutingContext::read_only()), Role::replica(0));
    }

    #[test]
    fn test_pinned_context_keeps_its_role() {
        let engine = engine(&[0, 1]);
        let ctx = RoutingContext::for_transaction(true);
        ctx.pin(Role::replica(1));
        for _ in 0..5 {
            assert_eq!(engine.decide(&ctx), Role::replica(1));
        }
    }

    #[test]
    fn test_replica_default_requires_opt_in() {
        assert!(matches!(
            engine(&[0]).with_default_role(Role::REPLICA, false),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            engine(&[0]).with_default_role(Role::replica(5), true),
            Err(Error::UnknownRole(_))
        ));

        let engine = engine(&[0]).with_default_role(Role::REPLICA, true).unwrap();
        assert_eq!(engine.decide(&RoutingContext::new()), Role::REPLICA);
        assert_eq!(engine.decide(&RoutingContext::read_write()), Role::Primary);
    }

    #[derive(Debug)]
    struct Rogue;

    impl ReplicaSelector for Rogue {
        fn select(&self, _replicas: &[ReplicaId], _ctx: &RoutingContext) -> Option<ReplicaId> {
            Some(ReplicaId(99))
        }
    }

    #[test]
    fn test_unconfigured_selection_falls_back_to_primary() {
        let engine = engine(&[0]).with_selector(Arc::new(Rogue));
        assert_eq!(engine.decide(&RoutingContext::read_only()), Role::Primary);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unknown_decisions_all_primary() {
        let engine = engine(&[0, 1]);
        let mut handles = Vec::with_capacity(10_000);
        for _ in 0..10_000 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.decide(&RoutingContext::new())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Role::Primary);
        }
    }
}
