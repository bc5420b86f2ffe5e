//! Per-operation routing context.
//!
//! A [`RoutingContext`] carries what is known about the caller's intent at
//! the moment a connection is requested. The read-only hint is tri-state
//! because the transaction layer does not always know whether a transaction
//! is read-only before it needs a connection to start it; `Unknown` is an
//! ordinary input and routes to the default role.
//!
//! A transaction layer that learns the hint after the context was created can
//! feed it in through [`RoutingContext::resolve_hint`] before the first
//! acquisition.

use std::fmt;
use std::sync::OnceLock;

use uuid::Uuid;

use crate::role::Role;

/// Whether the caller's work is known to be read-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadOnlyHint {
    /// Only reads; may be served by a replica.
    ReadOnly,
    /// May write; must be served by the primary.
    ReadWrite,
    /// Not yet established.
    #[default]
    Unknown,
}

impl From<bool> for ReadOnlyHint {
    fn from(read_only: bool) -> Self {
        if read_only {
            ReadOnlyHint::ReadOnly
        } else {
            ReadOnlyHint::ReadWrite
        }
    }
}

impl From<Option<bool>> for ReadOnlyHint {
    fn from(read_only: Option<bool>) -> Self {
        read_only.map_or(ReadOnlyHint::Unknown, ReadOnlyHint::from)
    }
}

impl fmt::Display for ReadOnlyHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadOnlyHint::ReadOnly => f.write_str("read_only"),
            ReadOnlyHint::ReadWrite => f.write_str("read_write"),
            ReadOnlyHint::Unknown => f.write_str("unknown"),
        }
    }
}

/// Identifier of one logical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Routing input for one logical operation or transaction.
///
/// Transaction contexts pin the role chosen by their first acquisition so
/// that every later acquisition in the same transaction lands on the same
/// role.
#[derive(Debug, Default)]
pub struct RoutingContext {
    hint: ReadOnlyHint,
    transaction: Option<TransactionId>,
    pinned: OnceLock<Role>,
}

impl RoutingContext {
    /// Context with an unknown hint and no transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a read-only operation.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new().with_hint(ReadOnlyHint::ReadOnly)
    }

    /// Context for an operation that may write.
    #[must_use]
    pub fn read_write() -> Self {
        Self::new().with_hint(ReadOnlyHint::ReadWrite)
    }

    /// Replace the hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<ReadOnlyHint>) -> Self {
        self.hint = hint.into();
        self
    }

    pub(crate) fn for_transaction(read_only: bool) -> Self {
        Self {
            hint: read_only.into(),
            transaction: Some(TransactionId::new()),
            pinned: OnceLock::new(),
        }
    }

    /// Supply a hint that became known after the context was created.
    ///
    /// Only an `Unknown` hint is replaced, and only before the context has
    /// been pinned to a role. Returns whether the hint was applied.
    pub fn resolve_hint(&mut self, hint: impl Into<ReadOnlyHint>) -> bool {
        let hint = hint.into();
        if self.hint != ReadOnlyHint::Unknown || self.pinned.get().is_some() {
            return false;
        }
        self.hint = hint;
        true
    }

    /// The read-only hint.
    #[must_use]
    pub fn hint(&self) -> ReadOnlyHint {
        self.hint
    }

    /// The transaction this context belongs to, if any.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// Whether this context belongs to a transaction.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }

    /// The role this context is bound to, once pinned.
    #[must_use]
    pub fn pinned_role(&self) -> Option<Role> {
        self.pinned.get().copied()
    }

    /// Bind the context to `role` unless it is already bound; returns the
    /// role the context ends up bound to.
    pub(crate) fn pin(&self, role: Role) -> Role {
        *self.pinned.get_or_init(|| role)
    }
}
