//! Tracing spans for routing operations.
//!
//! Every acquisition runs inside a `dbroute.acquire` span carrying the
//! read-only hint, the chosen role and, for transactions, the transaction
//! id. Transaction boundaries get their own spans so a subscriber can
//! correlate the acquisitions of one transaction.

use tracing::Span;
use tracing::field::{Empty, display};

use crate::context::RoutingContext;
use crate::role::Role;

/// Span names for routing operations.
pub mod span_names {
    /// Span name for connection acquisition.
    pub const ACQUIRE: &str = "dbroute.acquire";
    /// Span name for beginning a transaction.
    pub const BEGIN_TRANSACTION: &str = "dbroute.begin_transaction";
    /// Span name for committing a transaction.
    pub const COMMIT: &str = "dbroute.commit";
    /// Span name for rolling back a transaction.
    pub const ROLLBACK: &str = "dbroute.rollback";
    /// Span name for pool registry initialization.
    pub const INITIALIZE: &str = "dbroute.initialize";
    /// Span name for registry shutdown.
    pub const SHUTDOWN: &str = "dbroute.shutdown";
}

/// Field keys recorded on routing spans.
pub mod attributes {
    /// Target role.
    pub const ROLE: &str = "db.role";
    /// Read-only hint of the routing context.
    pub const HINT: &str = "db.read_only_hint";
    /// Transaction id, when the context is transactional.
    pub const TRANSACTION_ID: &str = "db.transaction_id";
}

/// Span for acquiring a connection for `ctx` from the pool serving `role`.
pub(crate) fn acquire_span(ctx: &RoutingContext, role: Role) -> Span {
    let span = tracing::debug_span!(
        span_names::ACQUIRE,
        db.role = Empty,
        db.read_only_hint = Empty,
        db.transaction_id = Empty,
    );
    span.record(attributes::ROLE, display(role));
    record_context(&span, ctx);
    span
}

/// Span for a transaction boundary.
pub(crate) fn transaction_span(name: &'static str, ctx: &RoutingContext) -> Span {
    let span = match name {
        span_names::BEGIN_TRANSACTION => tracing::debug_span!(
            span_names::BEGIN_TRANSACTION,
            db.role = Empty,
            db.read_only_hint = Empty,
            db.transaction_id = Empty,
        ),
        span_names::COMMIT => tracing::debug_span!(
            span_names::COMMIT,
            db.role = Empty,
            db.read_only_hint = Empty,
            db.transaction_id = Empty,
        ),
        _ => tracing::debug_span!(
            span_names::ROLLBACK,
            db.role = Empty,
            db.read_only_hint = Empty,
            db.transaction_id = Empty,
        ),
    };
    if let Some(role) = ctx.pinned_role() {
        span.record(attributes::ROLE, display(role));
    }
    record_context(&span, ctx);
    span
}

fn record_context(span: &Span, ctx: &RoutingContext) {
    span.record(attributes::HINT, display(ctx.hint()));
    if let Some(id) = ctx.transaction_id() {
        span.record(attributes::TRANSACTION_ID, display(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_span_names_are_namespaced() {
        for name in [
            span_names::ACQUIRE,
            span_names::BEGIN_TRANSACTION,
            span_names::COMMIT,
            span_names::ROLLBACK,
            span_names::INITIALIZE,
            span_names::SHUTDOWN,
        ] {
            assert!(name.starts_with("dbroute."));
        }
    }

    #[test]
    fn test_spans_build_without_subscriber() {
        let ctx = RoutingContext::for_transaction(true);
        let _ = acquire_span(&ctx, Role::REPLICA);
        let _ = transaction_span(span_names::COMMIT, &ctx);
        let _ = transaction_span(span_names::ROLLBACK, &RoutingContext::new());
    }

    #[test]
    fn test_spans_declare_attribute_fields() {
        let subscriber = tracing_subscriber::registry().with(LevelFilter::DEBUG);
        tracing::subscriber::with_default(subscriber, || {
            let ctx = RoutingContext::for_transaction(true);
            let spans = [
                acquire_span(&ctx, Role::REPLICA),
                transaction_span(span_names::BEGIN_TRANSACTION, &ctx),
                transaction_span(span_names::COMMIT, &ctx),
                transaction_span(span_names::ROLLBACK, &ctx),
            ];
            for span in &spans {
                for key in [attributes::ROLE, attributes::HINT, attributes::TRANSACTION_ID] {
                    assert!(span.field(key).is_some(), "{key} missing");
                }
            }
        });
    }
}
