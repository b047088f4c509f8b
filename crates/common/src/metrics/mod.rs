//! Metrics and observability utilities
//!
//! Prometheus counters with standardized naming; descriptions are registered
//! once at startup and incremented from the ledger and handlers.

use metrics::{describe_counter, Unit};

/// Counter names, centralized so the ledger and the exporter agree
pub mod names {
    pub const LESSONS_SCHEDULED: &str = "lessonbook_lessons_scheduled_total";
    pub const LESSONS_COMPLETED: &str = "lessonbook_lessons_completed_total";
    pub const LESSONS_CANCELLED: &str = "lessonbook_lessons_cancelled_total";
    pub const LESSONS_REMOVED: &str = "lessonbook_lessons_removed_total";
    pub const INSUFFICIENT_BALANCE: &str = "lessonbook_insufficient_balance_total";
    pub const SUBSCRIPTIONS_GRANTED: &str = "lessonbook_subscriptions_granted_total";
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        names::LESSONS_SCHEDULED,
        Unit::Count,
        "Lessons scheduled (balance debited)"
    );

    describe_counter!(
        names::LESSONS_COMPLETED,
        Unit::Count,
        "Lessons marked completed"
    );

    describe_counter!(
        names::LESSONS_CANCELLED,
        Unit::Count,
        "Lessons cancelled (balance refunded)"
    );

    describe_counter!(
        names::LESSONS_REMOVED,
        Unit::Count,
        "Lessons deleted (balance refunded)"
    );

    describe_counter!(
        names::INSUFFICIENT_BALANCE,
        Unit::Count,
        "Lesson scheduling attempts rejected for zero balance"
    );

    describe_counter!(
        names::SUBSCRIPTIONS_GRANTED,
        Unit::Count,
        "Subscription grants applied to student balances"
    );
}
