use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::TransitionContext;
use super::errors::OrderError;
use super::transition_engine::{Disposition, TransitionEngine};
use super::value_objects::{OrderStatus, PaymentStatus};
use crate::metrics::Metrics;

// ============================================================================
// Order Sweep - Time-based promotion of stale orders
// ============================================================================
//
// Rules, each evaluated against orders read in their source status at sweep
// time:
//   confirm: pending, payment completed, older than `confirm_grace` → confirmed
//   process: confirmed, older than `process_grace`                  → processing
//   expire:  pending, payment failed and older than `failed_payment_grace`,
//            or payment still unsettled and older than `unpaid_grace` → cancelled
//
// Expiry cancels through the engine like any other cancellation, so the
// order's reserved stock goes back to inventory exactly once.
//
// Every promotion goes through the transition engine, so it is guarded on the
// status the sweep read. An order moved by someone else in between is
// skipped, never overwritten.
//
// ============================================================================

pub const SWEEP_ACTOR: &str = "sweep";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepRules {
    pub confirm_grace: Duration,
    pub process_grace: Duration,
    pub failed_payment_grace: Duration,
    pub unpaid_grace: Duration,
}

impl Default for SweepRules {
    fn default() -> Self {
        Self {
            confirm_grace: Duration::hours(1),
            process_grace: Duration::hours(24),
            failed_payment_grace: Duration::minutes(15),
            unpaid_grace: Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub order_id: Uuid,
    pub rule: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub confirmed: Vec<Uuid>,
    pub processing: Vec<Uuid>,
    /// Unpaid pending orders cancelled
    pub expired: Vec<Uuid>,
    /// Eligible orders another writer moved first
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            confirmed: Vec::new(),
            processing: Vec::new(),
            expired: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn promoted(&self) -> usize {
        self.confirmed.len() + self.processing.len()
    }

    /// Orders this pass moved, expiries included
    pub fn changed(&self) -> usize {
        self.promoted() + self.expired.len()
    }
}

struct Rule {
    name: &'static str,
    from: OrderStatus,
    to: OrderStatus,
    note: &'static str,
}

const CONFIRM_RULE: Rule = Rule {
    name: "confirm",
    from: OrderStatus::Pending,
    to: OrderStatus::Confirmed,
    note: "Automatically confirmed after payment",
};

const PROCESS_RULE: Rule = Rule {
    name: "process",
    from: OrderStatus::Confirmed,
    to: OrderStatus::Processing,
    note: "Automatically moved to processing",
};

const EXPIRE_RULE: Rule = Rule {
    name: "expire",
    from: OrderStatus::Pending,
    to: OrderStatus::Cancelled,
    note: "Automatically cancelled, payment not completed",
};

pub struct OrderSweeper {
    engine: Arc<TransitionEngine>,
    rules: SweepRules,
    metrics: Arc<Metrics>,
}

impl OrderSweeper {
    pub fn new(engine: Arc<TransitionEngine>, rules: SweepRules, metrics: Arc<Metrics>) -> Self {
        Self {
            engine,
            rules,
            metrics,
        }
    }

    /// One sweep pass. Fails only when a rule's candidate query fails;
    /// per-order failures are collected in the report.
    pub async fn run(&self) -> Result<SweepReport, OrderError> {
        let now = self.engine.clock().now();
        let mut report = SweepReport::new(now);

        let confirm_cutoff = now - self.rules.confirm_grace;
        self.apply_rule(&CONFIRM_RULE, &mut report, |order| {
            order.payment.status == PaymentStatus::Completed && order.created_at <= confirm_cutoff
        })
        .await?;

        let process_cutoff = now - self.rules.process_grace;
        self.apply_rule(&PROCESS_RULE, &mut report, |order| order.created_at <= process_cutoff)
            .await?;

        let failed_cutoff = now - self.rules.failed_payment_grace;
        let unpaid_cutoff = now - self.rules.unpaid_grace;
        self.apply_rule(&EXPIRE_RULE, &mut report, |order| match order.payment.status {
            PaymentStatus::Completed => false,
            PaymentStatus::Failed => order.updated_at <= failed_cutoff,
            PaymentStatus::Pending => order.created_at <= unpaid_cutoff,
        })
        .await?;

        tracing::info!(
            confirmed = report.confirmed.len(),
            processing = report.processing.len(),
            expired = report.expired.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "🧹 Order sweep finished"
        );

        Ok(report)
    }

    async fn apply_rule<F>(&self, rule: &Rule, report: &mut SweepReport, eligible: F) -> Result<(), OrderError>
    where
        F: Fn(&Order) -> bool,
    {
        let candidates = self.engine.store().list_by_status(rule.from).await?;

        for order in candidates.into_iter().filter(|order| eligible(order)) {
            let order_id = order.id;
            let ctx = TransitionContext::system(SWEEP_ACTOR).with_note(rule.note);

            match self.engine.apply(order, rule.to, ctx).await {
                Ok(outcome) if outcome.disposition == Disposition::Applied => {
                    self.metrics.record_sweep_promotion(rule.name);
                    match rule.to {
                        OrderStatus::Confirmed => report.confirmed.push(order_id),
                        OrderStatus::Cancelled => report.expired.push(order_id),
                        _ => report.processing.push(order_id),
                    }
                }
                Ok(_) => {
                    tracing::debug!(order_id = %order_id, rule = rule.name, "Order moved concurrently, skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(order_id = %order_id, rule = rule.name, error = %e, "Sweep failed to promote order");
                    self.metrics.record_sweep_failure();
                    report.failures.push(SweepFailure {
                        order_id,
                        rule: rule.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
