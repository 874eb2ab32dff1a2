use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::order::{OrderEvent, OutboxMessage};
use crate::utils::IsTransient;

// ============================================================================
// Notifier Interface
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Worth retrying: the channel is down or timed out
    #[error("Notifier unavailable: {0}")]
    Unavailable(String),

    /// Not worth retrying: the message itself was refused
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

impl IsTransient for NotifyError {
    fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Unavailable(_))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &OutboxMessage) -> Result<(), NotifyError>;
}

// ============================================================================
// Log Notifier - writes notifications to the structured log
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &OutboxMessage) -> Result<(), NotifyError> {
        match &message.event {
            OrderEvent::Placed(placed) => tracing::info!(
                order_number = %placed.order_number,
                user_id = %placed.user_id,
                total = %placed.total_amount,
                "📧 Order placed notification"
            ),
            OrderEvent::StatusChanged(changed) => tracing::info!(
                order_number = %changed.order_number,
                user_id = %changed.user_id,
                from = %changed.from,
                to = %changed.to,
                tracking_number = ?changed.tracking_number,
                "📧 Order status notification"
            ),
            OrderEvent::PaymentFailed(failed) => tracing::info!(
                order_number = %failed.order_number,
                user_id = %failed.user_id,
                reason = %failed.reason,
                "📧 Payment failed notification"
            ),
        }
        Ok(())
    }
}

// ============================================================================
// Recording Notifier - keeps delivered messages, can be scripted to fail
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<OutboxMessage>>,
    failures: Mutex<VecDeque<NotifyError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` deliveries with `error`
    pub fn fail_next(&self, count: usize, error: NotifyError) {
        let mut failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());
        failures.extend(std::iter::repeat(error).take(count));
    }

    pub fn delivered(&self) -> Vec<OutboxMessage> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &OutboxMessage) -> Result<(), NotifyError> {
        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(message.clone());
        Ok(())
    }
}
