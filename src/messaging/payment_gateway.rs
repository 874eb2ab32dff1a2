use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::order::Money;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Payment Gateway Interface
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub phone: String,
    pub amount: Money,
}

/// Gateway accepted a mobile-money push; the outcome arrives via callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAccepted {
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Money,
    pub card_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment gateway timed out after {0:?}")]
    Timeout(Duration),

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment request rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_push(&self, request: &PushRequest) -> Result<PushAccepted, GatewayError>;

    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError>;
}

// ============================================================================
// Guarded Payment Client - Timeout + Circuit Breaker
// ============================================================================
//
// Every outbound call is bounded by `timeout` and runs inside the breaker;
// timeouts count as breaker failures. A declined capture is a successful
// call as far as the breaker is concerned.
//
// ============================================================================

pub struct GuardedPaymentClient {
    gateway: Arc<dyn PaymentGateway>,
    circuit_breaker: CircuitBreaker,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl GuardedPaymentClient {
    pub fn new(gateway: Arc<dyn PaymentGateway>, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        };

        Self {
            gateway,
            circuit_breaker: CircuitBreaker::new("payment_gateway", cb_config)
                .with_metrics(metrics.clone()),
            timeout,
            metrics,
        }
    }

    pub async fn request_push(&self, request: &PushRequest) -> Result<PushAccepted, GatewayError> {
        self.guarded("push", self.gateway.request_push(request)).await
    }

    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError> {
        self.guarded("capture", self.gateway.capture(request)).await
    }

    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let started = Instant::now();
        let timeout = self.timeout;

        let result = self
            .circuit_breaker
            .call(async move {
                match tokio::time::timeout(timeout, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(GatewayError::Timeout(timeout)),
                }
            })
            .await;

        self.metrics
            .observe_gateway_call(operation, started.elapsed().as_secs_f64());

        match result {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(operation = operation, "Circuit breaker open - payment gateway unavailable");
                Err(GatewayError::Unavailable("circuit breaker open".to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(operation = operation, error = %e, "Payment gateway call failed");
                Err(e)
            }
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    pub async fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset().await;
    }
}

// ============================================================================
// Simulated Gateway - deterministic stand-in for the provider network
// ============================================================================
//
// Approves everything unless scripted otherwise. Scripted outcomes are
// consumed in order, one per call.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Respond(T),
    Fail(GatewayError),
    /// Sleep before responding with the default outcome
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct SimulatedGateway {
    push_script: Mutex<VecDeque<Scripted<PushAccepted>>>,
    capture_script: Mutex<VecDeque<Scripted<CaptureOutcome>>>,
    pushes: Mutex<Vec<PushRequest>>,
    captures: Mutex<Vec<CaptureRequest>>,
    sequence: AtomicU64,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_push(&self, step: Scripted<PushAccepted>) {
        self.push_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(step);
    }

    pub fn script_capture(&self, step: Scripted<CaptureOutcome>) {
        self.capture_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(step);
    }

    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn captures(&self) -> Vec<CaptureRequest> {
        self.captures.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn next_reference(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{:08}", prefix, n)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn request_push(&self, request: &PushRequest) -> Result<PushAccepted, GatewayError> {
        self.pushes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        let step = self
            .push_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match step {
            Some(Scripted::Respond(accepted)) => Ok(accepted),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(PushAccepted { reference: self.next_reference("ws_CO") })
            }
            None => Ok(PushAccepted { reference: self.next_reference("ws_CO") }),
        }
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, GatewayError> {
        self.captures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        let step = self
            .capture_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match step {
            Some(Scripted::Respond(outcome)) => Ok(outcome),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(CaptureOutcome::Approved { transaction_id: self.next_reference("ch") })
            }
            None => Ok(CaptureOutcome::Approved { transaction_id: self.next_reference("ch") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_request() -> CaptureRequest {
        CaptureRequest {
            order_id: Uuid::new_v4(),
            order_number: "ORD-20240601-AAAAAAAA".to_string(),
            amount: Money::from_units(1200),
            card_token: "tok_visa".to_string(),
        }
    }

    fn client(gateway: Arc<SimulatedGateway>, timeout_ms: u64) -> GuardedPaymentClient {
        GuardedPaymentClient::new(
            gateway,
            Duration::from_millis(timeout_ms),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_capture_approved_by_default() {
        let gateway = Arc::new(SimulatedGateway::new());
        let outcome = client(gateway.clone(), 1000).capture(&capture_request()).await.unwrap();

        assert!(matches!(outcome, CaptureOutcome::Approved { .. }));
        assert_eq!(gateway.captures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_gateway_times_out() {
        let gateway = Arc::new(SimulatedGateway::new());
        gateway.script_capture(Scripted::Delay(Duration::from_secs(30)));

        let err = client(gateway, 500).capture(&capture_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_failures() {
        let gateway = Arc::new(SimulatedGateway::new());
        for _ in 0..5 {
            gateway.script_capture(Scripted::Fail(GatewayError::Unavailable("503".to_string())));
        }
        let client = client(gateway.clone(), 1000);

        for _ in 0..5 {
            let _ = client.capture(&capture_request()).await;
        }
        assert_eq!(client.circuit_state().await, CircuitState::Open);

        // Rejected without reaching the gateway
        let err = client.capture(&capture_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(gateway.captures().len(), 5);
    }

    #[tokio::test]
    async fn test_decline_does_not_trip_breaker() {
        let gateway = Arc::new(SimulatedGateway::new());
        for _ in 0..6 {
            gateway.script_capture(Scripted::Respond(CaptureOutcome::Declined {
                reason: "insufficient funds".to_string(),
            }));
        }
        let client = client(gateway, 1000);

        for _ in 0..6 {
            let outcome = client.capture(&capture_request()).await.unwrap();
            assert!(matches!(outcome, CaptureOutcome::Declined { .. }));
        }
        assert_eq!(client.circuit_state().await, CircuitState::Closed);
    }
}
