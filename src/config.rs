use anyhow::Context;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::actors::{BackgroundConfig, RelayConfig};
use crate::domain::order::{CarrierRegistry, Money, PricingPolicy, ShippingPolicy, SweepRules};
use crate::utils::RetryConfig;

// ============================================================================
// Engine Configuration - FULFILLMENT_* environment variables
// ============================================================================
//
// Every value has a default, so an empty environment starts a working
// in-memory engine. A `.env` file is read first when present.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub http_addr: SocketAddr,
    pub metrics_port: u16,
    /// ScyllaDB contact point; `None` selects the in-memory store
    pub scylla_node: Option<String>,
    pub keyspace: String,
    pub tax_rate_percent: u32,
    pub flat_shipping_units: i64,
    pub free_shipping_threshold_units: i64,
    pub confirm_grace: Duration,
    pub process_grace: Duration,
    pub failed_payment_grace: Duration,
    pub unpaid_grace: Duration,
    pub sweep_interval: Duration,
    pub payment_timeout: Duration,
    pub outbox_poll: Duration,
    pub outbox_batch: usize,
    pub outbox_max_attempts: u32,
    pub remote_regions: Vec<String>,
    pub default_carrier: String,
    /// Shared secret the payment gateway sends on callbacks; `None` rejects every callback
    pub gateway_secret: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            metrics_port: 9090,
            scylla_node: None,
            keyspace: "fulfillment_ks".to_string(),
            tax_rate_percent: 16,
            flat_shipping_units: 300,
            free_shipping_threshold_units: 5000,
            confirm_grace: Duration::from_secs(3600),
            process_grace: Duration::from_secs(86_400),
            failed_payment_grace: Duration::from_secs(900),
            unpaid_grace: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(300),
            payment_timeout: Duration::from_millis(10_000),
            outbox_poll: Duration::from_millis(2000),
            outbox_batch: 100,
            outbox_max_attempts: 5,
            remote_regions: ["Turkana", "Mandera", "Wajir", "Marsabit", "Garissa"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_carrier: "G4S".to_string(),
            gateway_secret: None,
        }
    }
}

impl EngineConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = Reader { lookup: &lookup };

        Ok(Self {
            http_addr: read.parsed("FULFILLMENT_HTTP_ADDR", defaults.http_addr)?,
            metrics_port: read.parsed("FULFILLMENT_METRICS_PORT", defaults.metrics_port)?,
            scylla_node: read.raw("FULFILLMENT_SCYLLA_NODE"),
            keyspace: read.raw("FULFILLMENT_KEYSPACE").unwrap_or(defaults.keyspace),
            tax_rate_percent: read.parsed("FULFILLMENT_TAX_RATE_PERCENT", defaults.tax_rate_percent)?,
            flat_shipping_units: read.parsed("FULFILLMENT_FLAT_SHIPPING", defaults.flat_shipping_units)?,
            free_shipping_threshold_units: read.parsed(
                "FULFILLMENT_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold_units,
            )?,
            confirm_grace: read.secs("FULFILLMENT_CONFIRM_GRACE_SECS", defaults.confirm_grace)?,
            process_grace: read.secs("FULFILLMENT_PROCESS_GRACE_SECS", defaults.process_grace)?,
            failed_payment_grace: read.secs(
                "FULFILLMENT_FAILED_PAYMENT_GRACE_SECS",
                defaults.failed_payment_grace,
            )?,
            unpaid_grace: read.secs("FULFILLMENT_UNPAID_GRACE_SECS", defaults.unpaid_grace)?,
            sweep_interval: read.secs("FULFILLMENT_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            payment_timeout: read.millis("FULFILLMENT_PAYMENT_TIMEOUT_MS", defaults.payment_timeout)?,
            outbox_poll: read.millis("FULFILLMENT_OUTBOX_POLL_MS", defaults.outbox_poll)?,
            outbox_batch: read.parsed("FULFILLMENT_OUTBOX_BATCH", defaults.outbox_batch)?,
            outbox_max_attempts: read.parsed("FULFILLMENT_OUTBOX_MAX_ATTEMPTS", defaults.outbox_max_attempts)?,
            remote_regions: read
                .raw("FULFILLMENT_REMOTE_REGIONS")
                .map(|list| {
                    list.split(',')
                        .map(|region| region.trim().to_string())
                        .filter(|region| !region.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.remote_regions),
            default_carrier: read.raw("FULFILLMENT_DEFAULT_CARRIER").unwrap_or(defaults.default_carrier),
            gateway_secret: read.raw("FULFILLMENT_GATEWAY_SECRET"),
        })
    }

    pub fn pricing(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate_percent: self.tax_rate_percent,
            flat_shipping: Money::from_units(self.flat_shipping_units),
            free_shipping_threshold: Money::from_units(self.free_shipping_threshold_units),
        }
    }

    pub fn sweep_rules(&self) -> anyhow::Result<SweepRules> {
        Ok(SweepRules {
            confirm_grace: chrono::Duration::from_std(self.confirm_grace)
                .context("FULFILLMENT_CONFIRM_GRACE_SECS out of range")?,
            process_grace: chrono::Duration::from_std(self.process_grace)
                .context("FULFILLMENT_PROCESS_GRACE_SECS out of range")?,
            failed_payment_grace: chrono::Duration::from_std(self.failed_payment_grace)
                .context("FULFILLMENT_FAILED_PAYMENT_GRACE_SECS out of range")?,
            unpaid_grace: chrono::Duration::from_std(self.unpaid_grace)
                .context("FULFILLMENT_UNPAID_GRACE_SECS out of range")?,
        })
    }

    pub fn shipping(&self) -> ShippingPolicy {
        ShippingPolicy::new(&self.remote_regions)
    }

    pub fn carriers(&self) -> CarrierRegistry {
        CarrierRegistry::default().with_default_carrier(&self.default_carrier)
    }

    pub fn background(&self) -> BackgroundConfig {
        BackgroundConfig {
            sweep_interval: self.sweep_interval,
            outbox_poll_interval: self.outbox_poll,
            relay: RelayConfig {
                batch_size: self.outbox_batch,
                max_attempts: self.outbox_max_attempts.max(1),
                retry: RetryConfig::conservative(),
            },
            ..BackgroundConfig::default()
        }
    }
}

struct Reader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Reader<'_, F> {
    /// Non-empty value of `key`
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, value, e)),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &str, default: Duration) -> anyhow::Result<Duration> {
        Ok(Duration::from_secs(self.parsed(key, default.as_secs())?))
    }

    fn millis(&self, key: &str, default: Duration) -> anyhow::Result<Duration> {
        Ok(Duration::from_millis(self.parsed(key, default.as_millis() as u64)?))
    }
}
