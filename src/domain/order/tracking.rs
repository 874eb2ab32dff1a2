use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::errors::OrderError;
use crate::clock::Clock;
use crate::store::OrderStore;

// ============================================================================
// Carrier Registry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    /// Three-character tracking number prefix
    pub prefix: String,
    /// URL with a `{tracking_number}` placeholder
    pub tracking_url_template: String,
}

impl Carrier {
    pub fn new(name: &str, prefix: &str, tracking_url_template: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            tracking_url_template: tracking_url_template.to_string(),
        }
    }

    pub fn tracking_url(&self, tracking_number: &str) -> String {
        self.tracking_url_template
            .replace("{tracking_number}", tracking_number)
    }
}

#[derive(Debug, Clone)]
pub struct CarrierRegistry {
    carriers: Vec<Carrier>,
    default_carrier: String,
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self::new(
            vec![
                Carrier::new("G4S", "G4S", "https://www.g4s.com/en-ke/track?ref={tracking_number}"),
                Carrier::new("DHL", "DHL", "https://www.dhl.com/ke-en/home/tracking.html?tracking-id={tracking_number}"),
                Carrier::new("Fargo Courier", "FRG", "https://fargocourier.co.ke/track/{tracking_number}"),
                Carrier::new("Posta Kenya", "PKE", "https://www.posta.co.ke/track/{tracking_number}"),
                Carrier::new("Sendy", "SND", "https://app.sendyit.com/track/{tracking_number}"),
            ],
            "G4S",
        )
    }
}

impl CarrierRegistry {
    pub fn new(carriers: Vec<Carrier>, default_carrier: &str) -> Self {
        Self {
            carriers,
            default_carrier: default_carrier.to_string(),
        }
    }

    pub fn with_default_carrier(mut self, name: &str) -> Self {
        self.default_carrier = name.to_string();
        self
    }

    pub fn default_carrier(&self) -> &str {
        &self.default_carrier
    }

    /// Case-insensitive lookup by name or prefix
    pub fn lookup(&self, name: &str) -> Option<&Carrier> {
        self.carriers.iter().find(|carrier| {
            carrier.name.eq_ignore_ascii_case(name) || carrier.prefix.eq_ignore_ascii_case(name)
        })
    }

    /// Registered prefix, or the first three alphanumerics of an unknown
    /// carrier name padded with `X`
    pub fn prefix_for(&self, name: &str) -> String {
        if let Some(carrier) = self.lookup(name) {
            return carrier.prefix.clone();
        }
        let mut prefix: String = name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(3)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        while prefix.len() < 3 {
            prefix.push('X');
        }
        prefix
    }

    pub fn tracking_url(&self, carrier: &str, tracking_number: &str) -> String {
        match self.lookup(carrier) {
            Some(known) => known.tracking_url(tracking_number),
            None => format!("/tracking/{}", tracking_number),
        }
    }

    /// Canonical display name for a carrier, falling back to what was supplied
    pub fn canonical_name(&self, name: &str) -> String {
        self.lookup(name)
            .map(|carrier| carrier.name.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

// ============================================================================
// Tracking Number Generator
// ============================================================================
//
// Format: <prefix:3><last 6 digits of clock millis><6 random [A-Z0-9]>
//
// `generate` alone is only probably unique; `allocate` checks the store and
// retries so every issued number is unused at the time it is issued.
//
// ============================================================================

pub const MAX_ALLOCATION_ATTEMPTS: usize = 5;

pub struct TrackingNumberGenerator {
    carriers: Arc<CarrierRegistry>,
    clock: Arc<dyn Clock>,
}

impl TrackingNumberGenerator {
    pub fn new(carriers: Arc<CarrierRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { carriers, clock }
    }

    pub fn generate(&self, carrier: &str) -> String {
        let prefix = self.carriers.prefix_for(carrier);
        let millis = self.clock.now().timestamp_millis().rem_euclid(1_000_000);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        format!("{}{:06}{}", prefix, millis, suffix)
    }

    pub async fn allocate(&self, carrier: &str, store: &dyn OrderStore) -> Result<String, OrderError> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = self.generate(carrier);
            if !store.tracking_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!(
                carrier = %carrier,
                attempt = attempt,
                tracking_number = %candidate,
                "Tracking number collision, regenerating"
            );
        }

        Err(OrderError::Validation(format!(
            "could not allocate a unique tracking number for {} after {} attempts",
            carrier, MAX_ALLOCATION_ATTEMPTS
        )))
    }
}
