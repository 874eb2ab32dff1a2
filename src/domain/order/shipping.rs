use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use std::collections::HashSet;

use super::value_objects::{Address, ShippingMethod};

// ============================================================================
// Shipping Policy - Estimated delivery
// ============================================================================
//
// estimate = shipped + lead days(method)
//          + surcharge days when the destination region is remote
//          then rolled forward to Monday if it lands on a weekend
//
// ============================================================================

pub const REMOTE_SURCHARGE_DAYS: i64 = 2;

#[derive(Debug, Clone)]
pub struct ShippingPolicy {
    /// Lower-cased region names
    remote_regions: HashSet<String>,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self::new(["Turkana", "Mandera", "Wajir", "Marsabit", "Garissa"])
    }
}

impl ShippingPolicy {
    pub fn new<I, S>(remote_regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            remote_regions: remote_regions
                .into_iter()
                .map(|region| region.as_ref().trim().to_lowercase())
                .filter(|region| !region.is_empty())
                .collect(),
        }
    }

    pub fn is_remote(&self, address: &Address) -> bool {
        self.remote_regions
            .contains(&address.region.trim().to_lowercase())
    }

    pub fn estimate_delivery(
        &self,
        shipped_at: DateTime<Utc>,
        method: ShippingMethod,
        destination: &Address,
    ) -> DateTime<Utc> {
        let mut days = method.lead_days();
        if self.is_remote(destination) {
            days += REMOTE_SURCHARGE_DAYS;
        }

        let estimate = shipped_at + Duration::days(days);
        match estimate.weekday() {
            Weekday::Sat => estimate + Duration::days(2),
            Weekday::Sun => estimate + Duration::days(1),
            _ => estimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn address(region: &str) -> Address {
        Address {
            full_name: "Halima Abdi".to_string(),
            phone: "+254733000444".to_string(),
            street: "Main Street".to_string(),
            city: "Town".to_string(),
            region: region.to_string(),
            postal_code: None,
            country: "KE".to_string(),
        }
    }

    // 2024-06-03 is a Monday
    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_express_lands_midweek() {
        let policy = ShippingPolicy::default();
        let eta = policy.estimate_delivery(monday(), ShippingMethod::Express, &address("Nairobi"));

        assert_eq!(eta, monday() + Duration::days(2));
        assert_eq!(eta.weekday(), Weekday::Wed);
    }

    #[test]
    fn test_saturday_rolls_to_monday() {
        let policy = ShippingPolicy::default();
        let eta = policy.estimate_delivery(monday(), ShippingMethod::Standard, &address("Nairobi"));

        // Monday + 5 is Saturday, pushed two days
        assert_eq!(eta, monday() + Duration::days(7));
        assert_eq!(eta.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_sunday_rolls_to_monday() {
        let friday = monday() + Duration::days(4);
        let policy = ShippingPolicy::default();
        let eta = policy.estimate_delivery(friday, ShippingMethod::Express, &address("Nairobi"));

        assert_eq!(eta, friday + Duration::days(3));
        assert_eq!(eta.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_remote_region_adds_surcharge_case_insensitively() {
        let policy = ShippingPolicy::default();
        let eta = policy.estimate_delivery(monday(), ShippingMethod::Express, &address(" turkana "));

        assert!(policy.is_remote(&address("MANDERA")));
        assert_eq!(eta, monday() + Duration::days(4));
        assert_eq!(eta.weekday(), Weekday::Fri);
    }
}
