//! Lifecycle configuration loaded from environment variables.

use domain::{Money, PricingPolicy};
use rust_decimal::Decimal;

/// Checkout and processor settings with sensible defaults.
///
/// Reads from environment variables:
/// - `TAX_RATE`: tax rate applied to the subtotal (default: `0.08`)
/// - `FREE_SHIPPING_THRESHOLD_CENTS`: free shipping at or above this subtotal (default: `5000`)
/// - `FLAT_SHIPPING_FEE_CENTS`: shipping fee below the threshold (default: `599`)
/// - `CURRENCY`: currency code sent to the processor (default: `"usd"`)
/// - `CHECKOUT_SUCCESS_URL` / `CHECKOUT_CANCEL_URL`: processor redirects
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
    pub currency: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
}

impl LifecycleConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            tax_rate: lookup("TAX_RATE")
                .and_then(|v| v.parse().ok())
                .filter(|rate: &Decimal| !rate.is_sign_negative())
                .unwrap_or(defaults.tax_rate),
            free_shipping_threshold: lookup("FREE_SHIPPING_THRESHOLD_CENTS")
                .and_then(|v| v.parse().ok())
                .map(Money::from_cents)
                .unwrap_or(defaults.free_shipping_threshold),
            flat_shipping_fee: lookup("FLAT_SHIPPING_FEE_CENTS")
                .and_then(|v| v.parse().ok())
                .map(Money::from_cents)
                .unwrap_or(defaults.flat_shipping_fee),
            currency: lookup("CURRENCY").unwrap_or(defaults.currency),
            checkout_success_url: lookup("CHECKOUT_SUCCESS_URL")
                .unwrap_or(defaults.checkout_success_url),
            checkout_cancel_url: lookup("CHECKOUT_CANCEL_URL")
                .unwrap_or(defaults.checkout_cancel_url),
        }
    }

    /// Returns the pricing rules handed to the domain.
    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate: self.tax_rate,
            free_shipping_threshold: self.free_shipping_threshold,
            flat_shipping_fee: self.flat_shipping_fee,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let pricing = PricingPolicy::default();
        Self {
            tax_rate: pricing.tax_rate,
            free_shipping_threshold: pricing.free_shipping_threshold,
            flat_shipping_fee: pricing.flat_shipping_fee,
            currency: "usd".to_string(),
            checkout_success_url: "http://localhost:3000/checkout/success".to_string(),
            checkout_cancel_url: "http://localhost:3000/checkout/cancel".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = LifecycleConfig::default();
        assert_eq!(config.tax_rate, Decimal::new(8, 2));
        assert_eq!(config.free_shipping_threshold.cents(), 5000);
        assert_eq!(config.flat_shipping_fee.cents(), 599);
        assert_eq!(config.currency, "usd");
    }

    #[test]
    fn test_overrides() {
        let config = LifecycleConfig::from_lookup(lookup_from(&[
            ("TAX_RATE", "0.0625"),
            ("FREE_SHIPPING_THRESHOLD_CENTS", "7500"),
            ("CURRENCY", "cad"),
            ("CHECKOUT_SUCCESS_URL", "https://shop.example/paid"),
        ]));
        assert_eq!(config.tax_rate, Decimal::new(625, 4));
        assert_eq!(config.free_shipping_threshold.cents(), 7500);
        assert_eq!(config.flat_shipping_fee.cents(), 599);
        assert_eq!(config.currency, "cad");
        assert_eq!(config.checkout_success_url, "https://shop.example/paid");
        assert_eq!(config.checkout_cancel_url, "http://localhost:3000/checkout/cancel");
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = LifecycleConfig::from_lookup(lookup_from(&[
            ("TAX_RATE", "eight percent"),
            ("FLAT_SHIPPING_FEE_CENTS", "free"),
        ]));
        assert_eq!(config.tax_rate, Decimal::new(8, 2));
        assert_eq!(config.flat_shipping_fee.cents(), 599);
    }

    #[test]
    fn test_pricing_policy() {
        let policy = LifecycleConfig::default().pricing_policy();
        assert_eq!(policy, PricingPolicy::default());
    }
}
