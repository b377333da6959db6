//! Manually keyed card batches (OTC and EBT).

use async_trait::async_trait;
use domain::{CardSummary, Money, Order, PaymentMethod};

use super::{CaptureRequest, PaymentAdapter, PaymentOutcome, ensure_capturable};
use crate::error::{LifecycleError, Result};

const DEFAULT_HOLDER_NAME: &str = "Cardholder";
const MISSING_CARD_NUMBER: &str = "N/A";

/// One card of an offline batch, as keyed in by staff.
///
/// Entry is permissive: a blank holder name or card number does not reject
/// the batch. Only the amount has to be positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineCardEntry {
    pub holder_name: String,
    pub card_number: String,
    pub pin: Option<String>,
    pub amount: Money,
}

impl OfflineCardEntry {
    pub fn new(
        holder_name: impl Into<String>,
        card_number: impl Into<String>,
        pin: Option<String>,
        amount: Money,
    ) -> Self {
        Self {
            holder_name: holder_name.into(),
            card_number: card_number.into(),
            pin,
            amount,
        }
    }

    /// Returns the masked record stored on the order.
    ///
    /// The full number and the PIN never leave this method.
    pub fn summarize(&self) -> CardSummary {
        let holder_name = match self.holder_name.trim() {
            "" => DEFAULT_HOLDER_NAME.to_string(),
            name => name.to_string(),
        };

        let digits: Vec<char> = self
            .card_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let masked_number = if digits.len() >= 4 {
            let last_four: String = digits[digits.len() - 4..].iter().collect();
            format!("****{last_four}")
        } else {
            MISSING_CARD_NUMBER.to_string()
        };

        CardSummary {
            holder_name,
            masked_number,
            pin_provided: self.pin.as_deref().is_some_and(|pin| !pin.trim().is_empty()),
            amount: self.amount,
        }
    }
}

/// Settles an order from a batch of offline cards.
///
/// The batch total is measured against the outstanding balance: short of it
/// the payment goes partial, at or above it the order is paid.
#[derive(Debug, Clone, Copy)]
pub struct OfflineCardAdapter {
    rail: PaymentMethod,
}

impl OfflineCardAdapter {
    /// Over-the-counter benefit cards.
    pub fn otc() -> Self {
        Self {
            rail: PaymentMethod::OfflineCardOtc,
        }
    }

    /// EBT cards.
    pub fn ebt() -> Self {
        Self {
            rail: PaymentMethod::OfflineCardEbt,
        }
    }
}

#[async_trait]
impl PaymentAdapter for OfflineCardAdapter {
    fn rail(&self) -> PaymentMethod {
        self.rail
    }

    #[tracing::instrument(skip(self, order, request), fields(rail = %self.rail, cards = request.cards.len()))]
    async fn capture(&self, order: &Order, request: &CaptureRequest) -> Result<PaymentOutcome> {
        ensure_capturable(order)?;

        if request.cards.is_empty() {
            return Err(LifecycleError::PaymentRejected {
                reason: "no cards in batch".to_string(),
            });
        }

        if let Some(card) = request.cards.iter().find(|card| !card.amount.is_positive()) {
            return Err(LifecycleError::InvalidAmount {
                field: "card_amount",
                reason: format!("{} must be greater than zero", card.amount),
            });
        }

        let settled_amount: Money = request.cards.iter().map(|card| card.amount).sum();
        let balance = order.outstanding_balance();
        let is_full_settlement = settled_amount >= balance;

        tracing::debug!(%settled_amount, %balance, is_full_settlement, "offline batch totalled");

        Ok(PaymentOutcome {
            rail: self.rail,
            settled_amount,
            is_full_settlement,
            external_reference: None,
            cards: request.cards.iter().map(OfflineCardEntry::summarize).collect(),
            session: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_masks_number_and_pin() {
        let entry = OfflineCardEntry::new(
            "Maria Lopez",
            "6011 0000 0000 4242",
            Some("1234".to_string()),
            Money::from_cents(2500),
        );
        let summary = entry.summarize();

        assert_eq!(summary.holder_name, "Maria Lopez");
        assert_eq!(summary.masked_number, "****4242");
        assert!(summary.pin_provided);
        assert_eq!(summary.amount.cents(), 2500);
    }

    #[test]
    fn test_summary_fills_permissive_defaults() {
        let entry = OfflineCardEntry::new("  ", "", Some(" ".to_string()), Money::from_cents(100));
        let summary = entry.summarize();

        assert_eq!(summary.holder_name, "Cardholder");
        assert_eq!(summary.masked_number, "N/A");
        assert!(!summary.pin_provided);
    }

    #[test]
    fn test_short_card_number_is_not_masked() {
        let entry = OfflineCardEntry::new("Lee", "12", None, Money::from_cents(100));
        assert_eq!(entry.summarize().masked_number, "N/A");
    }

    #[test]
    fn test_rails() {
        assert_eq!(OfflineCardAdapter::otc().rail(), PaymentMethod::OfflineCardOtc);
        assert_eq!(OfflineCardAdapter::ebt().rail(), PaymentMethod::OfflineCardEbt);
    }
}
