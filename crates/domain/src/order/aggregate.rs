//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderNumber, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    Actor, Address, CardSummary, FulfillmentStatus, LineItem, Money, OrderError, OrderEvent,
    OrderTotals, PaymentMethod, PaymentRecord, PaymentState, PaymentStatus, StatusHistoryEntry,
    events::{
        FulfillmentAdvancedData, OrderCancelledData, OrderPlacedData, PaymentCompletedData,
        PaymentReceivedData, PaymentRefundedData,
    },
};

/// Everything checkout has decided about a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub shipping_address: Address,
    /// Defaults to the shipping address when absent.
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub actor: Actor,
}

/// Order aggregate root.
///
/// Payment fields change only through the payment commands and fulfillment
/// fields only through [`Order::advance`] and [`Order::cancel`]. Every state
/// change appends to `status_history`; nothing ever removes from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    order_number: Option<OrderNumber>,
    user_id: Option<UserId>,
    items: Vec<LineItem>,
    totals: OrderTotals,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    payment: PaymentState,
    status: FulfillmentStatus,
    status_history: Vec<StatusHistoryEntry>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    tracking_number: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,

    /// Set when money arrived after the order was cancelled.
    #[serde(default)]
    refund_required: bool,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;
    type Id = OrderId;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<OrderId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::CheckoutSessionOpened(data) => {
                self.payment.checkout_session_id = Some(data.session_id);
                self.payment.checkout_session_amount = Some(data.amount);
                self.updated_at = Some(data.opened_at);
            }
            OrderEvent::PaymentReceived(data) => self.apply_payment_received(data),
            OrderEvent::PaymentCompleted(data) => self.apply_payment_completed(data),
            OrderEvent::PaymentFailed(data) => {
                self.payment.status = PaymentStatus::Failed;
                self.record_history(
                    data.failed_at,
                    format!("Payment failed: {}", data.reason),
                    data.actor,
                );
            }
            OrderEvent::PaymentRequested(data) => {
                self.payment.requested_payment_amount = Some(data.amount);
                self.payment.requested_payment_at = Some(data.requested_at);
                self.updated_at = Some(data.requested_at);
            }
            OrderEvent::PaymentRequestCleared(data) => {
                self.payment.requested_payment_amount = None;
                self.payment.requested_payment_at = None;
                self.updated_at = Some(data.cleared_at);
            }
            OrderEvent::FulfillmentAdvanced(data) => self.apply_fulfillment_advanced(data),
            OrderEvent::OrderCancelled(data) => self.apply_order_cancelled(data),
            OrderEvent::PaymentRefunded(data) => self.apply_payment_refunded(data),
        }
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn total_amount(&self) -> Money {
        self.totals.total_amount
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn payment(&self) -> &PaymentState {
        &self.payment
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment.status
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment.method
    }

    /// Returns the fulfillment status.
    pub fn status(&self) -> FulfillmentStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Returns true if a payment landed on the order after it was cancelled.
    pub fn refund_required(&self) -> bool {
        self.refund_required
    }

    /// Returns true once the order has been placed.
    pub fn is_placed(&self) -> bool {
        self.id.is_some()
    }

    /// Returns the amount a new capture is measured against.
    ///
    /// `remaining_amount` while partial, nothing once settled, otherwise the
    /// order total less anything already paid.
    pub fn outstanding_balance(&self) -> Money {
        match self.payment.status {
            PaymentStatus::Partial => self.payment.remaining_amount,
            status if status.is_settled() => Money::zero(),
            _ => self
                .totals
                .total_amount
                .saturating_sub(self.payment.amount_paid),
        }
    }

    /// Returns the charge of the stored session when `reference` names it
    /// (or names nothing).
    fn session_amount(&self, reference: Option<&str>) -> Option<Money> {
        let session_id = self.payment.checkout_session_id.as_deref()?;
        if reference.is_some_and(|r| r != session_id) {
            return None;
        }
        self.payment
            .checkout_session_amount
            .filter(|amount| amount.is_positive())
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order in `pending/pending`.
    pub fn place(&self, new: NewOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }

        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let line_sum: Money = new.items.iter().map(|item| item.line_subtotal).sum();
        if line_sum != new.totals.subtotal {
            return Err(OrderError::TotalsMismatch {
                expected: line_sum,
                actual: new.totals.subtotal,
            });
        }

        if !new.totals.is_balanced() {
            return Err(OrderError::TotalsMismatch {
                expected: new.totals.expected_total(),
                actual: new.totals.total_amount,
            });
        }

        let billing_address = new
            .billing_address
            .unwrap_or_else(|| new.shipping_address.clone());

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: new.order_id,
            order_number: new.order_number,
            user_id: new.user_id,
            items: new.items,
            totals: new.totals,
            shipping_address: new.shipping_address,
            billing_address,
            payment_method: new.payment_method,
            notes: new.notes,
            actor: new.actor,
            placed_at: Utc::now(),
        })])
    }

    /// Records a hosted checkout session opened for this order.
    pub fn open_checkout_session(
        &self,
        session_id: impl Into<String>,
        amount: Money,
        is_remaining_payment: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_accepts_capture()?;

        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount {
                field: "session_amount",
                amount,
            });
        }

        Ok(vec![OrderEvent::checkout_session_opened(
            session_id,
            amount,
            is_remaining_payment,
        )])
    }

    /// Applies a synchronous capture of `amount` against the outstanding
    /// balance.
    ///
    /// Short of the balance the payment goes `partial`; at or above it the
    /// payment completes and a pending order is confirmed.
    pub fn receive_payment(
        &self,
        rail: PaymentMethod,
        amount: Money,
        reference: Option<String>,
        cards: Vec<CardSummary>,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount {
                field: "payment_amount",
                amount,
            });
        }

        self.ensure_accepts_capture()?;

        let balance = self.outstanding_balance();
        let now = Utc::now();

        if amount >= balance {
            return Ok(vec![OrderEvent::PaymentCompleted(PaymentCompletedData {
                rail,
                amount,
                reference,
                payment_intent_id: None,
                cards,
                was_remaining_payment: self.payment.status == PaymentStatus::Partial,
                actor,
                completed_at: now,
            })]);
        }

        Ok(vec![OrderEvent::PaymentReceived(PaymentReceivedData {
            rail,
            amount,
            reference,
            cards,
            remaining_amount: balance - amount,
            actor,
            received_at: now,
        })])
    }

    /// Settles the payment, as reported by the processor.
    ///
    /// The recorded amount is what the confirmed session charged, which can
    /// be less than the balance for a custom-amount session; without a
    /// matching session it is the outstanding balance. Either way the
    /// payment completes. Returns no events when the payment is already settled, so a replayed
    /// confirmation changes nothing. A cancelled order still records the
    /// money and is flagged for a manual refund.
    pub fn settle_in_full(
        &self,
        rail: PaymentMethod,
        reference: Option<String>,
        payment_intent_id: Option<String>,
        remaining_payment: bool,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if self.payment.status.is_settled() {
            return Ok(vec![]);
        }

        if !self.payment.status.accepts_capture() {
            return Err(OrderError::PaymentNotAccepted {
                status: self.payment.status,
            });
        }

        let was_remaining_payment = remaining_payment
            || (self.payment.status == PaymentStatus::Partial
                && self.payment.remaining_amount.is_positive());

        let amount = self
            .session_amount(reference.as_deref())
            .unwrap_or_else(|| self.outstanding_balance());

        Ok(vec![OrderEvent::PaymentCompleted(PaymentCompletedData {
            rail,
            amount,
            reference,
            payment_intent_id,
            cards: Vec::new(),
            was_remaining_payment,
            actor,
            completed_at: Utc::now(),
        })])
    }

    /// Marks a pending payment as failed.
    ///
    /// Only `pending` can fail: a failure report for a partial, settled or
    /// already failed payment produces no events.
    pub fn fail_payment(
        &self,
        reason: impl Into<String>,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if self.payment.status != PaymentStatus::Pending {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::payment_failed(reason, actor)])
    }

    /// Records an admin request for an additional payment.
    pub fn request_payment(
        &self,
        amount: Money,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if self.status == FulfillmentStatus::Cancelled {
            return Err(OrderError::OrderCancelled);
        }

        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount {
                field: "requested_payment_amount",
                amount,
            });
        }

        Ok(vec![OrderEvent::payment_requested(amount, actor)])
    }

    /// Withdraws an outstanding payment request.
    pub fn clear_payment_request(&self, actor: Actor) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if self.payment.requested_payment_amount.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::payment_request_cleared(actor)])
    }

    /// Moves fulfillment forward along the allowed-transition table.
    pub fn advance(
        &self,
        to: FulfillmentStatus,
        note: Option<String>,
        tracking_number: Option<String>,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        match to {
            FulfillmentStatus::Confirmed => return Err(OrderError::ConfirmationRequiresPayment),
            FulfillmentStatus::Cancelled | FulfillmentStatus::Pending => {
                return Err(OrderError::InvalidTransition {
                    from: self.status,
                    to,
                });
            }
            _ => {}
        }

        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        Ok(vec![OrderEvent::fulfillment_advanced(
            to,
            note,
            tracking_number,
            actor,
        )])
    }

    /// Cancels the order. Only `pending` and `confirmed` orders can be cancelled.
    pub fn cancel(
        &self,
        reason: impl Into<String>,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        if !self.status.is_cancellable() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: FulfillmentStatus::Cancelled,
            });
        }

        Ok(vec![OrderEvent::order_cancelled(reason, actor)])
    }

    /// Refunds part or all of the captured amount.
    pub fn refund(
        &self,
        amount: Money,
        reason: impl Into<String>,
        actor: Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;

        let refundable = self
            .payment
            .amount_paid
            .saturating_sub(self.payment.refunded_amount);

        if !amount.is_positive() || amount > refundable {
            return Err(OrderError::InvalidAmount {
                field: "refund_amount",
                amount,
            });
        }

        let fully_refunded = amount == refundable;
        let to = if fully_refunded {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefund
        };

        if !self.payment.status.can_transition_to(to) {
            return Err(OrderError::InvalidPaymentTransition {
                from: self.payment.status,
                to,
            });
        }

        Ok(vec![OrderEvent::payment_refunded(
            amount,
            fully_refunded,
            reason,
            actor,
        )])
    }

    fn ensure_placed(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        Ok(())
    }

    fn ensure_accepts_capture(&self) -> Result<(), OrderError> {
        self.ensure_placed()?;

        if self.status == FulfillmentStatus::Cancelled {
            return Err(OrderError::OrderCancelled);
        }

        if !self.payment.status.accepts_capture() {
            return Err(OrderError::PaymentNotAccepted {
                status: self.payment.status,
            });
        }

        Ok(())
    }
}

// Apply event helpers
impl Order {
    fn record_history(&mut self, at: DateTime<Utc>, note: impl Into<String>, actor: Actor) {
        self.status_history.push(StatusHistoryEntry::new(
            self.status,
            self.payment.status,
            at,
            note,
            actor,
        ));
        self.updated_at = Some(at);
    }

    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.user_id = Some(data.user_id);
        self.items = data.items;
        self.totals = data.totals;
        self.shipping_address = Some(data.shipping_address);
        self.billing_address = Some(data.billing_address);
        self.payment = PaymentState {
            method: data.payment_method,
            ..PaymentState::default()
        };
        self.status = FulfillmentStatus::Pending;
        self.notes = data.notes;
        self.created_at = Some(data.placed_at);
        self.record_history(data.placed_at, "Order created", data.actor);
    }

    fn apply_payment_received(&mut self, data: PaymentReceivedData) {
        self.payment.status = PaymentStatus::Partial;
        self.payment.amount_paid += data.amount;
        self.payment.partial_payment_amount += data.amount;
        self.payment.remaining_amount = data.remaining_amount;
        self.payment.records.push(PaymentRecord {
            rail: data.rail,
            amount: data.amount,
            reference: data.reference,
            cards: data.cards,
            recorded_at: data.received_at,
        });

        let note = format!(
            "Partial payment of {} received via {}; {} remaining",
            data.amount, data.rail, data.remaining_amount
        );
        self.record_history(data.received_at, note, data.actor);
    }

    fn apply_payment_completed(&mut self, data: PaymentCompletedData) {
        self.payment.status = PaymentStatus::Completed;
        self.payment.amount_paid += data.amount;
        self.payment.remaining_amount = Money::zero();
        self.payment.paid_at = Some(data.completed_at);
        self.payment.requested_payment_amount = None;
        self.payment.requested_payment_at = None;
        if data.payment_intent_id.is_some() {
            self.payment.payment_intent_id = data.payment_intent_id;
        }
        self.payment.records.push(PaymentRecord {
            rail: data.rail,
            amount: data.amount,
            reference: data.reference,
            cards: data.cards,
            recorded_at: data.completed_at,
        });

        let note = match self.status {
            FulfillmentStatus::Cancelled => {
                self.refund_required = true;
                format!(
                    "Payment of {} received after cancellation; refund required",
                    data.amount
                )
            }
            FulfillmentStatus::Pending => {
                self.status = FulfillmentStatus::Confirmed;
                if data.was_remaining_payment {
                    format!("Remaining payment of {} completed via {}", data.amount, data.rail)
                } else {
                    format!("Payment of {} completed via {}", data.amount, data.rail)
                }
            }
            _ => format!("Payment of {} completed via {}", data.amount, data.rail),
        };
        self.record_history(data.completed_at, note, data.actor);
    }

    fn apply_fulfillment_advanced(&mut self, data: FulfillmentAdvancedData) {
        self.status = data.to;
        match data.to {
            FulfillmentStatus::Shipped => self.shipped_at = Some(data.advanced_at),
            FulfillmentStatus::Delivered => self.delivered_at = Some(data.advanced_at),
            _ => {}
        }
        if data.tracking_number.is_some() {
            self.tracking_number = data.tracking_number;
        }

        let note = data
            .note
            .unwrap_or_else(|| format!("Order {}", data.to));
        self.record_history(data.advanced_at, note, data.actor);
    }

    fn apply_order_cancelled(&mut self, data: OrderCancelledData) {
        self.status = FulfillmentStatus::Cancelled;
        self.cancelled_at = Some(data.cancelled_at);
        self.cancellation_reason = Some(data.reason.clone());
        self.record_history(data.cancelled_at, data.reason, data.actor);
    }

    fn apply_payment_refunded(&mut self, data: PaymentRefundedData) {
        self.payment.refunded_amount += data.amount;
        self.payment.status = if data.fully_refunded {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefund
        };
        self.refund_required = false;

        let note = format!("Refunded {}: {}", data.amount, data.reason);
        self.record_history(data.refunded_at, note, data.actor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregate, DomainEvent};
    use crate::order::PricingPolicy;

    fn address() -> Address {
        Address {
            full_name: "Grace Hopper".to_string(),
            street: "1 Navy Way".to_string(),
            apartment: None,
            city: "Arlington".to_string(),
            state: "VA".to_string(),
            zip_code: "22202".to_string(),
            country: "US".to_string(),
            phone: None,
        }
    }

    fn new_order(price_cents: i64, quantity: u32) -> NewOrder {
        let items = vec![
            LineItem::snapshot(
                "SKU-001",
                "Oat Milk",
                Some("dairy".to_string()),
                Money::from_cents(price_cents),
                quantity,
                None,
            )
            .unwrap(),
        ];
        let totals = PricingPolicy::default()
            .price(&items, Money::zero(), Money::zero())
            .unwrap();
        NewOrder {
            order_id: OrderId::new(),
            order_number: OrderNumber::new("ORD-1-0001"),
            user_id: UserId::new(),
            items,
            totals,
            shipping_address: address(),
            billing_address: None,
            payment_method: PaymentMethod::OfflineCardOtc,
            notes: None,
            actor: Actor::System,
        }
    }

    fn placed_order() -> Order {
        let mut order = Order::default();
        let events = order.place(new_order(1000, 2)).unwrap();
        order.apply_events(events);
        order
    }

    fn confirmed_order() -> Order {
        let mut order = placed_order();
        let events = order
            .settle_in_full(
                PaymentMethod::ProcessorCard,
                Some("cs_1".to_string()),
                Some("pi_1".to_string()),
                false,
                Actor::Processor,
            )
            .unwrap();
        order.apply_events(events);
        order
    }

    #[test]
    fn test_place_order() {
        let order = placed_order();
        assert!(order.is_placed());
        assert_eq!(order.status(), FulfillmentStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.status_history().len(), 1);
        assert_eq!(
            order.status_history()[0].note.as_deref(),
            Some("Order created")
        );
        assert_eq!(order.billing_address(), order.shipping_address());
        assert_eq!(order.outstanding_balance(), order.total_amount());
    }

    #[test]
    fn test_place_twice_fails() {
        let order = placed_order();
        assert_eq!(
            order.place(new_order(1000, 1)),
            Err(OrderError::AlreadyPlaced)
        );
    }

    #[test]
    fn test_place_rejects_tampered_totals() {
        let mut new = new_order(1000, 1);
        new.totals.total_amount = Money::from_cents(1);
        let result = Order::default().place(new);
        assert!(matches!(result, Err(OrderError::TotalsMismatch { .. })));

        let mut new = new_order(1000, 1);
        new.totals.subtotal = Money::from_cents(1);
        let result = Order::default().place(new);
        assert!(matches!(result, Err(OrderError::TotalsMismatch { .. })));
    }

    #[test]
    fn test_place_without_items_fails() {
        let mut new = new_order(1000, 1);
        new.items.clear();
        assert_eq!(Order::default().place(new), Err(OrderError::NoItems));
    }

    #[test]
    fn test_commands_require_placed_order() {
        let order = Order::default();
        assert_eq!(
            order.cancel("nope", Actor::System),
            Err(OrderError::NotPlaced)
        );
        assert_eq!(
            order.fail_payment("nope", Actor::System),
            Err(OrderError::NotPlaced)
        );
    }

    #[test]
    fn test_short_payment_goes_partial() {
        let mut order = placed_order();
        let total = order.total_amount();
        let events = order
            .receive_payment(
                PaymentMethod::OfflineCardOtc,
                Money::from_cents(1000),
                None,
                vec![],
                Actor::Admin("kim".to_string()),
            )
            .unwrap();
        assert_eq!(events[0].event_type(), "PaymentReceived");
        order.apply_events(events);

        assert_eq!(order.payment_status(), PaymentStatus::Partial);
        assert_eq!(order.status(), FulfillmentStatus::Pending);
        assert_eq!(order.payment().partial_payment_amount.cents(), 1000);
        assert_eq!(order.payment().remaining_amount, total - Money::from_cents(1000));
        assert_eq!(order.outstanding_balance(), order.payment().remaining_amount);
        assert_eq!(order.payment().records.len(), 1);
    }

    #[test]
    fn test_covering_payment_confirms_order() {
        let mut order = placed_order();
        let total = order.total_amount();
        order.apply_events(
            order
                .receive_payment(PaymentMethod::OfflineCardEbt, total, None, vec![], Actor::System)
                .unwrap(),
        );

        assert_eq!(order.payment_status(), PaymentStatus::Completed);
        assert_eq!(order.status(), FulfillmentStatus::Confirmed);
        assert!(order.payment().paid_at.is_some());
        assert!(order.payment().remaining_amount.is_zero());
        assert_eq!(order.status_history().len(), 2);
    }

    #[test]
    fn test_capture_rejected_after_completion() {
        let order = confirmed_order();
        let result = order.receive_payment(
            PaymentMethod::OfflineCardOtc,
            Money::from_cents(100),
            None,
            vec![],
            Actor::System,
        );
        assert_eq!(
            result,
            Err(OrderError::PaymentNotAccepted {
                status: PaymentStatus::Completed
            })
        );
    }

    #[test]
    fn test_settle_in_full_is_noop_when_settled() {
        let order = confirmed_order();
        let events = order
            .settle_in_full(PaymentMethod::ProcessorCard, None, None, false, Actor::Processor)
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_settle_after_partial_marks_remaining_payment() {
        let mut order = placed_order();
        order.apply_events(
            order
                .receive_payment(
                    PaymentMethod::OfflineCardOtc,
                    Money::from_cents(500),
                    None,
                    vec![],
                    Actor::System,
                )
                .unwrap(),
        );
        let remaining = order.payment().remaining_amount;

        let events = order
            .settle_in_full(PaymentMethod::ProcessorCard, None, None, false, Actor::Processor)
            .unwrap();
        match &events[0] {
            OrderEvent::PaymentCompleted(data) => {
                assert!(data.was_remaining_payment);
                assert_eq!(data.amount, remaining);
            }
            other => panic!("unexpected event {}", other.event_type()),
        }
        order.apply_events(events);

        assert_eq!(order.payment().amount_paid, order.total_amount());
        assert_eq!(order.status(), FulfillmentStatus::Confirmed);
    }

    #[test]
    fn test_settlement_records_session_charge() {
        let mut order = placed_order();
        order.apply_events(
            order
                .open_checkout_session("cs_1", Money::from_cents(700), false)
                .unwrap(),
        );
        assert_eq!(order.payment().checkout_session_amount, Some(Money::from_cents(700)));

        // A confirmation for some other session falls back to the balance
        let other = order
            .settle_in_full(
                PaymentMethod::ProcessorCard,
                Some("cs_other".to_string()),
                None,
                false,
                Actor::Processor,
            )
            .unwrap();
        match &other[0] {
            OrderEvent::PaymentCompleted(data) => assert_eq!(data.amount, order.total_amount()),
            other => panic!("unexpected event {}", other.event_type()),
        }

        order.apply_events(
            order
                .settle_in_full(
                    PaymentMethod::ProcessorCard,
                    Some("cs_1".to_string()),
                    None,
                    false,
                    Actor::Processor,
                )
                .unwrap(),
        );
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
        assert_eq!(order.payment().amount_paid, Money::from_cents(700));
        assert_eq!(order.payment().records[0].amount, Money::from_cents(700));
    }

    #[test]
    fn test_settlement_after_cancellation_is_flagged() {
        let mut order = placed_order();
        order.apply_events(order.cancel("Changed mind", Actor::System).unwrap());
        order.apply_events(
            order
                .settle_in_full(PaymentMethod::ProcessorCard, None, None, false, Actor::Processor)
                .unwrap(),
        );

        assert_eq!(order.status(), FulfillmentStatus::Cancelled);
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
        assert!(order.refund_required());
    }

    #[test]
    fn test_fail_only_from_pending() {
        let mut order = placed_order();
        order.apply_events(order.fail_payment("expired", Actor::Processor).unwrap());
        assert_eq!(order.payment_status(), PaymentStatus::Failed);
        assert_eq!(order.status(), FulfillmentStatus::Pending);

        // Already failed
        assert!(order.fail_payment("expired", Actor::Processor).unwrap().is_empty());

        // Failed payments can still be retried
        assert_eq!(order.outstanding_balance(), order.total_amount());
        order.apply_events(
            order
                .settle_in_full(PaymentMethod::ProcessorCard, None, None, false, Actor::Processor)
                .unwrap(),
        );
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
        assert!(order.fail_payment("late", Actor::Processor).unwrap().is_empty());
    }

    #[test]
    fn test_payment_request_does_not_touch_history() {
        let mut order = placed_order();
        let history_len = order.status_history().len();

        order.apply_events(
            order
                .request_payment(Money::from_cents(700), Actor::Admin("kim".to_string()))
                .unwrap(),
        );
        assert_eq!(
            order.payment().requested_payment_amount,
            Some(Money::from_cents(700))
        );
        assert!(order.payment().requested_payment_at.is_some());

        order.apply_events(order.clear_payment_request(Actor::System).unwrap());
        assert_eq!(order.payment().requested_payment_amount, None);
        assert!(order.clear_payment_request(Actor::System).unwrap().is_empty());
        assert_eq!(order.status_history().len(), history_len);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn test_advance_through_fulfillment() {
        let mut order = confirmed_order();
        let staff = Actor::Admin("lee".to_string());

        order.apply_events(
            order
                .advance(FulfillmentStatus::Processing, None, None, staff.clone())
                .unwrap(),
        );
        order.apply_events(
            order
                .advance(
                    FulfillmentStatus::Shipped,
                    Some("Left the warehouse".to_string()),
                    Some("1Z999".to_string()),
                    staff.clone(),
                )
                .unwrap(),
        );
        assert_eq!(order.tracking_number(), Some("1Z999"));
        assert!(order.shipped_at().is_some());

        order.apply_events(
            order
                .advance(FulfillmentStatus::Delivered, None, None, staff)
                .unwrap(),
        );
        assert_eq!(order.status(), FulfillmentStatus::Delivered);
        assert!(order.delivered_at().is_some());
        assert_eq!(order.status_history().len(), 5);
    }

    #[test]
    fn test_advance_cannot_confirm_or_skip() {
        let order = placed_order();
        assert_eq!(
            order.advance(FulfillmentStatus::Confirmed, None, None, Actor::System),
            Err(OrderError::ConfirmationRequiresPayment)
        );
        assert!(matches!(
            order.advance(FulfillmentStatus::Shipped, None, None, Actor::System),
            Err(OrderError::InvalidTransition { .. })
        ));
        assert!(matches!(
            order.advance(FulfillmentStatus::Cancelled, None, None, Actor::System),
            Err(OrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_appends_one_entry() {
        let mut order = confirmed_order();
        let before = order.status_history().len();
        order.apply_events(order.cancel("Out of delivery area", Actor::System).unwrap());

        assert_eq!(order.status(), FulfillmentStatus::Cancelled);
        assert_eq!(order.status_history().len(), before + 1);
        let last = order.status_history().last().unwrap();
        assert_eq!(last.status, FulfillmentStatus::Cancelled);
        assert_eq!(last.note.as_deref(), Some("Out of delivery area"));
        assert_eq!(order.cancellation_reason(), Some("Out of delivery area"));
    }

    #[test]
    fn test_cannot_cancel_processing_order() {
        let mut order = confirmed_order();
        order.apply_events(
            order
                .advance(FulfillmentStatus::Processing, None, None, Actor::System)
                .unwrap(),
        );
        assert_eq!(
            order.cancel("Too late", Actor::System),
            Err(OrderError::InvalidTransition {
                from: FulfillmentStatus::Processing,
                to: FulfillmentStatus::Cancelled,
            })
        );
    }

    #[test]
    fn test_refunds() {
        let mut order = confirmed_order();
        let paid = order.payment().amount_paid;

        assert!(matches!(
            order.refund(paid + Money::from_cents(1), "too much", Actor::System),
            Err(OrderError::InvalidAmount { .. })
        ));

        order.apply_events(
            order
                .refund(Money::from_cents(100), "Bruised apples", Actor::System)
                .unwrap(),
        );
        assert_eq!(order.payment_status(), PaymentStatus::PartialRefund);

        let rest = paid - Money::from_cents(100);
        order.apply_events(order.refund(rest, "Order lost", Actor::System).unwrap());
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        assert_eq!(order.payment().refunded_amount, paid);
    }

    #[test]
    fn test_refund_requires_settled_payment() {
        let mut order = placed_order();
        order.apply_events(
            order
                .receive_payment(
                    PaymentMethod::OfflineCardOtc,
                    Money::from_cents(100),
                    None,
                    vec![],
                    Actor::System,
                )
                .unwrap(),
        );
        assert_eq!(
            order.refund(Money::from_cents(50), "oops", Actor::System),
            Err(OrderError::InvalidPaymentTransition {
                from: PaymentStatus::Partial,
                to: PaymentStatus::PartialRefund,
            })
        );
    }

    #[test]
    fn test_document_round_trip_keeps_history() {
        let order = confirmed_order();
        let json = serde_json::to_string(&order).unwrap();
        let restored: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id(), order.id());
        assert_eq!(restored.status_history(), order.status_history());
        assert_eq!(restored.payment(), order.payment());
    }
}
