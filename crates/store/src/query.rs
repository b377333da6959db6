use common::UserId;
use domain::{FulfillmentStatus, Order, PaymentStatus};

/// Builder for filtering stored orders.
///
/// Results are returned newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    /// Filter by fulfillment status.
    pub status: Option<FulfillmentStatus>,

    /// Filter by payment status.
    pub payment_status: Option<PaymentStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: FulfillmentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the order passes every filter that is set.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id() != Some(user_id)
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        if let Some(payment_status) = self.payment_status
            && order.payment_status() != payment_status
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let user = UserId::new();
        let query = OrderQuery::for_user(user)
            .status(FulfillmentStatus::Pending)
            .payment_status(PaymentStatus::Partial)
            .limit(10)
            .offset(20);

        assert_eq!(query.user_id, Some(user));
        assert_eq!(query.status, Some(FulfillmentStatus::Pending));
        assert_eq!(query.payment_status, Some(PaymentStatus::Partial));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
    }

    #[test]
    fn test_empty_query_matches_unplaced_order() {
        assert!(OrderQuery::new().matches(&Order::default()));
        assert!(!OrderQuery::for_user(UserId::new()).matches(&Order::default()));
    }
}
