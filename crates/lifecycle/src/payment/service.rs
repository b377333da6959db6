//! Rail dispatch for payment capture.

use std::collections::HashMap;
use std::sync::Arc;

use common::{OrderId, Version};
use domain::{Actor, Order, PaymentMethod};
use store::OrderStore;

use super::{
    CaptureRequest, OfflineCardAdapter, PaymentAdapter, PaymentOutcome, ProcessorAdapter,
};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::reconciliation::Reconciler;
use crate::services::PaymentProcessor;

/// The order after a capture, with what the adapter reported.
#[derive(Debug)]
pub struct CaptureResult {
    pub order: Order,
    pub outcome: PaymentOutcome,
    pub new_version: Version,
}

/// Routes capture requests to the adapter for their rail and hands the
/// outcome to the reconciler.
pub struct PaymentService<S: OrderStore> {
    reconciler: Reconciler<S>,
    adapters: HashMap<PaymentMethod, Arc<dyn PaymentAdapter>>,
}

impl<S: OrderStore> PaymentService<S> {
    /// Creates a service with no adapters registered.
    pub fn new(reconciler: Reconciler<S>) -> Self {
        Self {
            reconciler,
            adapters: HashMap::new(),
        }
    }

    /// Creates a service serving all three rails.
    pub fn standard<P>(reconciler: Reconciler<S>, processor: P, config: &LifecycleConfig) -> Self
    where
        P: PaymentProcessor + 'static,
    {
        Self::new(reconciler)
            .with_adapter(ProcessorAdapter::new(processor, config))
            .with_adapter(OfflineCardAdapter::otc())
            .with_adapter(OfflineCardAdapter::ebt())
    }

    /// Registers an adapter, replacing any earlier one for the same rail.
    pub fn with_adapter(mut self, adapter: impl PaymentAdapter + 'static) -> Self {
        self.adapters.insert(adapter.rail(), Arc::new(adapter));
        self
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    /// Collects payment for an order on the requested rail.
    ///
    /// Offline batches settle immediately; a processor capture only opens a
    /// session and leaves the payment pending until the webhook arrives.
    #[tracing::instrument(skip(self, request), fields(rail = %request.rail))]
    pub async fn capture(
        &self,
        order_id: OrderId,
        request: CaptureRequest,
        actor: Actor,
    ) -> Result<CaptureResult> {
        let adapter = self.adapters.get(&request.rail).ok_or_else(|| {
            LifecycleError::PaymentRejected {
                reason: format!("{} payments are not accepted", request.rail),
            }
        })?;

        let order = self.reconciler.handler().load(order_id).await?;
        let outcome = adapter.capture(&order, &request).await?;
        let result = self
            .reconciler
            .apply_outcome(order, &outcome, actor)
            .await?;

        metrics::counter!(
            "payments_captured_total",
            "rail" => request.rail.as_str(),
            "settlement" => outcome.settlement()
        )
        .increment(1);

        tracing::info!(
            settlement = outcome.settlement(),
            settled_amount = %outcome.settled_amount,
            payment_status = %result.order.payment_status(),
            "payment captured"
        );

        Ok(CaptureResult {
            order: result.order,
            outcome,
            new_version: result.new_version,
        })
    }
}
