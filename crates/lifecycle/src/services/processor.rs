//! Hosted payment processor boundary.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::Money;

use crate::error::{LifecycleError, Result};

/// Everything the processor needs to open a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque key/value pairs echoed back on every webhook for the session.
    pub metadata: HashMap<String, String>,
}

/// A session created by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSession {
    pub id: String,
    pub url: String,
}

/// Hosted checkout processor.
///
/// Signature verification of inbound webhooks happens at the HTTP boundary,
/// before events reach the reconciler.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_session(&self, request: SessionRequest) -> Result<ProcessorSession>;
}

#[derive(Debug, Default)]
struct InMemoryProcessorState {
    sessions: Vec<(ProcessorSession, SessionRequest)>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory processor for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProcessor {
    state: Arc<RwLock<InMemoryProcessorState>>,
}

impl InMemoryPaymentProcessor {
    /// Creates a new in-memory processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the processor to refuse new sessions.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_create = fail;
    }

    /// Returns the number of sessions created.
    pub fn session_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .len()
    }

    /// Returns the request that created the given session.
    pub fn request_for(&self, session_id: &str) -> Option<SessionRequest> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .iter()
            .find(|(session, _)| session.id == session_id)
            .map(|(_, request)| request.clone())
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryPaymentProcessor {
    async fn create_session(&self, request: SessionRequest) -> Result<ProcessorSession> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_create {
            return Err(LifecycleError::collaborator(
                "processor",
                "session creation declined",
            ));
        }

        state.next_id += 1;
        let id = format!("cs_test_{:04}", state.next_id);
        let session = ProcessorSession {
            url: format!("https://checkout.processor.test/pay/{id}"),
            id,
        };
        state.sessions.push((session.clone(), request));

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cents: i64) -> SessionRequest {
        SessionRequest {
            amount: Money::from_cents(cents),
            currency: "usd".to_string(),
            description: "Order ORD-1-0001".to_string(),
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            metadata: HashMap::from([("order_id".to_string(), "abc".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_sequential_session_ids() {
        let processor = InMemoryPaymentProcessor::new();

        let s1 = processor.create_session(request(1000)).await.unwrap();
        let s2 = processor.create_session(request(2000)).await.unwrap();

        assert_eq!(s1.id, "cs_test_0001");
        assert_eq!(s2.id, "cs_test_0002");
        assert!(s2.url.ends_with("cs_test_0002"));
        assert_eq!(processor.session_count(), 2);
        assert_eq!(
            processor.request_for("cs_test_0002").unwrap().amount.cents(),
            2000
        );
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let processor = InMemoryPaymentProcessor::new();
        processor.set_fail_on_create(true);

        let result = processor.create_session(request(1000)).await;
        assert!(matches!(result, Err(LifecycleError::Collaborator { .. })));
        assert_eq!(processor.session_count(), 0);
    }
}
