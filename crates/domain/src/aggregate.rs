//! Core aggregate and domain event traits.

use common::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events describe a change that has been decided on. They are named
/// in past tense and carry everything `apply` needs, including timestamps.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name used in logs and metrics labels.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates driven by decide/apply.
///
/// Command methods on the aggregate inspect the current state and return the
/// events to apply, or an error. Nothing is mutated while deciding, so a
/// rejected command leaves the aggregate untouched. `apply` then folds the
/// events into the state.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors command methods return.
    type Error: std::error::Error + Send + Sync;

    /// The identifier type of the aggregate.
    type Id: Copy + std::fmt::Display;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, or None before creation.
    fn id(&self) -> Option<Self::Id>;

    /// Returns the stored version of the aggregate.
    ///
    /// Version is 0 until the aggregate has been persisted once.
    fn version(&self) -> Version;

    /// Sets the stored version. Called by the persistence layer.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and must not fail: the event has already been
    /// accepted by a command method.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: u32 },
        Bumped { by: i32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Bumped { .. } => "CounterBumped",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: Option<u32>,
        value: i32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("counter error")]
    struct CounterError;

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = CounterError;
        type Id = u32;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<u32> {
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
                CounterEvent::Opened { id } => self.id = Some(id),
                CounterEvent::Bumped { by } => self.value += by,
            }
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let mut counter = Counter::default();
        counter.apply_events(vec![
            CounterEvent::Opened { id: 7 },
            CounterEvent::Bumped { by: 2 },
            CounterEvent::Bumped { by: 3 },
        ]);

        assert_eq!(counter.id(), Some(7));
        assert_eq!(counter.value, 5);
        assert_eq!(counter.version(), Version::initial());
    }

    #[test]
    fn event_type_names() {
        assert_eq!(CounterEvent::Opened { id: 1 }.event_type(), "CounterOpened");
        assert_eq!(CounterEvent::Bumped { by: 1 }.event_type(), "CounterBumped");
    }
}
