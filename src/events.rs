use crate::channel::{ControlKind, Payload, SimulationState, Transition};
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

/// Events published by the control channel as the simulation lifecycle moves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// A control event was committed
    Transitioned {
        transition: Transition,
        parameters: Option<Payload>,
        attributes: Option<Payload>,
    },
    /// A control event was refused
    Rejected {
        state: SimulationState,
        kind: Option<ControlKind>,
        reason: String,
        timestamp: SystemTime,
    },
    /// The shutdown drain has begun
    DrainStarted { timestamp: SystemTime },
    /// The drain reported an error; termination still follows
    DrainFailed { error: String, timestamp: SystemTime },
    /// The simulation reached its terminal state
    Terminated { timestamp: SystemTime },
}

impl LifecycleEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            LifecycleEvent::Transitioned { transition, .. } => transition.at.into(),
            LifecycleEvent::Rejected { timestamp, .. } => *timestamp,
            LifecycleEvent::DrainStarted { timestamp } => *timestamp,
            LifecycleEvent::DrainFailed { timestamp, .. } => *timestamp,
            LifecycleEvent::Terminated { timestamp } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            LifecycleEvent::Transitioned { transition, .. } => match transition.trigger {
                Some(kind) => format!(
                    "#{} {} -> {} on {}",
                    transition.sequence, transition.from, transition.to, kind
                ),
                None => format!(
                    "#{} {} -> {} after drain",
                    transition.sequence, transition.from, transition.to
                ),
            },
            LifecycleEvent::Rejected { reason, .. } => format!("Rejected: {}", reason),
            LifecycleEvent::DrainStarted { .. } => "Drain started".to_string(),
            LifecycleEvent::DrainFailed { error, .. } => format!("Drain failed: {}", error),
            LifecycleEvent::Terminated { .. } => "Simulation terminated".to_string(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::Transitioned { .. } => "transitioned",
            LifecycleEvent::Rejected { .. } => "rejected",
            LifecycleEvent::DrainStarted { .. } => "drain_started",
            LifecycleEvent::DrainFailed { .. } => "drain_failed",
            LifecycleEvent::Terminated { .. } => "terminated",
        }
    }
}

/// Async event bus for lifecycle notifications using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receipt
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: LifecycleEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            LifecycleEvent::Rejected { reason, .. } => {
                debug!("Publishing rejection: {}", reason);
            }
            LifecycleEvent::DrainFailed { error: drain_error, .. } => {
                error!("Drain failed: {}", drain_error);
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept transitions that land on one of these states
    TargetStates(Vec<SimulationState>),
    /// Custom filter function
    Custom(fn(&LifecycleEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::TargetStates(states) => {
                if let LifecycleEvent::Transitioned { transition, .. } = event {
                    states.contains(&transition.to)
                } else {
                    false
                }
            }
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<LifecycleEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<LifecycleEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::time::{timeout, Duration};

    fn transitioned(sequence: u64, from: SimulationState, to: SimulationState) -> LifecycleEvent {
        LifecycleEvent::Transitioned {
            transition: Transition {
                sequence,
                from,
                to,
                trigger: Some(ControlKind::Start),
                at: Utc::now(),
            },
            parameters: None,
            attributes: None,
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(transitioned(1, SimulationState::Stopped, SimulationState::Running))
            .await
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            LifecycleEvent::Transitioned { transition, .. } => {
                assert_eq!(transition.sequence, 1);
                assert_eq!(transition.to, SimulationState::Running);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(4);
        assert!(!event_bus.has_subscribers());

        let result = event_bus
            .publish(LifecycleEvent::Terminated {
                timestamp: SystemTime::now(),
            })
            .await;
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.clone().subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus
            .publish(LifecycleEvent::DrainStarted {
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::EventTypes(vec!["terminated", "drain_failed"]);

        let terminated = LifecycleEvent::Terminated {
            timestamp: SystemTime::now(),
        };
        let started = transitioned(1, SimulationState::Stopped, SimulationState::Running);

        assert!(filter.matches(&terminated));
        assert!(!filter.matches(&started));
    }

    #[test]
    fn test_target_state_filter() {
        let filter = EventFilter::TargetStates(vec![SimulationState::Paused]);

        assert!(filter.matches(&transitioned(
            2,
            SimulationState::Running,
            SimulationState::Paused
        )));
        assert!(!filter.matches(&transitioned(
            1,
            SimulationState::Stopped,
            SimulationState::Running
        )));
        assert!(!filter.matches(&LifecycleEvent::DrainStarted {
            timestamp: SystemTime::now()
        }));
    }

    #[test]
    fn test_custom_filter() {
        let filter = EventFilter::Custom(|event| {
            matches!(event, LifecycleEvent::Rejected { kind: None, .. })
        });

        let malformed = LifecycleEvent::Rejected {
            state: SimulationState::Stopped,
            kind: None,
            reason: "Malformed control event: invalid JSON".to_string(),
            timestamp: SystemTime::now(),
        };
        assert!(filter.matches(&malformed));
        assert!(!filter.matches(&LifecycleEvent::Terminated {
            timestamp: SystemTime::now()
        }));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered = event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["rejected"]),
            "test",
        );

        event_bus
            .publish(transitioned(1, SimulationState::Stopped, SimulationState::Running))
            .await
            .unwrap();
        event_bus
            .publish(LifecycleEvent::Rejected {
                state: SimulationState::Running,
                kind: Some(ControlKind::Start),
                reason: "Cannot apply start while simulation is running".to_string(),
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "rejected");
        assert_eq!(filtered.try_recv().unwrap().map(|e| e.event_type()), None);
    }

    #[tokio::test]
    async fn test_receiver_reports_lag() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe_filtered(EventFilter::All, "slow");

        for sequence in 1..=5 {
            event_bus
                .publish(transitioned(
                    sequence,
                    SimulationState::Stopped,
                    SimulationState::Running,
                ))
                .await
                .unwrap();
        }

        assert!(matches!(
            receiver.recv().await,
            Err(EventBusError::Lagged { skipped: 3 })
        ));
    }

    #[test]
    fn test_event_properties() {
        let event = transitioned(3, SimulationState::Paused, SimulationState::Running);
        assert_eq!(event.event_type(), "transitioned");
        assert_eq!(event.description(), "#3 paused -> running on start");
    }
}
