//! Agent event bus
//!
//! Each agent owns one bus instance, dependency-injected into the consensus
//! and checkpoint components — there is no ambient singleton. Publishing
//! dispatches to local subscribers first (so handlers observe the event even
//! if persistence later fails), then appends to the durable store with a
//! bounded retry, buffering locally on exhaustion. A drain processes queued
//! events in strict priority order; escalating kinds take an immediate path
//! distinct from generic subscriber dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, SharedCheckpointManager};
use crate::config::BusConfig;
use crate::consensus::{ConsensusOptions, ConsensusWait, SharedConsensusManager};
use crate::feed::SharedNotificationFeed;
use crate::store::{DurableStore, SharedDurableStore, ValidationAudit};

use super::types::{
    AgentEvent, Correlation, EventId, EventKind, EventPayload, Priority, SubscriptionId,
};

/// Error type for bus operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no checkpoint manager attached to this bus")]
    CheckpointUnattached,

    #[error("no consensus manager attached to this bus")]
    ConsensusUnattached,

    #[error("store error: {0}")]
    Store(String),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Shared reference to an agent event bus
pub type SharedAgentEventBus = Arc<AgentEventBus>;

/// Handles events delivered to a subscription
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event; an error is logged and isolated
    async fn handle(&self, event: &AgentEvent) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(AgentEvent) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &AgentEvent) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(AgentEvent) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    /// Wrap a closure as a shared handler
    pub fn arc(f: F) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler(f))
    }
}

/// Filter predicate applied before a handler sees an event
pub type FilterFn = dyn Fn(&AgentEvent) -> bool + Send + Sync;

/// Options for publishing an event
#[derive(Default)]
pub struct PublishOptions {
    /// Dispatch priority
    pub priority: Priority,
    /// Agents this event targets; empty means broadcast
    pub target_agents: Vec<String>,
    /// Whether receiving agents must acknowledge receipt
    pub requires_ack: bool,
    /// Governance records this event concerns
    pub correlation: Correlation,
}

/// Options for subscribing to an event kind
#[derive(Default)]
pub struct SubscribeOptions {
    /// Predicate an event must pass to reach the handler
    pub filter: Option<Box<FilterFn>>,
    /// Least-urgent priority the handler wants to see
    pub min_priority: Option<Priority>,
}

impl SubscribeOptions {
    /// Set the filter predicate
    pub fn with_filter(mut self, filter: impl Fn(&AgentEvent) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Set the minimum priority
    pub fn with_min_priority(mut self, min_priority: Priority) -> Self {
        self.min_priority = Some(min_priority);
        self
    }
}

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
    filter: Option<Box<FilterFn>>,
    min_priority: Option<Priority>,
}

/// Priority-ordered pub/sub for one agent
pub struct AgentEventBus {
    agent_code: String,
    config: BusConfig,
    store: SharedDurableStore,
    feed: Option<SharedNotificationFeed>,
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
    queue: Mutex<Vec<AgentEvent>>,
    draining: AtomicBool,
    unpersisted: Mutex<Vec<AgentEvent>>,
    checkpoints: RwLock<Option<SharedCheckpointManager>>,
    consensus: RwLock<Option<SharedConsensusManager>>,
    intake: Mutex<Option<JoinHandle<()>>>,
}

impl AgentEventBus {
    /// Create a bus for an agent over a durable store
    pub fn new(agent_code: impl Into<String>, store: SharedDurableStore, config: BusConfig) -> Self {
        Self {
            agent_code: agent_code.into(),
            config,
            store,
            feed: None,
            subscriptions: RwLock::new(HashMap::new()),
            queue: Mutex::new(Vec::new()),
            draining: AtomicBool::new(false),
            unpersisted: Mutex::new(Vec::new()),
            checkpoints: RwLock::new(None),
            consensus: RwLock::new(None),
            intake: Mutex::new(None),
        }
    }

    /// Attach a cross-process notification feed
    pub fn with_feed(mut self, feed: SharedNotificationFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedAgentEventBus {
        Arc::new(self)
    }

    /// The agent this bus belongs to
    pub fn agent_code(&self) -> &str {
        &self.agent_code
    }

    /// Attach a checkpoint manager for the convenience operations and
    /// error-escalation recovery
    pub async fn attach_checkpoints(&self, manager: SharedCheckpointManager) {
        *self.checkpoints.write().await = Some(manager);
    }

    /// Attach a consensus manager for `request_consensus`
    pub async fn attach_consensus(&self, manager: SharedConsensusManager) {
        *self.consensus.write().await = Some(manager);
    }

    // =========================================================================
    // Publish / subscribe
    // =========================================================================

    /// Publish an event
    ///
    /// Local subscribers are dispatched synchronously before the durable
    /// append, so they observe the event even when persistence fails. A
    /// persistence failure is retried a bounded number of times and then
    /// buffered — publish never surfaces it.
    pub async fn publish(
        &self,
        kind: EventKind,
        action: impl Into<String>,
        payload: EventPayload,
        options: PublishOptions,
    ) -> EventId {
        let event = AgentEvent {
            id: AgentEvent::new_id(),
            timestamp: Utc::now(),
            agent_code: self.agent_code.clone(),
            kind,
            action: action.into(),
            payload,
            priority: options.priority,
            target_agents: options.target_agents,
            requires_ack: options.requires_ack,
            correlation: options.correlation,
        };
        let event_id = event.id.clone();

        self.queue.lock().await.push(event.clone());
        self.process_queue().await;

        self.persist_event(event.clone()).await;

        if let Some(feed) = &self.feed {
            if let Err(feed_error) = feed.publish(&event).await {
                warn!(event_id = %event_id, "feed publish failed: {}", feed_error);
            }
        }

        event_id
    }

    /// Subscribe a handler to an event kind
    pub async fn subscribe(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let id = format!("sub-{}", uuid::Uuid::new_v4());
        let subscription = Arc::new(Subscription {
            id: id.clone(),
            kind,
            handler,
            filter: options.filter,
            min_priority: options.min_priority,
        });
        self.subscriptions
            .write()
            .await
            .insert(id.clone(), subscription);
        id
    }

    /// Remove a subscription
    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions
            .write()
            .await
            .remove(subscription_id)
            .is_some()
    }

    /// Drain the queue in strict priority order
    ///
    /// A drain already in progress makes this a no-op; the guard is a flag
    /// protecting same-process re-entry, not a lock.
    pub async fn process_queue(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            let event = {
                let mut queue = self.queue.lock().await;
                if queue.is_empty() {
                    break;
                }
                // Stable sort keeps arrival order within a priority class
                queue.sort_by_key(|e| e.priority.rank());
                queue.remove(0)
            };
            self.dispatch(&event).await;
        }

        self.draining.store(false, Ordering::SeqCst);
    }

    /// Explicitly acknowledge receipt of an event
    pub async fn acknowledge(&self, event_id: &str) -> BusResult<()> {
        self.store
            .acknowledge_event(event_id, &self.agent_code)
            .await
            .map_err(|e| BusError::Store(e.to_string()))?;
        debug!(event_id, agent = %self.agent_code, "event acknowledged");
        Ok(())
    }

    /// Retry the locally buffered events against the durable store
    ///
    /// Returns the number of events that landed. Events that still fail stay
    /// buffered for a later pass.
    pub async fn flush_unpersisted(&self) -> usize {
        let pending: Vec<AgentEvent> = self.unpersisted.lock().await.drain(..).collect();
        if pending.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        let mut still_failing = Vec::new();
        for event in pending {
            match self.store.append_event(&event).await {
                Ok(()) => flushed += 1,
                Err(append_error) => {
                    debug!(event_id = %event.id, "buffered event still failing: {}", append_error);
                    still_failing.push(event);
                }
            }
        }
        self.unpersisted.lock().await.extend(still_failing);

        if flushed > 0 {
            info!(flushed, agent = %self.agent_code, "buffered events flushed to durable store");
        }
        flushed
    }

    /// Number of events held in the unpersisted buffer
    pub async fn unpersisted_count(&self) -> usize {
        self.unpersisted.lock().await.len()
    }

    // =========================================================================
    // Feed intake
    // =========================================================================

    /// Start consuming the attached feed, delivering events targeted at this
    /// agent into the local queue
    ///
    /// Returns false when no feed is attached.
    pub async fn spawn_feed_intake(self: &Arc<Self>) -> bool {
        let Some(feed) = self.feed.clone() else {
            return false;
        };

        // Subscribe before spawning so no event published in between is missed
        let mut receiver = feed.subscribe();
        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if event.agent_code == bus.agent_code {
                            continue;
                        }
                        if !event.matches_target(&bus.agent_code) {
                            continue;
                        }
                        bus.handle_incoming(event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, agent = %bus.agent_code, "feed receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut intake = self.intake.lock().await;
        if let Some(previous) = intake.replace(handle) {
            previous.abort();
        }
        debug!(agent = %self.agent_code, "feed intake started");
        true
    }

    /// Stop the feed intake and drop all subscriptions
    pub async fn shutdown(&self) {
        if let Some(handle) = self.intake.lock().await.take() {
            handle.abort();
        }
        self.subscriptions.write().await.clear();
        debug!(agent = %self.agent_code, "event bus shut down");
    }

    async fn handle_incoming(&self, event: AgentEvent) {
        debug!(
            agent = %self.agent_code,
            kind = %event.kind,
            from = %event.agent_code,
            "feed event received"
        );

        // Receipt acknowledgment; never timeout-based
        if event.requires_ack {
            if let Err(ack_error) = self.acknowledge(&event.id).await {
                warn!(event_id = %event.id, "acknowledgment failed: {}", ack_error);
            }
        }

        self.queue.lock().await.push(event);
        self.process_queue().await;
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    async fn dispatch(&self, event: &AgentEvent) {
        if event.kind.is_escalating() {
            self.escalate(event).await;
        }

        let subscriptions: Vec<Arc<Subscription>> = {
            let subs = self.subscriptions.read().await;
            subs.values().cloned().collect()
        };

        for subscription in subscriptions {
            if subscription.kind != event.kind {
                continue;
            }
            if let Some(filter) = &subscription.filter {
                if !filter(event) {
                    continue;
                }
            }
            if let Some(min_priority) = subscription.min_priority {
                if event.priority.rank() > min_priority.rank() {
                    continue;
                }
            }

            // A failing handler never blocks the others
            if let Err(handler_error) = subscription.handler.handle(event).await {
                error!(
                    subscription = %subscription.id,
                    kind = %event.kind,
                    "subscriber handler failed: {}",
                    handler_error
                );
            }
        }
    }

    /// Immediate path for validation failures, human-review requests, and
    /// system errors, distinct from generic subscriber dispatch
    async fn escalate(&self, event: &AgentEvent) {
        match event.kind {
            EventKind::ValidationFailed => {
                let audit = ValidationAudit {
                    agent_code: event.agent_code.clone(),
                    directive_id: event.correlation.directive_id.clone(),
                    plan_id: event.correlation.plan_id.clone(),
                    phase: event.correlation.phase.clone(),
                    details: serde_json::to_value(&event.payload).unwrap_or(Value::Null),
                    recorded_at: Utc::now(),
                };
                if let Err(audit_error) = self.store.record_validation(&audit).await {
                    warn!(event_id = %event.id, "validation audit failed: {}", audit_error);
                }
            }
            EventKind::HumanReviewRequired => {
                warn!(
                    agent = %event.agent_code,
                    action = %event.action,
                    payload = ?event.payload,
                    "HUMAN REVIEW REQUIRED"
                );
            }
            EventKind::Error => {
                if let EventPayload::Fault {
                    recoverable: true,
                    checkpoint_id: Some(ref checkpoint_id),
                    ..
                } = event.payload
                {
                    let manager = self.checkpoints.read().await.clone();
                    if let Some(manager) = manager {
                        info!(checkpoint_id = %checkpoint_id, "attempting recovery from fault");
                        // Box the recursive edge: restore() can publish a Recovery
                        // event, which re-enters publish/process_queue. Indirection
                        // keeps the mutually-recursive future finitely sized.
                        Box::pin(manager.restore(checkpoint_id)).await;
                    }
                }
            }
            _ => {}
        }
    }

    async fn persist_event(&self, event: AgentEvent) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.append_event(&event).await {
                Ok(()) => {
                    debug!(event_id = %event.id, "event persisted");
                    return;
                }
                Err(append_error) if attempt < self.config.max_persist_attempts => {
                    debug!(
                        event_id = %event.id,
                        attempt,
                        "event append failed, retrying: {}",
                        append_error
                    );
                    tokio::time::sleep(self.config.persist_retry_delay).await;
                }
                Err(append_error) => {
                    warn!(
                        event_id = %event.id,
                        attempts = attempt,
                        "event append exhausted retries, buffering locally: {}",
                        append_error
                    );
                    self.unpersisted.lock().await.push(event);
                    return;
                }
            }
        }
    }

    // =========================================================================
    // Convenience operations
    // =========================================================================

    /// Create a checkpoint through the attached checkpoint manager
    pub async fn create_checkpoint(
        &self,
        phase: &str,
        state: Value,
        metadata: Value,
    ) -> BusResult<Checkpoint> {
        let manager = self
            .checkpoints
            .read()
            .await
            .clone()
            .ok_or(BusError::CheckpointUnattached)?;
        Ok(manager.create_checkpoint(phase, state, metadata).await)
    }

    /// Restore state through the attached checkpoint manager
    pub async fn recover_from_checkpoint(&self, checkpoint_id: &str) -> BusResult<Option<Value>> {
        let manager = self
            .checkpoints
            .read()
            .await
            .clone()
            .ok_or(BusError::CheckpointUnattached)?;
        Ok(manager.restore(checkpoint_id).await)
    }

    /// Ask the target agents for consensus and wait for the outcome
    ///
    /// Delegates creation to the attached consensus manager (which broadcasts
    /// CONSENSUS_REQUIRED), then polls the durable consensus store until the
    /// request finalizes. The poll window extends slightly past the voting
    /// timeout so a timer-forced finalization is still observed; only a
    /// finalization that never lands reports [`ConsensusWait::TimedOut`].
    pub async fn request_consensus(&self, options: ConsensusOptions) -> BusResult<ConsensusWait> {
        let manager = self
            .consensus
            .read()
            .await
            .clone()
            .ok_or(BusError::ConsensusUnattached)?;

        let poll_interval = self.config.consensus_poll_interval;
        let window = options
            .timeout
            .unwrap_or(manager.config().default_timeout)
            + poll_interval * 4;

        let request_id = manager.create_request(options).await;
        let deadline = tokio::time::Instant::now() + window;

        loop {
            match self.store.get_request(&request_id).await {
                Ok(Some(request)) if request.status.is_terminal() => {
                    return Ok(ConsensusWait::Resolved {
                        reached: request.status == crate::consensus::ConsensusStatus::Approved,
                        votes: request.votes,
                        status: request.status,
                    });
                }
                Ok(_) => {}
                Err(store_error) => {
                    debug!(request_id = %request_id, "consensus poll failed: {}", store_error);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(request_id = %request_id, "consensus wait timed out");
                return Ok(ConsensusWait::TimedOut);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDurableStore;
    use serde_json::json;
    use std::time::Duration;

    fn quick_config() -> BusConfig {
        BusConfig::default()
            .with_persist_retry_delay(Duration::from_millis(1))
            .with_consensus_poll_interval(Duration::from_millis(5))
    }

    fn test_bus() -> (SharedAgentEventBus, Arc<MemoryDurableStore>) {
        let store = MemoryDurableStore::new().shared();
        let bus = AgentEventBus::new("VALIDATION", store.clone(), quick_config()).shared();
        (bus, store)
    }

    /// Records the actions of every event it sees
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        async fn actions(&self) -> Vec<String> {
            self.seen.lock().await.clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &AgentEvent) -> anyhow::Result<()> {
            self.seen.lock().await.push(event.action.clone());
            Ok(())
        }
    }

    /// Fails on every event
    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &AgentEvent) -> anyhow::Result<()> {
            anyhow::bail!("handler exploded")
        }
    }

    fn queued_event(bus: &AgentEventBus, priority: Priority, action: &str) -> AgentEvent {
        AgentEvent {
            id: AgentEvent::new_id(),
            timestamp: Utc::now(),
            agent_code: bus.agent_code.clone(),
            kind: EventKind::Warning,
            action: action.to_string(),
            payload: EventPayload::none(),
            priority,
            target_agents: vec![],
            requires_ack: false,
            correlation: Correlation::default(),
        }
    }

    #[tokio::test]
    async fn test_drain_respects_priority_order() {
        let (bus, _store) = test_bus();
        let recorder = Recorder::new();
        bus.subscribe(
            EventKind::Warning,
            recorder.clone(),
            SubscribeOptions::default(),
        )
        .await;

        // Enqueue out of order before any drain runs
        {
            let mut queue = bus.queue.lock().await;
            queue.push(queued_event(&bus, Priority::Low, "low"));
            queue.push(queued_event(&bus, Priority::Critical, "critical"));
            queue.push(queued_event(&bus, Priority::Medium, "medium"));
            queue.push(queued_event(&bus, Priority::High, "high"));
        }

        bus.process_queue().await;

        assert_eq!(
            recorder.actions().await,
            vec!["critical", "high", "medium", "low"]
        );
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let (bus, _store) = test_bus();
        let recorder = Recorder::new();
        bus.subscribe(
            EventKind::Warning,
            recorder.clone(),
            SubscribeOptions::default(),
        )
        .await;

        {
            let mut queue = bus.queue.lock().await;
            queue.push(queued_event(&bus, Priority::Medium, "first"));
            queue.push(queued_event(&bus, Priority::Medium, "second"));
            queue.push(queued_event(&bus, Priority::Medium, "third"));
        }

        bus.process_queue().await;

        assert_eq!(recorder.actions().await, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let (bus, _store) = test_bus();
        let recorder = Recorder::new();

        bus.subscribe(
            EventKind::FindingDetected,
            Arc::new(FailingHandler),
            SubscribeOptions::default(),
        )
        .await;
        bus.subscribe(
            EventKind::FindingDetected,
            recorder.clone(),
            SubscribeOptions::default(),
        )
        .await;

        bus.publish(
            EventKind::FindingDetected,
            "found something",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        assert_eq!(recorder.actions().await, vec!["found something"]);
    }

    #[tokio::test]
    async fn test_filter_and_min_priority_gate_dispatch() {
        let (bus, _store) = test_bus();
        let filtered = Recorder::new();
        let gated = Recorder::new();

        bus.subscribe(
            EventKind::FindingDetected,
            filtered.clone(),
            SubscribeOptions::default()
                .with_filter(|event| event.action.contains("dashboard")),
        )
        .await;
        bus.subscribe(
            EventKind::FindingDetected,
            gated.clone(),
            SubscribeOptions::default().with_min_priority(Priority::High),
        )
        .await;

        bus.publish(
            EventKind::FindingDetected,
            "dashboard duplicate",
            EventPayload::none(),
            PublishOptions {
                priority: Priority::Low,
                ..PublishOptions::default()
            },
        )
        .await;
        bus.publish(
            EventKind::FindingDetected,
            "api drift",
            EventPayload::none(),
            PublishOptions {
                priority: Priority::High,
                ..PublishOptions::default()
            },
        )
        .await;

        assert_eq!(filtered.actions().await, vec!["dashboard duplicate"]);
        assert_eq!(gated.actions().await, vec!["api drift"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (bus, _store) = test_bus();
        let recorder = Recorder::new();

        let subscription_id = bus
            .subscribe(
                EventKind::Warning,
                recorder.clone(),
                SubscribeOptions::default(),
            )
            .await;

        bus.publish(
            EventKind::Warning,
            "first",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        assert!(bus.unsubscribe(&subscription_id).await);
        assert!(!bus.unsubscribe(&subscription_id).await);

        bus.publish(
            EventKind::Warning,
            "second",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        assert_eq!(recorder.actions().await, vec!["first"]);
    }

    #[tokio::test]
    async fn test_handlers_observe_event_despite_persist_failure() {
        let (bus, store) = test_bus();
        let recorder = Recorder::new();
        bus.subscribe(
            EventKind::Warning,
            recorder.clone(),
            SubscribeOptions::default(),
        )
        .await;

        store.set_fail_writes(true);
        bus.publish(
            EventKind::Warning,
            "unpersistable",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        // Dispatch happened even though every append attempt failed
        assert_eq!(recorder.actions().await, vec!["unpersistable"]);
        assert_eq!(bus.unpersisted_count().await, 1);
        assert_eq!(store.event_count().await, 0);

        // Store recovers; the buffer flushes
        store.set_fail_writes(false);
        assert_eq!(bus.flush_unpersisted().await, 1);
        assert_eq!(bus.unpersisted_count().await, 0);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_reentrant_publish_from_handler() {
        let (bus, _store) = test_bus();
        let warnings = Recorder::new();

        // A handler that publishes a follow-up; the nested drain is a no-op
        // and the outer drain delivers the follow-up
        let republisher = bus.clone();
        bus.subscribe(
            EventKind::FindingDetected,
            FnHandler::arc(move |_event: AgentEvent| {
                let bus = republisher.clone();
                async move {
                    bus.publish(
                        EventKind::Warning,
                        "follow-up",
                        EventPayload::none(),
                        PublishOptions::default(),
                    )
                    .await;
                    Ok(())
                }
            }),
            SubscribeOptions::default(),
        )
        .await;
        bus.subscribe(
            EventKind::Warning,
            warnings.clone(),
            SubscribeOptions::default(),
        )
        .await;

        bus.publish(
            EventKind::FindingDetected,
            "trigger",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        assert_eq!(warnings.actions().await, vec!["follow-up"]);
    }

    #[tokio::test]
    async fn test_acknowledge_records_in_store() {
        let (bus, store) = test_bus();

        bus.acknowledge("evt-123").await.unwrap();

        assert_eq!(store.acknowledgments("evt-123").await, vec!["VALIDATION"]);
    }

    #[tokio::test]
    async fn test_validation_failure_escalates_to_audit() {
        let (bus, store) = test_bus();

        bus.publish(
            EventKind::ValidationFailed,
            "schema drift detected",
            EventPayload::Validation {
                passed: false,
                reason: Some("schema drift".to_string()),
                results: json!({"table": "directives"}),
            },
            PublishOptions {
                priority: Priority::Critical,
                correlation: Correlation::directive("SD-2026-001").with_phase("PLAN_TO_EXEC"),
                ..PublishOptions::default()
            },
        )
        .await;

        let audits = store.validation_audits().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].agent_code, "VALIDATION");
        assert_eq!(audits[0].directive_id.as_deref(), Some("SD-2026-001"));
    }

    #[tokio::test]
    async fn test_convenience_ops_require_attachment() {
        let (bus, _store) = test_bus();

        let checkpoint = bus.create_checkpoint("BUILD_START", json!({}), json!({})).await;
        assert!(matches!(checkpoint, Err(BusError::CheckpointUnattached)));

        let recovery = bus.recover_from_checkpoint("chk-1").await;
        assert!(matches!(recovery, Err(BusError::CheckpointUnattached)));

        let consensus = bus
            .request_consensus(ConsensusOptions::new(
                "anyone?",
                vec!["LEAD".to_string()],
                crate::consensus::ConsensusType::SimpleMajority,
            ))
            .await;
        assert!(matches!(consensus, Err(BusError::ConsensusUnattached)));
    }
}
