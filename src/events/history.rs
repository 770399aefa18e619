//! Event history and multi-agent aggregation
//!
//! [`EventHistory`] is a read-only query layer over the durable event log.
//! [`BusRegistry`] owns one bus per agent over a shared store and feed,
//! offering an aggregated event view and broadcast across all of them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::BusConfig;
use crate::feed::SharedNotificationFeed;
use crate::store::{DurableStore, EventQuery, SharedDurableStore, StoreResult};

use super::bus::{AgentEventBus, PublishOptions, SharedAgentEventBus};
use super::types::{AgentEvent, EventId, EventKind, EventPayload};

/// Read-only queries over the durable event log
pub struct EventHistory {
    store: SharedDurableStore,
}

impl EventHistory {
    /// Create a history view over a durable store
    pub fn new(store: SharedDurableStore) -> Self {
        Self { store }
    }

    /// Query events, newest first
    pub async fn query(&self, query: &EventQuery) -> StoreResult<Vec<AgentEvent>> {
        self.store.query_events(query).await
    }

    /// The newest `limit` events
    pub async fn recent(&self, limit: usize) -> StoreResult<Vec<AgentEvent>> {
        self.query(&EventQuery::default().limit(limit)).await
    }

    /// The newest `limit` events of one kind
    pub async fn by_kind(&self, kind: EventKind, limit: usize) -> StoreResult<Vec<AgentEvent>> {
        self.query(&EventQuery::default().kind(kind).limit(limit))
            .await
    }
}

/// One bus per agent over a shared store and feed
pub struct BusRegistry {
    store: SharedDurableStore,
    feed: Option<SharedNotificationFeed>,
    config: BusConfig,
    buses: Mutex<HashMap<String, SharedAgentEventBus>>,
}

impl BusRegistry {
    /// Create a registry over a durable store
    pub fn new(store: SharedDurableStore, config: BusConfig) -> Self {
        Self {
            store,
            feed: None,
            config,
            buses: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a notification feed; buses registered afterwards consume it
    pub fn with_feed(mut self, feed: SharedNotificationFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Create a shared reference to this registry
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Get or create the bus for an agent
    ///
    /// A newly created bus starts its feed intake immediately.
    pub async fn register_agent(&self, agent_code: &str) -> SharedAgentEventBus {
        let mut buses = self.buses.lock().await;
        if let Some(bus) = buses.get(agent_code) {
            return bus.clone();
        }

        let mut bus = AgentEventBus::new(agent_code, self.store.clone(), self.config.clone());
        if let Some(feed) = &self.feed {
            bus = bus.with_feed(feed.clone());
        }
        let bus = bus.shared();
        bus.spawn_feed_intake().await;

        buses.insert(agent_code.to_string(), bus.clone());
        debug!(agent = agent_code, "agent bus registered");
        bus
    }

    /// The bus for an agent, if registered
    pub async fn bus(&self, agent_code: &str) -> Option<SharedAgentEventBus> {
        self.buses.lock().await.get(agent_code).cloned()
    }

    /// Registered agent codes
    pub async fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.buses.lock().await.keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Merged event view across every registered agent, newest first
    pub async fn aggregated(&self, query: &EventQuery) -> Vec<AgentEvent> {
        let agents = self.agents().await;

        let mut merged = Vec::new();
        for agent in agents {
            let scoped = query.clone().agent(&agent);
            match self.store.query_events(&scoped).await {
                Ok(events) => merged.extend(events),
                Err(query_error) => {
                    debug!(agent = %agent, "aggregated query failed: {}", query_error);
                }
            }
        }

        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            merged.truncate(limit);
        }
        merged
    }

    /// Publish the same event from every registered bus
    ///
    /// Returns (agent, event id) pairs in agent order.
    pub async fn broadcast(
        &self,
        kind: EventKind,
        action: &str,
        payload: EventPayload,
    ) -> Vec<(String, EventId)> {
        let buses: Vec<(String, SharedAgentEventBus)> = {
            let buses = self.buses.lock().await;
            let mut pairs: Vec<_> = buses
                .iter()
                .map(|(agent, bus)| (agent.clone(), bus.clone()))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        };

        let mut results = Vec::new();
        for (agent, bus) in buses {
            let event_id = bus
                .publish(
                    kind.clone(),
                    action,
                    payload.clone(),
                    PublishOptions::default(),
                )
                .await;
            results.push((agent, event_id));
        }
        results
    }

    /// Shut down every registered bus
    pub async fn shutdown(&self) {
        let mut buses = self.buses.lock().await;
        for bus in buses.values() {
            bus.shutdown().await;
        }
        buses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::LoopbackFeed;
    use crate::store::MemoryDurableStore;
    use std::time::Duration;

    fn quick_config() -> BusConfig {
        BusConfig::default().with_persist_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = MemoryDurableStore::new().shared();
        let registry = BusRegistry::new(store, quick_config());

        let first = registry.register_agent("LEAD").await;
        let second = registry.register_agent("LEAD").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.agents().await, vec!["LEAD"]);
    }

    #[tokio::test]
    async fn test_aggregated_merges_across_agents() {
        let store = MemoryDurableStore::new().shared();
        let registry = BusRegistry::new(store.clone(), quick_config());

        let lead = registry.register_agent("LEAD").await;
        let plan = registry.register_agent("PLAN").await;

        lead.publish(
            EventKind::AnalysisStart,
            "lead analysis",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;
        plan.publish(
            EventKind::AnalysisStart,
            "plan analysis",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        let events = registry.aggregated(&EventQuery::default()).await;
        assert_eq!(events.len(), 2);

        // Newest first
        assert!(events[0].timestamp >= events[1].timestamp);
    }

    #[tokio::test]
    async fn test_broadcast_publishes_from_every_bus() {
        let store = MemoryDurableStore::new().shared();
        let registry = BusRegistry::new(store.clone(), quick_config());

        registry.register_agent("LEAD").await;
        registry.register_agent("PLAN").await;
        registry.register_agent("EXEC").await;

        let results = registry
            .broadcast(EventKind::Warning, "maintenance window", EventPayload::none())
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn test_history_by_kind() {
        let store = MemoryDurableStore::new().shared();
        let registry = BusRegistry::new(store.clone(), quick_config());
        let bus = registry.register_agent("VALIDATION").await;

        bus.publish(
            EventKind::FindingDetected,
            "finding one",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;
        bus.publish(
            EventKind::Warning,
            "unrelated",
            EventPayload::none(),
            PublishOptions::default(),
        )
        .await;

        let history = EventHistory::new(store);
        let findings = history
            .by_kind(EventKind::FindingDetected, 10)
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].action, "finding one");
    }

    #[tokio::test]
    async fn test_feed_delivery_between_registered_agents() {
        let store = MemoryDurableStore::new().shared();
        let feed = LoopbackFeed::new().shared();
        let registry = BusRegistry::new(store, quick_config()).with_feed(feed);

        let lead = registry.register_agent("LEAD").await;
        let plan = registry.register_agent("PLAN").await;

        let recorder = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::<String>::new()));
        let sink = recorder.clone();
        plan.subscribe(
            EventKind::HandoffCreated,
            crate::events::FnHandler::arc(move |event: AgentEvent| {
                let sink = sink.clone();
                async move {
                    sink.lock().await.push(event.action);
                    Ok(())
                }
            }),
            Default::default(),
        )
        .await;

        lead.publish(
            EventKind::HandoffCreated,
            "lead to plan handoff",
            EventPayload::none(),
            PublishOptions {
                target_agents: vec!["PLAN".to_string()],
                ..PublishOptions::default()
            },
        )
        .await;

        // Feed intake runs on a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*recorder.lock().await, vec!["lead to plan handoff"]);
        registry.shutdown().await;
    }
}
