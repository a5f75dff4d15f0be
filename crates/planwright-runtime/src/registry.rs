//! Execution registry
//!
//! The only process-wide mutable state: a mutex-guarded map from execution
//! id to live record. The mutex is held for O(1) bookkeeping only; event
//! fan-out uses bounded per-subscriber buffers and detaches any subscriber
//! whose buffer is full, so the interpreter is never throttled by a slow
//! client.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use planwright_core::{ExecutionEvent, ExecutionObserver, Plan};

use crate::record::{ExecutionRecord, ExecutionStatus, ExecutionView, Subscriber};
use crate::stream::EventStream;

/// Registry tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Bounded per-subscriber buffer; a full buffer detaches the subscriber.
    pub subscriber_buffer: usize,
    /// How long terminal records stay available for late replay.
    pub grace: Duration,
    /// Heartbeat period for idle event streams.
    pub heartbeat: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            grace: Duration::from_secs(600),
            heartbeat: Duration::from_secs(15),
        }
    }
}

/// Process-wide mapping from execution id to live execution record.
pub struct ExecutionRegistry {
    records: Mutex<HashMap<String, ExecutionRecord>>,
    config: RegistryConfig,
    next_subscriber_id: AtomicU64,
}

impl ExecutionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            config,
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Create a record for a not-yet-started execution.
    ///
    /// Returns the fresh execution id and its cancellation token.
    pub fn create(&self, plan: Plan, query: String) -> (String, CancellationToken) {
        let execution_id = Uuid::new_v4().to_string();
        let record = ExecutionRecord::new(plan, query);
        let token = record.cancellation.clone();
        self.lock().insert(execution_id.clone(), record);
        tracing::info!(execution_id = %execution_id, "execution registered");
        (execution_id, token)
    }

    /// Transition a record from starting to running.
    pub fn mark_running(&self, execution_id: &str) {
        if let Some(record) = self.lock().get_mut(execution_id) {
            if record.status == ExecutionStatus::Starting {
                record.status = ExecutionStatus::Running;
            }
        }
    }

    /// Append an event to the log and fan it out to subscribers.
    ///
    /// Derived record fields (status, timestamps, final result, error,
    /// current step) follow from the event; a record transitions to a
    /// terminal status exactly once.
    pub fn publish(&self, execution_id: &str, event: ExecutionEvent) {
        let mut records = self.lock();
        let Some(record) = records.get_mut(execution_id) else {
            tracing::warn!(execution_id = %execution_id, "publish to unknown execution");
            return;
        };

        apply_event(record, &event, &self.config);
        record.event_log.push(event.clone());

        record.subscribers.retain(|subscriber| {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        execution_id = %execution_id,
                        subscriber_id = subscriber.id,
                        "subscriber buffer full, detaching stale consumer"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Attach a subscriber: an atomic snapshot of the log so far plus a live
    /// channel for everything after it.
    pub fn attach_subscriber(self: &Arc<Self>, execution_id: &str) -> Option<EventStream> {
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));

        let replay: VecDeque<ExecutionEvent> = {
            let mut records = self.lock();
            let record = records.get_mut(execution_id)?;
            let snapshot = record.event_log.iter().cloned().collect();
            // Live events only flow for non-terminal records; a finished
            // record replays its log and the stream closes on the terminal
            // event already in it.
            if !record.status.is_terminal() {
                record.subscribers.push(Subscriber {
                    id: subscriber_id,
                    tx,
                });
            }
            snapshot
        };

        Some(EventStream::new(
            self.clone(),
            execution_id.to_string(),
            subscriber_id,
            replay,
            rx,
            self.config.heartbeat,
        ))
    }

    /// Remove a subscriber, if still attached.
    pub fn detach_subscriber(&self, execution_id: &str, subscriber_id: u64) {
        if let Some(record) = self.lock().get_mut(execution_id) {
            record.subscribers.retain(|s| s.id != subscriber_id);
        }
    }

    /// Fire the cancellation signal of a live execution.
    pub fn cancel(&self, execution_id: &str) -> bool {
        let records = self.lock();
        match records.get(execution_id) {
            Some(record) if !record.status.is_terminal() => {
                record.cancellation.cancel();
                tracing::info!(execution_id = %execution_id, "cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Store the final environment snapshot of an execution.
    pub fn store_environment(&self, execution_id: &str, environment: Vec<(String, String)>) {
        if let Some(record) = self.lock().get_mut(execution_id) {
            record.environment = environment;
        }
    }

    /// Point-in-time view of an execution.
    pub fn get(&self, execution_id: &str) -> Option<ExecutionView> {
        let records = self.lock();
        let record = records.get(execution_id)?;
        Some(ExecutionView {
            execution_id: execution_id.to_string(),
            plan: record.plan.clone(),
            query: record.query.clone(),
            status: record.status,
            started_at: record.started_at,
            finished_at: record.finished_at,
            current_step_id: record.current_step_id.clone(),
            final_result: record.final_result.clone(),
            error: record.error.clone(),
            environment: record.environment.clone(),
            event_log: record.event_log.clone(),
        })
    }

    /// Evict terminal records past their grace deadline. Returns how many
    /// were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.lock();
        let before = records.len();
        records.retain(|execution_id, record| match record.expires_at {
            Some(deadline) if deadline <= now => {
                tracing::debug!(execution_id = %execution_id, "execution record swept");
                false
            }
            _ => true,
        });
        before - records.len()
    }

    /// Cancel every live execution; used on shutdown.
    pub fn drain(&self) {
        let records = self.lock();
        for (execution_id, record) in records.iter() {
            if !record.status.is_terminal() {
                tracing::info!(execution_id = %execution_id, "draining live execution");
                record.cancellation.cancel();
            }
        }
    }

    /// Number of records currently held, for tests and introspection.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Spawn the periodic sweeper task for this registry.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = registry.sweep_expired();
                if swept > 0 {
                    tracing::debug!(swept, "sweeper evicted expired records");
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExecutionRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_event(record: &mut ExecutionRecord, event: &ExecutionEvent, config: &RegistryConfig) {
    match event {
        ExecutionEvent::StepStarted { step_id, .. } => {
            record.current_step_id = Some(step_id.clone());
        }
        ExecutionEvent::ExecutionCompleted {
            result,
            finished_at,
        } if !record.status.is_terminal() => {
            record.status = ExecutionStatus::Completed;
            record.final_result = Some(result.clone());
            record.finished_at = Some(*finished_at);
            record.expires_at = Some(Instant::now() + config.grace);
        }
        ExecutionEvent::ExecutionFailed {
            error, finished_at, ..
        } if !record.status.is_terminal() => {
            record.status = ExecutionStatus::Failed;
            record.error = Some(error.clone());
            record.finished_at = Some(*finished_at);
            record.expires_at = Some(Instant::now() + config.grace);
        }
        ExecutionEvent::ExecutionStopped { finished_at } if !record.status.is_terminal() => {
            record.status = ExecutionStatus::Stopped;
            record.finished_at = Some(*finished_at);
            record.expires_at = Some(Instant::now() + config.grace);
        }
        _ => {}
    }
}

/// Routes interpreter events into the registry for one execution.
pub struct RegistryObserver {
    registry: Arc<ExecutionRegistry>,
    execution_id: String,
}

impl RegistryObserver {
    pub fn new(registry: Arc<ExecutionRegistry>, execution_id: String) -> Self {
        Self {
            registry,
            execution_id,
        }
    }
}

#[async_trait]
impl ExecutionObserver for RegistryObserver {
    async fn publish(&self, event: ExecutionEvent) {
        self.registry.publish(&self.execution_id, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use planwright_core::Step;

    fn plan() -> Plan {
        Plan::new(vec![Step::end("END")], 5)
    }

    fn registry_with(config: RegistryConfig) -> Arc<ExecutionRegistry> {
        Arc::new(ExecutionRegistry::new(config))
    }

    fn step_event(step_id: &str) -> ExecutionEvent {
        ExecutionEvent::StepStarted {
            step_id: step_id.to_string(),
            step_type: "llm".to_string(),
            description: String::new(),
        }
    }

    fn completed_event() -> ExecutionEvent {
        ExecutionEvent::ExecutionCompleted {
            result: "done".to_string(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_replay_then_live_without_gaps() {
        let registry = registry_with(RegistryConfig::default());
        let (id, _token) = registry.create(plan(), "q".to_string());

        registry.publish(&id, step_event("S1"));
        registry.publish(&id, step_event("S2"));

        let mut stream = registry.attach_subscriber(&id).expect("stream");
        registry.publish(&id, step_event("S3"));
        registry.publish(&id, completed_event());

        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            seen.push(event);
        }

        let log = registry.get(&id).expect("view").event_log;
        assert_eq!(seen, log);
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_full_log_and_closes() {
        let registry = registry_with(RegistryConfig::default());
        let (id, _token) = registry.create(plan(), "q".to_string());
        registry.publish(&id, step_event("S1"));
        registry.publish(&id, completed_event());

        let mut stream = registry.attach_subscriber(&id).expect("stream");
        assert_eq!(stream.next().await, Some(step_event("S1")));
        assert!(matches!(
            stream.next().await,
            Some(ExecutionEvent::ExecutionCompleted { .. })
        ));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_detached_not_awaited() {
        let registry = registry_with(RegistryConfig {
            subscriber_buffer: 2,
            ..RegistryConfig::default()
        });
        let (id, _token) = registry.create(plan(), "q".to_string());

        let _stream = registry.attach_subscriber(&id).expect("stream");
        for i in 0..5 {
            registry.publish(&id, step_event(&format!("S{}", i)));
        }

        // The stale subscriber is gone and the log is complete regardless.
        let view = registry.get(&id).expect("view");
        assert_eq!(view.event_log.len(), 5);
        let records = registry.lock();
        assert!(records.get(&id).expect("record").subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_status_transitions_exactly_once() {
        let registry = registry_with(RegistryConfig::default());
        let (id, _token) = registry.create(plan(), "q".to_string());

        registry.publish(&id, completed_event());
        registry.publish(
            &id,
            ExecutionEvent::ExecutionFailed {
                reason: "late".to_string(),
                finished_at: Utc::now(),
                error: "should not overwrite".to_string(),
            },
        );

        let view = registry.get(&id).expect("view");
        assert_eq!(view.status, ExecutionStatus::Completed);
        assert_eq!(view.final_result.as_deref(), Some("done"));
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_records() {
        let registry = registry_with(RegistryConfig {
            grace: Duration::from_secs(0),
            ..RegistryConfig::default()
        });
        let (done, _t1) = registry.create(plan(), "q".to_string());
        let (live, _t2) = registry.create(plan(), "q".to_string());
        registry.publish(&done, completed_event());

        assert_eq!(registry.sweep_expired(), 1);
        assert!(registry.get(&done).is_none());
        assert!(registry.get(&live).is_some());
    }

    #[tokio::test]
    async fn test_cancel_only_live_executions() {
        let registry = registry_with(RegistryConfig::default());
        let (id, token) = registry.create(plan(), "q".to_string());
        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());

        registry.publish(&id, completed_event());
        assert!(!registry.cancel(&id));
    }

    #[tokio::test]
    async fn test_heartbeat_fills_idle_stream() {
        let registry = registry_with(RegistryConfig {
            heartbeat: Duration::from_millis(20),
            ..RegistryConfig::default()
        });
        let (id, _token) = registry.create(plan(), "q".to_string());

        let mut stream = registry.attach_subscriber(&id).expect("stream");
        assert_eq!(stream.next().await, Some(ExecutionEvent::Heartbeat {}));
    }

    #[tokio::test]
    async fn test_dropping_stream_detaches_subscriber() {
        let registry = registry_with(RegistryConfig::default());
        let (id, _token) = registry.create(plan(), "q".to_string());
        let stream = registry.attach_subscriber(&id).expect("stream");
        drop(stream);

        let records = registry.lock();
        assert!(records.get(&id).expect("record").subscribers.is_empty());
    }
}
