//! Event streams
//!
//! A subscriber's ordered view of one execution: replay of the log as of
//! attach time, then live events until the terminal event, with heartbeats
//! filling idle gaps. The replay/live hand-off is atomic at attach time, so
//! no event is duplicated or lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use planwright_core::ExecutionEvent;

use crate::registry::ExecutionRegistry;

/// Ordered per-execution event stream handed to one subscriber.
///
/// The stream ends (returns `None`) after the terminal event has been
/// delivered, or when the execution record is swept away.
pub struct EventStream {
    registry: Arc<ExecutionRegistry>,
    execution_id: String,
    subscriber_id: u64,
    replay: VecDeque<ExecutionEvent>,
    live: mpsc::Receiver<ExecutionEvent>,
    heartbeat: Interval,
    finished: bool,
}

impl EventStream {
    pub(crate) fn new(
        registry: Arc<ExecutionRegistry>,
        execution_id: String,
        subscriber_id: u64,
        replay: VecDeque<ExecutionEvent>,
        live: mpsc::Receiver<ExecutionEvent>,
        heartbeat_period: Duration,
    ) -> Self {
        let period = heartbeat_period.max(Duration::from_millis(1));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            registry,
            execution_id,
            subscriber_id,
            replay,
            live,
            heartbeat,
            finished: false,
        }
    }

    /// Execution this stream observes.
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Next event, or `None` once the stream has closed.
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        if self.finished {
            return None;
        }

        if let Some(event) = self.replay.pop_front() {
            return Some(self.deliver(event));
        }

        tokio::select! {
            received = self.live.recv() => {
                match received {
                    Some(event) => Some(self.deliver(event)),
                    // Publisher side gone: record swept or subscriber
                    // detached as stale.
                    None => {
                        self.finished = true;
                        None
                    }
                }
            }
            _ = self.heartbeat.tick() => Some(ExecutionEvent::Heartbeat {}),
        }
    }

    fn deliver(&mut self, event: ExecutionEvent) -> ExecutionEvent {
        if event.is_terminal() {
            self.finished = true;
        }
        self.heartbeat.reset();
        event
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.registry
            .detach_subscriber(&self.execution_id, self.subscriber_id);
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("execution_id", &self.execution_id)
            .field("subscriber_id", &self.subscriber_id)
            .field("finished", &self.finished)
            .finish()
    }
}
