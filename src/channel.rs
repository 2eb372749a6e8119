//! Per-run event log with independent subscriber cursors
//!
//! One writer appends; any number of subscribers read from sequence 0 at
//! their own pace. The log is kept for the run's lifetime so late
//! subscribers get a full replay before following live.

use std::sync::Arc;

use futures_util::stream::{self, Stream};
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::event::{EventPayload, SimulationEvent};
use crate::model::{epoch_seconds, RunId};

#[derive(Debug, Default)]
struct Log {
    events: Vec<SimulationEvent>,
    closed: bool,
}

struct Shared {
    run_id: RunId,
    log: RwLock<Log>,
    /// Bumped after every append or close to wake subscribers
    version: watch::Sender<u64>,
}

/// Append-only event log for one run
#[derive(Clone)]
pub struct EventChannel {
    shared: Arc<Shared>,
}

impl EventChannel {
    /// Create an empty, open channel for a run
    pub fn new(run_id: RunId) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                run_id,
                log: RwLock::new(Log::default()),
                version,
            }),
        }
    }

    /// Append an event and return its sequence id.
    ///
    /// A terminal payload closes the channel after it is written.
    pub fn append(&self, payload: EventPayload) -> Result<u64, ChannelError> {
        let sequence_id = {
            let mut log = self.shared.log.write();
            if log.closed {
                return Err(ChannelError::Closed);
            }
            let sequence_id = log.events.len() as u64;
            let terminal = payload.is_terminal();
            log.events.push(SimulationEvent {
                sequence_id,
                payload,
                timestamp: epoch_seconds(),
                run_id: self.shared.run_id,
            });
            if terminal {
                log.closed = true;
            }
            sequence_id
        };

        self.shared.version.send_modify(|v| *v += 1);
        Ok(sequence_id)
    }

    /// Copy of everything written so far
    pub fn snapshot(&self) -> Vec<SimulationEvent> {
        self.shared.log.read().events.clone()
    }

    /// New reader positioned at sequence 0
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            wake: self.shared.version.subscribe(),
            shared: Arc::clone(&self.shared),
            cursor: 0,
        }
    }
}

/// One reader's view of a run's log
pub struct Subscription {
    shared: Arc<Shared>,
    wake: watch::Receiver<u64>,
    cursor: usize,
}

enum Poll {
    Ready(SimulationEvent),
    Ended,
    Pending,
}

impl Subscription {
    fn poll_log(&mut self) -> Poll {
        let log = self.shared.log.read();
        if let Some(event) = log.events.get(self.cursor) {
            self.cursor += 1;
            Poll::Ready(event.clone())
        } else if log.closed {
            Poll::Ended
        } else {
            Poll::Pending
        }
    }

    /// Next event without waiting
    pub fn try_next(&mut self) -> Option<SimulationEvent> {
        match self.poll_log() {
            Poll::Ready(event) => Some(event),
            Poll::Ended | Poll::Pending => None,
        }
    }

    /// Wait for the next event; `None` once the log is closed and drained
    pub async fn next(&mut self) -> Option<SimulationEvent> {
        loop {
            match self.poll_log() {
                Poll::Ready(event) => return Some(event),
                Poll::Ended => return None,
                Poll::Pending => {}
            }
            if self.wake.changed().await.is_err() {
                // Writer side is gone; drain whatever is left
                return self.try_next();
            }
        }
    }

    /// Adapt into a `Stream` of events
    pub fn into_stream(self) -> impl Stream<Item = SimulationEvent> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|event| (event, sub))
        })
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,
}
