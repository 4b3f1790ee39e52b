use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_queue::ArrayQueue;
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::buffer::CaptureBuffer;
use crate::config::CaptureConfig;
use crate::error::{PeekError, Result};
use crate::packet::Packet;
use crate::stats::{RunningStats, StatKind, StatsAggregator, TopEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CaptureState::Idle => "idle",
            CaptureState::Running => "running",
            CaptureState::Paused => "paused",
            CaptureState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Outcome of offering one packet to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    Accepted { evicted: bool },
    /// Not ingested because the controller was not running.
    Dropped(CaptureState),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Ingested {
        packet: Packet,
        evicted_id: Option<String>,
    },
    StateChanged {
        from: CaptureState,
        to: CaptureState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    pub state: CaptureState,
    pub progress: u8,
    pub buffered: usize,
    pub capacity: usize,
    pub total_ever_seen: u64,
    pub dropped: u64,
}

const PROGRESS_STEP: u8 = 2;

// Everything the single writer mutates; only ever touched under one lock.
struct Pipeline {
    state: CaptureState,
    buffer: CaptureBuffer,
    stats: StatsAggregator,
    progress: u8,
    // refused offers over the controller's lifetime
    dropped: u64,
}

impl Pipeline {
    fn clear(&mut self) {
        let discarded = self.buffer.clear();
        self.stats.reset();
        self.progress = 0;
        if !discarded.is_empty() {
            debug!("Discarded {} buffered packets", discarded.len());
        }
    }
}

struct SubscriberQueue {
    events: ArrayQueue<CaptureEvent>,
    overflowed: AtomicU64,
}

/// Bounded feed of controller events for one reader.
///
/// When the reader falls behind, the oldest undelivered events are discarded;
/// ingest never waits for a subscriber.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    pub fn try_next(&self) -> Option<CaptureEvent> {
        self.queue.events.pop()
    }

    pub fn drain(&self) -> Vec<CaptureEvent> {
        std::iter::from_fn(|| self.queue.events.pop()).collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.events.len()
    }

    /// Events discarded so far because this subscriber was full.
    pub fn overflowed(&self) -> u64 {
        self.queue.overflowed.load(Ordering::Relaxed)
    }
}

/// Cloneable handle over the capture pipeline.
///
/// All mutation (state transitions and packet intake) is serialised through
/// one mutex, so a `pause()` or `stop()` that has returned is guaranteed to
/// be observed by the next `offer()`. Reads hand out owned snapshots.
#[derive(Clone)]
pub struct CaptureController {
    pipeline: Arc<Mutex<Pipeline>>,
    subscribers: Arc<Mutex<Vec<Weak<SubscriberQueue>>>>,
}

impl CaptureController {
    pub fn new(capacity: usize) -> Result<Self> {
        let buffer = CaptureBuffer::new(capacity)?;
        Ok(Self {
            pipeline: Arc::new(Mutex::new(Pipeline {
                state: CaptureState::Idle,
                buffer,
                stats: StatsAggregator::new(),
                progress: 0,
                dropped: 0,
            })),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.capacity)
    }

    // --- State transitions ---

    /// Begins (or resumes) intake. From idle or stopped the buffer and all
    /// counters are cleared first; from paused the existing data is kept.
    pub fn start(&self) -> CaptureState {
        let mut pipeline = self.pipeline.lock();
        let from = pipeline.state;
        match from {
            CaptureState::Running => return from,
            CaptureState::Paused => info!("Resuming capture"),
            CaptureState::Idle | CaptureState::Stopped => {
                pipeline.clear();
                info!("Starting capture (buffer capacity {})", pipeline.buffer.capacity());
            }
        }
        self.transition(&mut pipeline, CaptureState::Running)
    }

    pub fn pause(&self) -> CaptureState {
        let mut pipeline = self.pipeline.lock();
        if pipeline.state != CaptureState::Running {
            return pipeline.state;
        }
        info!("Pausing capture with {} packets buffered", pipeline.buffer.len());
        self.transition(&mut pipeline, CaptureState::Paused)
    }

    /// Halts intake and freezes the buffer and statistics as they are.
    pub fn stop(&self) -> CaptureState {
        let mut pipeline = self.pipeline.lock();
        match pipeline.state {
            CaptureState::Running | CaptureState::Paused => {
                pipeline.progress = 0;
                info!(
                    "Stopping capture after {} packets",
                    pipeline.stats.total_ever_seen()
                );
                self.transition(&mut pipeline, CaptureState::Stopped)
            }
            state => state,
        }
    }

    /// Back to idle from any state, dropping buffered packets and counters.
    pub fn reset(&self) -> CaptureState {
        let mut pipeline = self.pipeline.lock();
        pipeline.clear();
        if pipeline.state == CaptureState::Idle {
            return CaptureState::Idle;
        }
        info!("Capture reset");
        self.transition(&mut pipeline, CaptureState::Idle)
    }

    fn transition(&self, pipeline: &mut Pipeline, to: CaptureState) -> CaptureState {
        let from = pipeline.state;
        pipeline.state = to;
        debug!("Capture state {} -> {}", from, to);
        self.publish(|| CaptureEvent::StateChanged { from, to });
        to
    }

    pub fn current_state(&self) -> CaptureState {
        self.pipeline.lock().state
    }

    // --- Ingest ---

    /// Single ingest path. The eviction is applied to the aggregate before
    /// the new packet is counted, all under the pipeline lock.
    pub fn offer(&self, packet: Packet) -> Intake {
        let mut pipeline = self.pipeline.lock();
        if pipeline.state != CaptureState::Running {
            pipeline.dropped += 1;
            return Intake::Dropped(pipeline.state);
        }

        let pipeline = &mut *pipeline;
        let announced = self.has_subscribers().then(|| packet.clone());
        let evicted = pipeline.buffer.insert(packet);
        if let Some(old) = &evicted {
            pipeline.stats.on_evict(old);
        }
        match pipeline.buffer.newest() {
            Some(newest) => pipeline.stats.on_insert(newest),
            None => unreachable!("buffer is empty right after an insert"),
        }
        pipeline.progress = (pipeline.progress + PROGRESS_STEP) % 100;

        if let Some(packet) = announced {
            let evicted_id = evicted.as_ref().map(|p| p.id().to_string());
            self.publish(move || CaptureEvent::Ingested {
                packet: packet.clone(),
                evicted_id: evicted_id.clone(),
            });
        }

        Intake::Accepted {
            evicted: evicted.is_some(),
        }
    }

    // --- Read side: owned snapshots only ---

    pub fn packets(&self) -> Vec<Packet> {
        self.pipeline.lock().buffer.snapshot()
    }

    pub fn stats(&self) -> RunningStats {
        self.pipeline.lock().stats.snapshot()
    }

    pub fn top_n(&self, kind: StatKind, n: usize) -> Vec<TopEntry> {
        self.pipeline.lock().stats.top_n(kind, n)
    }

    pub fn average_packet_size(&self) -> f64 {
        self.pipeline.lock().stats.average_packet_size()
    }

    pub fn total_ever_seen(&self) -> u64 {
        self.pipeline.lock().stats.total_ever_seen()
    }

    pub fn progress(&self) -> u8 {
        self.pipeline.lock().progress
    }

    pub fn capacity(&self) -> usize {
        self.pipeline.lock().buffer.capacity()
    }

    pub fn status(&self) -> CaptureStatus {
        let pipeline = self.pipeline.lock();
        CaptureStatus {
            state: pipeline.state,
            progress: pipeline.progress,
            buffered: pipeline.buffer.len(),
            capacity: pipeline.buffer.capacity(),
            total_ever_seen: pipeline.stats.total_ever_seen(),
            dropped: pipeline.dropped,
        }
    }

    /// Packets and statistics taken under the same lock, so they describe
    /// exactly the same buffer contents.
    pub fn consistent_snapshot(&self) -> (Vec<Packet>, RunningStats) {
        let pipeline = self.pipeline.lock();
        (pipeline.buffer.snapshot(), pipeline.stats.snapshot())
    }

    // --- Subscribers ---

    pub fn subscribe(&self, capacity: usize) -> Result<Subscription> {
        if capacity == 0 {
            return Err(PeekError::ConfigError(
                "subscription capacity must be at least 1".to_string(),
            ));
        }
        let queue = Arc::new(SubscriberQueue {
            events: ArrayQueue::new(capacity),
            overflowed: AtomicU64::new(0),
        });
        self.subscribers.lock().push(Arc::downgrade(&queue));
        Ok(Subscription { queue })
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    fn publish<F>(&self, make_event: F)
    where
        F: Fn() -> CaptureEvent,
    {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| match weak.upgrade() {
            Some(queue) => {
                if queue.events.force_push(make_event()).is_some() {
                    queue.overflowed.fetch_add(1, Ordering::Relaxed);
                }
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(id: &str, protocol: &str, len: u32) -> Packet {
        Packet::builder(id, protocol, len)
            .route("10.0.0.1", "10.0.0.10")
            .build()
            .unwrap()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let controller = CaptureController::new(10).unwrap();
        assert_eq!(controller.current_state(), CaptureState::Idle);
        assert!(matches!(CaptureController::new(0), Err(PeekError::ConfigError(_))));
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let controller = CaptureController::new(10).unwrap();
        assert_eq!(controller.pause(), CaptureState::Idle);
        assert_eq!(controller.stop(), CaptureState::Idle);

        assert_eq!(controller.start(), CaptureState::Running);
        controller.offer(packet("1", "TCP", 10));
        assert_eq!(controller.start(), CaptureState::Running);
        assert_eq!(controller.packets().len(), 1);

        assert_eq!(controller.pause(), CaptureState::Paused);
        assert_eq!(controller.pause(), CaptureState::Paused);
        assert_eq!(controller.stop(), CaptureState::Stopped);
        assert_eq!(controller.stop(), CaptureState::Stopped);
        assert_eq!(controller.pause(), CaptureState::Stopped);
    }

    #[test]
    fn test_resume_keeps_data_restart_clears() {
        let controller = CaptureController::new(10).unwrap();
        controller.start();
        controller.offer(packet("1", "TCP", 10));
        controller.pause();
        controller.start();
        assert_eq!(controller.packets().len(), 1);

        controller.stop();
        assert_eq!(controller.packets().len(), 1);
        assert_eq!(controller.progress(), 0);

        controller.start();
        assert!(controller.packets().is_empty());
        assert_eq!(controller.total_ever_seen(), 0);
    }

    #[test]
    fn test_offer_outside_running_is_dropped() {
        let controller = CaptureController::new(10).unwrap();
        assert_eq!(
            controller.offer(packet("1", "UDP", 10)),
            Intake::Dropped(CaptureState::Idle)
        );
        controller.start();
        controller.stop();
        assert_eq!(
            controller.offer(packet("2", "UDP", 10)),
            Intake::Dropped(CaptureState::Stopped)
        );
        assert!(controller.packets().is_empty());
        assert_eq!(controller.status().dropped, 2);
    }

    #[test]
    fn test_progress_wraps() {
        let controller = CaptureController::new(5).unwrap();
        controller.start();
        for i in 0..51 {
            controller.offer(packet(&i.to_string(), "ICMP", 64));
        }
        assert_eq!(controller.progress(), 2);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let controller = CaptureController::new(3).unwrap();
        controller.start();
        controller.offer(packet("1", "DNS", 70));
        controller.pause();
        assert_eq!(controller.reset(), CaptureState::Idle);
        assert!(controller.packets().is_empty());
        assert!(controller.stats().is_empty());
        assert_eq!(controller.reset(), CaptureState::Idle);
    }

    #[test]
    fn test_subscription_drops_oldest() {
        let controller = CaptureController::new(10).unwrap();
        let subscription = controller.subscribe(2).unwrap();
        controller.start();
        for i in 0..4 {
            controller.offer(packet(&format!("p{}", i), "TCP", 40));
        }

        // start event plus four ingests, only the last two survive
        assert_eq!(subscription.pending(), 2);
        assert_eq!(subscription.overflowed(), 3);
        let ids: Vec<String> = subscription
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                CaptureEvent::Ingested { packet, .. } => Some(packet.id().to_string()),
                CaptureEvent::StateChanged { .. } => None,
            })
            .collect();
        assert_eq!(ids, vec!["p2", "p3"]);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let controller = CaptureController::new(10).unwrap();
        let subscription = controller.subscribe(4).unwrap();
        drop(subscription);
        controller.start();
        assert!(!controller.has_subscribers());
    }

    #[test]
    fn test_eviction_reported_to_subscribers() {
        let controller = CaptureController::new(1).unwrap();
        controller.start();
        let subscription = controller.subscribe(8).unwrap();
        controller.offer(packet("a", "TCP", 10));
        assert_eq!(controller.offer(packet("b", "TCP", 10)), Intake::Accepted { evicted: true });

        let last = subscription.drain().pop().unwrap();
        assert_eq!(
            last,
            CaptureEvent::Ingested {
                packet: packet_with_id(&controller, "b"),
                evicted_id: Some("a".to_string()),
            }
        );
    }

    fn packet_with_id(controller: &CaptureController, id: &str) -> Packet {
        controller
            .packets()
            .into_iter()
            .find(|p| p.id() == id)
            .unwrap()
    }
}
