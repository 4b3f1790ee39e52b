use std::time::Duration;

use crate::error::Result;
use crate::packet::Packet;

/// What a single pull from a source produced.
#[derive(Debug)]
pub enum SourceEvent {
    Packet(Packet),
    /// Nothing arrived within the source's own wait window; pull again.
    Idle,
    /// The source will never produce another packet.
    Exhausted,
}

/// A lazy, possibly unbounded, sequence of packets produced at the source's
/// own pace. The ingest driver pulls; it never dictates timing.
pub trait PacketSource: Send {
    fn describe(&self) -> String;

    fn next_event(&mut self) -> Result<SourceEvent>;
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn next_event(&mut self) -> Result<SourceEvent> {
        (**self).next_event()
    }
}

/// Per-source packet id generator; ids stay unique for the source's lifetime.
#[derive(Debug, Clone)]
pub struct IdSequence {
    prefix: &'static str,
    next: u64,
}

impl IdSequence {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 1 }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{:06x}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Inclusive arrival-gap range used by the pacing sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn fixed(gap: Duration) -> Self {
        Self { min: gap, max: gap }
    }

    pub fn between(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

/// In-memory source over a fixed list of packets; handy for tests and for
/// feeding a controller from another component.
pub struct VecSource {
    packets: std::vec::IntoIter<Packet>,
}

impl VecSource {
    pub fn new(packets: Vec<Packet>) -> Self {
        Self {
            packets: packets.into_iter(),
        }
    }
}

impl PacketSource for VecSource {
    fn describe(&self) -> String {
        format!("in-memory ({} queued)", self.packets.len())
    }

    fn next_event(&mut self) -> Result<SourceEvent> {
        Ok(match self.packets.next() {
            Some(packet) => SourceEvent::Packet(packet),
            None => SourceEvent::Exhausted,
        })
    }
}
