use std::collections::VecDeque;

use crate::error::{PeekError, Result};
use crate::packet::Packet;

pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity history of the most recent packets, newest first.
pub struct CaptureBuffer {
    packets: VecDeque<Packet>,
    capacity: usize,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PeekError::ConfigError(
                "capture buffer capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            // one extra slot so the transient N+1 push never reallocates
            packets: VecDeque::with_capacity(capacity + 1),
            capacity,
        })
    }

    /// Pushes `packet` at the head and hands back the packet it displaced,
    /// if the buffer was already full.
    pub fn insert(&mut self, packet: Packet) -> Option<Packet> {
        self.packets.push_front(packet);
        if self.packets.len() > self.capacity {
            self.packets.pop_back()
        } else {
            None
        }
    }

    /// Owned copy of the resident packets, newest first.
    pub fn snapshot(&self) -> Vec<Packet> {
        self.packets.iter().cloned().collect()
    }

    /// Empties the buffer and returns everything it held, newest first.
    pub fn clear(&mut self) -> Vec<Packet> {
        self.packets.drain(..).collect()
    }

    pub fn newest(&self) -> Option<&Packet> {
        self.packets.front()
    }

    pub fn oldest(&self) -> Option<&Packet> {
        self.packets.back()
    }

    pub fn get(&self, index: usize) -> Option<&Packet> {
        self.packets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.packets.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self {
            packets: VecDeque::with_capacity(DEFAULT_CAPACITY + 1),
            capacity: DEFAULT_CAPACITY,
        }
    }
}
