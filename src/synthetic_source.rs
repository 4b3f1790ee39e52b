use std::thread;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::packet::Packet;
use crate::source::{IdSequence, Pacing, PacketSource, SourceEvent};

const PROTOCOLS: [&str; 7] = ["HTTP", "HTTPS", "TCP", "UDP", "DNS", "ARP", "ICMP"];
const SOURCES: [&str; 5] = ["192.168.1.10", "10.0.0.1", "172.16.0.5", "8.8.8.8", "1.1.1.1"];
const DESTINATIONS: [&str; 5] = ["192.168.1.1", "10.0.0.10", "172.16.0.1", "8.8.4.4", "1.0.0.1"];

const MIN_FRAME: u32 = 64;
const MAX_FRAME: u32 = 1563;

/// Random traffic drawn from small address and protocol pools.
pub struct SyntheticSource {
    rng: StdRng,
    ids: IdSequence,
    pacing: Option<Pacing>,
    remaining: Option<u64>,
}

impl SyntheticSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            ids: IdSequence::new("syn"),
            pacing: None,
            remaining: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Stop after `count` packets instead of running forever.
    pub fn with_limit(mut self, count: u64) -> Self {
        self.remaining = Some(count);
        self
    }

    pub fn generate(&mut self) -> Result<Packet> {
        let protocol = *PROTOCOLS.choose(&mut self.rng).unwrap_or(&"TCP");
        let source = *SOURCES.choose(&mut self.rng).unwrap_or(&SOURCES[0]);
        let destination = *DESTINATIONS.choose(&mut self.rng).unwrap_or(&DESTINATIONS[0]);
        let length = self.rng.gen_range(MIN_FRAME..=MAX_FRAME);
        let digest: u32 = self.rng.gen();

        let mut builder = Packet::builder(self.ids.next_id(), protocol, length)
            .captured_at(Utc::now())
            .route(source, destination)
            .payload_digest(format!("0x{:08X}", digest));
        if protocol == "TCP" {
            builder = builder.flags(["SYN", "ACK"]);
        }
        builder.build()
    }

    fn wait(&mut self) {
        if let Some(pacing) = self.pacing {
            let gap = if pacing.min == pacing.max {
                pacing.min
            } else {
                self.rng.gen_range(pacing.min..=pacing.max)
            };
            thread::sleep(gap);
        }
    }
}

impl PacketSource for SyntheticSource {
    fn describe(&self) -> String {
        match self.pacing {
            Some(p) => format!(
                "synthetic traffic ({}-{} ms gaps)",
                p.min.as_millis(),
                p.max.as_millis()
            ),
            None => "synthetic traffic (unpaced)".to_string(),
        }
    }

    fn next_event(&mut self) -> Result<SourceEvent> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(SourceEvent::Exhausted);
            }
            *remaining -= 1;
        }

        self.wait();
        Ok(SourceEvent::Packet(self.generate()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_packets_are_valid() {
        let mut source = SyntheticSource::new(Some(7));
        for _ in 0..200 {
            let packet = source.generate().unwrap();
            assert!(PROTOCOLS.contains(&packet.protocol()));
            assert!(packet.length() >= MIN_FRAME && packet.length() <= MAX_FRAME);
            assert!(packet.payload_digest().starts_with("0x"));
            if packet.protocol() == "TCP" {
                assert_eq!(packet.flags().len(), 2);
            } else {
                assert!(packet.flags().is_empty());
            }
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut a = SyntheticSource::new(Some(42));
        let mut b = SyntheticSource::new(Some(42));
        for _ in 0..20 {
            let (pa, pb) = (a.generate().unwrap(), b.generate().unwrap());
            assert_eq!(pa.protocol(), pb.protocol());
            assert_eq!(pa.length(), pb.length());
            assert_eq!(pa.id(), pb.id());
        }
    }

    #[test]
    fn test_limit_exhausts_source() {
        let mut source = SyntheticSource::new(Some(1)).with_limit(3);
        let mut produced = 0;
        while let SourceEvent::Packet(_) = source.next_event().unwrap() {
            produced += 1;
        }
        assert_eq!(produced, 3);
    }
}
