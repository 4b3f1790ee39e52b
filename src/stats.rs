use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    Protocol,
    Source,
    Destination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry {
    pub key: String,
    pub count: usize,
}

/// Point-in-time copy of the aggregator's counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunningStats {
    pub total_ever_seen: u64,
    pub total_bytes: u64,
    pub packet_count: usize,
    pub protocols: HashMap<String, usize>,
    pub protocol_bytes: HashMap<String, u64>,
    pub sources: HashMap<String, usize>,
    pub destinations: HashMap<String, usize>,
}

impl RunningStats {
    pub fn average_packet_size(&self) -> f64 {
        if self.packet_count == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.packet_count as f64
    }

    pub fn counts(&self, kind: StatKind) -> &HashMap<String, usize> {
        match kind {
            StatKind::Protocol => &self.protocols,
            StatKind::Source => &self.sources,
            StatKind::Destination => &self.destinations,
        }
    }

    pub fn protocol_count(&self, protocol: &str) -> usize {
        self.protocols.get(protocol).copied().unwrap_or(0)
    }

    pub fn distinct_protocols(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packet_count == 0
    }
}

// Arrival sequence numbers of the resident packets sharing one key, oldest
// first. The buffer evicts in arrival order, so evictions always pop the front.
#[derive(Debug, Default)]
struct Tally {
    arrivals: VecDeque<u64>,
    bytes: u64,
}

impl Tally {
    fn count(&self) -> usize {
        self.arrivals.len()
    }

    fn first_observed(&self) -> u64 {
        self.arrivals.front().copied().unwrap_or(u64::MAX)
    }
}

type TallyMap = HashMap<String, Tally>;

fn add(map: &mut TallyMap, key: &str, arrival: u64, bytes: u64) {
    let tally = map.entry(key.to_string()).or_default();
    tally.arrivals.push_back(arrival);
    tally.bytes += bytes;
}

fn subtract(map: &mut TallyMap, kind: StatKind, key: &str, bytes: u64) {
    let Some(tally) = map.get_mut(key) else {
        panic!(
            "aggregation invariant violated: evicted {:?} key {} was never counted",
            kind, key
        );
    };
    tally.arrivals.pop_front();
    tally.bytes = tally.bytes.checked_sub(bytes).unwrap_or_else(|| {
        panic!(
            "aggregation invariant violated: byte total for {:?} key {} went negative",
            kind, key
        )
    });
    if tally.arrivals.is_empty() {
        map.remove(key);
    }
}

/// Counters kept in step with the capture buffer through insert/evict events.
///
/// Every update is O(1) in the number of resident packets; nothing here ever
/// rescans the buffer.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total_ever_seen: u64,
    bytes_in_buffer: u64,
    resident: usize,
    protocols: TallyMap,
    sources: TallyMap,
    destinations: TallyMap,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds counters from a buffer snapshot given newest first.
    pub fn from_packets(packets: &[Packet]) -> Self {
        let mut stats = Self::new();
        for packet in packets.iter().rev() {
            stats.on_insert(packet);
        }
        stats
    }

    pub fn on_insert(&mut self, packet: &Packet) {
        let arrival = self.total_ever_seen;
        let bytes = u64::from(packet.length());

        self.total_ever_seen += 1;
        self.bytes_in_buffer += bytes;
        self.resident += 1;

        add(&mut self.protocols, packet.protocol(), arrival, bytes);
        add(&mut self.sources, packet.source(), arrival, bytes);
        add(&mut self.destinations, packet.destination(), arrival, bytes);
    }

    pub fn on_evict(&mut self, packet: &Packet) {
        let bytes = u64::from(packet.length());

        assert!(
            self.resident > 0,
            "aggregation invariant violated: eviction of {} from an empty aggregate",
            packet.id()
        );
        self.resident -= 1;
        self.bytes_in_buffer = self.bytes_in_buffer.checked_sub(bytes).unwrap_or_else(|| {
            panic!(
                "aggregation invariant violated: buffer bytes went negative evicting {}",
                packet.id()
            )
        });

        subtract(&mut self.protocols, StatKind::Protocol, packet.protocol(), bytes);
        subtract(&mut self.sources, StatKind::Source, packet.source(), bytes);
        subtract(&mut self.destinations, StatKind::Destination, packet.destination(), bytes);
    }

    /// Drops every counter, including the lifetime total.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_ever_seen(&self) -> u64 {
        self.total_ever_seen
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_in_buffer
    }

    pub fn packet_count(&self) -> usize {
        self.resident
    }

    pub fn average_packet_size(&self) -> f64 {
        if self.resident == 0 {
            return 0.0;
        }
        self.bytes_in_buffer as f64 / self.resident as f64
    }

    pub fn snapshot(&self) -> RunningStats {
        let counts = |map: &TallyMap| -> HashMap<String, usize> {
            map.iter().map(|(k, t)| (k.clone(), t.count())).collect()
        };

        RunningStats {
            total_ever_seen: self.total_ever_seen,
            total_bytes: self.bytes_in_buffer,
            packet_count: self.resident,
            protocols: counts(&self.protocols),
            protocol_bytes: self
                .protocols
                .iter()
                .map(|(k, t)| (k.clone(), t.bytes))
                .collect(),
            sources: counts(&self.sources),
            destinations: counts(&self.destinations),
        }
    }

    /// The `n` busiest keys of `kind`. Equal counts are ordered by which key
    /// showed up first among the packets still in the buffer.
    pub fn top_n(&self, kind: StatKind, n: usize) -> Vec<TopEntry> {
        let map = match kind {
            StatKind::Protocol => &self.protocols,
            StatKind::Source => &self.sources,
            StatKind::Destination => &self.destinations,
        };

        let mut ranked: Vec<(&String, &Tally)> = map.iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.count()
                .cmp(&a.count())
                .then_with(|| a.first_observed().cmp(&b.first_observed()))
        });

        ranked
            .into_iter()
            .take(n)
            .map(|(key, tally)| TopEntry {
                key: key.clone(),
                count: tally.count(),
            })
            .collect()
    }
}

const BYTE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human-readable byte count: scaled by 1024 while the scaled value stays at
/// or above one, capped at GB, at most two decimals with trailing zeros dropped.
pub fn format_byte_count(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let mut rendered = format!("{:.2}", value);
    if rendered.contains('.') {
        rendered = rendered.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{} {}", rendered, BYTE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(id: &str, protocol: &str, src: &str, dst: &str, len: u32) -> Packet {
        Packet::builder(id, protocol, len)
            .route(src, dst)
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_and_evict_balance() {
        let mut stats = StatsAggregator::new();
        let p1 = packet("1", "TCP", "10.0.0.1", "10.0.0.10", 100);
        let p2 = packet("2", "UDP", "10.0.0.1", "8.8.4.4", 200);

        stats.on_insert(&p1);
        stats.on_insert(&p2);
        stats.on_evict(&p1);

        let snap = stats.snapshot();
        assert_eq!(snap.total_ever_seen, 2);
        assert_eq!(snap.packet_count, 1);
        assert_eq!(snap.total_bytes, 200);
        assert!(!snap.protocols.contains_key("TCP"));
        assert_eq!(snap.sources.get("10.0.0.1"), Some(&1));
        assert!(!snap.destinations.contains_key("10.0.0.10"));
        assert_eq!(snap.protocol_bytes.get("UDP"), Some(&200));
    }

    #[test]
    fn test_average_on_empty_is_zero() {
        let stats = StatsAggregator::new();
        assert_eq!(stats.average_packet_size(), 0.0);
        assert_eq!(stats.snapshot().average_packet_size(), 0.0);
    }

    #[test]
    fn test_top_n_ties_follow_first_observed() {
        let mut stats = StatsAggregator::new();
        let packets = [
            packet("1", "DNS", "a", "x", 10),
            packet("2", "ARP", "b", "x", 10),
            packet("3", "ICMP", "c", "x", 10),
            packet("4", "ARP", "b", "x", 10),
            packet("5", "DNS", "a", "x", 10),
        ];
        for p in &packets {
            stats.on_insert(p);
        }

        let top = stats.top_n(StatKind::Protocol, 3);
        let keys: Vec<&str> = top.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["DNS", "ARP", "ICMP"]);

        // DNS's oldest resident packet leaves, so ARP is now observed first
        stats.on_evict(&packets[0]);
        stats.on_insert(&packet("6", "DNS", "a", "x", 10));
        let top = stats.top_n(StatKind::Protocol, 2);
        assert_eq!(top[0].key, "ARP");
        assert_eq!(top[1].key, "DNS");
        assert_eq!(top[1].count, 2);
    }

    #[test]
    fn test_top_n_truncates() {
        let mut stats = StatsAggregator::new();
        for i in 0..10 {
            stats.on_insert(&packet(&i.to_string(), "TCP", &format!("h{}", i), "d", 1));
        }
        assert_eq!(stats.top_n(StatKind::Source, 5).len(), 5);
        assert_eq!(stats.top_n(StatKind::Destination, 5).len(), 1);
        assert!(stats.top_n(StatKind::Protocol, 0).is_empty());
    }

    #[test]
    #[should_panic(expected = "never counted")]
    fn test_evict_unknown_packet_panics() {
        let mut stats = StatsAggregator::new();
        stats.on_insert(&packet("1", "TCP", "a", "b", 10));
        stats.on_evict(&packet("2", "UDP", "a", "b", 10));
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let mut incremental = StatsAggregator::new();
        let packets: Vec<Packet> = (0..6)
            .map(|i| packet(&i.to_string(), if i % 2 == 0 { "TCP" } else { "HTTPS" }, "s", "d", 50 + i))
            .collect();
        for p in &packets {
            incremental.on_insert(p);
        }
        let newest_first: Vec<Packet> = packets.iter().rev().cloned().collect();
        let rebuilt = StatsAggregator::from_packets(&newest_first);
        assert_eq!(incremental.snapshot(), rebuilt.snapshot());
    }

    #[test]
    fn test_format_byte_count() {
        assert_eq!(format_byte_count(0), "0 B");
        assert_eq!(format_byte_count(512), "512 B");
        assert_eq!(format_byte_count(1023), "1023 B");
        assert_eq!(format_byte_count(1024), "1 KB");
        assert_eq!(format_byte_count(1536), "1.5 KB");
        assert_eq!(format_byte_count(1_048_576), "1 MB");
        assert_eq!(format_byte_count(1_300_000), "1.24 MB");
        assert_eq!(format_byte_count(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }
}
