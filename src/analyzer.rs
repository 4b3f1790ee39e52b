use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{ProtocolCatalog, ProtocolProfile, SecurityTier};
use crate::stats::RunningStats;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SecurityOverview {
    pub encrypted_count: usize,
    pub total_count: usize,
    /// 0.0..=1.0, zero when nothing is buffered
    pub encrypted_ratio: f64,
}

impl SecurityOverview {
    pub fn encrypted_percentage(&self) -> f64 {
        self.encrypted_ratio * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolShare {
    pub protocol: String,
    pub count: usize,
    pub percentage: f64,
    pub profile: ProtocolProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Advisory {
    PreferEncryptedTransport,
    WatchArpSpoofing,
    EncryptNameResolution,
    RoutineAnalysis,
}

impl Advisory {
    pub fn severity(&self) -> Severity {
        match self {
            Advisory::PreferEncryptedTransport => Severity::Danger,
            Advisory::WatchArpSpoofing | Advisory::EncryptNameResolution => Severity::Warning,
            Advisory::RoutineAnalysis => Severity::Info,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Advisory::PreferEncryptedTransport => {
                "Consider using HTTPS instead of HTTP for web traffic"
            }
            Advisory::WatchArpSpoofing => "Monitor ARP traffic for potential spoofing attacks",
            Advisory::EncryptNameResolution => {
                "Consider using DNS over HTTPS (DoH) for encrypted name resolution"
            }
            Advisory::RoutineAnalysis => {
                "Regular packet analysis helps identify security vulnerabilities"
            }
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

const ENCRYPTION_FLOOR: f64 = 0.5;

/// Security posture derived from aggregated counters and the protocol catalog.
///
/// The analyzer is stateless apart from its catalog; every query takes a
/// `RunningStats` snapshot, so results are consistent for that snapshot even
/// while ingest continues.
#[derive(Debug, Clone)]
pub struct ProtocolAnalyzer {
    catalog: Arc<ProtocolCatalog>,
}

impl ProtocolAnalyzer {
    pub fn new(catalog: Arc<ProtocolCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ProtocolCatalog {
        &self.catalog
    }

    pub fn security_overview(&self, stats: &RunningStats) -> SecurityOverview {
        let encrypted_count: usize = stats
            .protocols
            .iter()
            .filter(|(protocol, _)| self.catalog.is_encrypted(protocol))
            .map(|(_, count)| *count)
            .sum();
        let total_count = stats.packet_count;

        let encrypted_ratio = if total_count == 0 {
            0.0
        } else {
            encrypted_count as f64 / total_count as f64
        };

        SecurityOverview {
            encrypted_count,
            total_count,
            encrypted_ratio,
        }
    }

    /// Resident protocols by descending count, ties in lexical order.
    pub fn per_protocol_breakdown(&self, stats: &RunningStats) -> Vec<ProtocolShare> {
        let total = stats.packet_count;
        let mut shares: Vec<ProtocolShare> = stats
            .protocols
            .iter()
            .map(|(protocol, &count)| ProtocolShare {
                protocol: protocol.clone(),
                count,
                percentage: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64 * 100.0
                },
                profile: self.catalog.resolve(protocol).clone(),
            })
            .collect();

        shares.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.protocol.cmp(&b.protocol))
        });
        shares
    }

    /// Fixed-order advisories: encryption ratio, ARP, DNS, then the general
    /// advisory which is always present.
    pub fn recommendations(&self, stats: &RunningStats) -> Vec<Advisory> {
        let mut advisories = Vec::with_capacity(4);

        if self.security_overview(stats).encrypted_ratio < ENCRYPTION_FLOOR {
            advisories.push(Advisory::PreferEncryptedTransport);
        }
        if stats.protocol_count("ARP") > 0 {
            advisories.push(Advisory::WatchArpSpoofing);
        }
        if stats.protocol_count("DNS") > 0 {
            advisories.push(Advisory::EncryptNameResolution);
        }
        advisories.push(Advisory::RoutineAnalysis);

        advisories
    }

    pub fn tier_breakdown(&self, stats: &RunningStats) -> BTreeMap<SecurityTier, usize> {
        let mut tiers = BTreeMap::new();
        for (protocol, count) in &stats.protocols {
            *tiers.entry(self.catalog.resolve(protocol).tier).or_insert(0) += count;
        }
        tiers
    }
}

impl Default for ProtocolAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(ProtocolCatalog::builtin()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::stats::StatsAggregator;

    fn stats_for(protocols: &[&str]) -> RunningStats {
        let mut stats = StatsAggregator::new();
        for (i, protocol) in protocols.iter().enumerate() {
            let packet = Packet::builder(i.to_string(), *protocol, 100)
                .route("192.168.1.10", "192.168.1.1")
                .build()
                .unwrap();
            stats.on_insert(&packet);
        }
        stats.snapshot()
    }

    #[test]
    fn test_security_overview_counts_encrypted() {
        let analyzer = ProtocolAnalyzer::default();
        let overview = analyzer.security_overview(&stats_for(&["HTTPS", "HTTPS", "HTTP", "DNS"]));
        assert_eq!(overview.encrypted_count, 2);
        assert_eq!(overview.total_count, 4);
        assert!((overview.encrypted_ratio - 0.5).abs() < f64::EPSILON);
        assert!((overview.encrypted_percentage() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_order_is_deterministic() {
        let analyzer = ProtocolAnalyzer::default();
        let stats = stats_for(&["UDP", "TCP", "ARP", "TCP", "UDP", "ICMP"]);

        let names: Vec<String> = analyzer
            .per_protocol_breakdown(&stats)
            .into_iter()
            .map(|share| share.protocol)
            .collect();
        assert_eq!(names, vec!["TCP", "UDP", "ARP", "ICMP"]);

        for _ in 0..5 {
            assert_eq!(analyzer.per_protocol_breakdown(&stats), analyzer.per_protocol_breakdown(&stats));
        }
    }

    #[test]
    fn test_breakdown_tolerates_unknown_protocols() {
        let analyzer = ProtocolAnalyzer::default();
        let breakdown = analyzer.per_protocol_breakdown(&stats_for(&["QUIC", "HTTPS"]));
        let quic = breakdown.iter().find(|s| s.protocol == "QUIC").unwrap();
        assert_eq!(quic.profile.tier, SecurityTier::Unknown);
        assert!((quic.percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_recommendations_fixed_order() {
        let analyzer = ProtocolAnalyzer::default();
        let advice = analyzer.recommendations(&stats_for(&["ARP", "DNS", "HTTP"]));
        assert_eq!(
            advice,
            vec![
                Advisory::PreferEncryptedTransport,
                Advisory::WatchArpSpoofing,
                Advisory::EncryptNameResolution,
                Advisory::RoutineAnalysis,
            ]
        );

        let advice = analyzer.recommendations(&stats_for(&["HTTPS", "HTTPS", "TCP"]));
        assert_eq!(advice, vec![Advisory::RoutineAnalysis]);
        assert_eq!(advice[0].severity(), Severity::Info);
    }

    #[test]
    fn test_tier_breakdown() {
        let analyzer = ProtocolAnalyzer::default();
        let tiers = analyzer.tier_breakdown(&stats_for(&["HTTP", "ARP", "HTTPS", "SCTP"]));
        assert_eq!(tiers.get(&SecurityTier::Low), Some(&2));
        assert_eq!(tiers.get(&SecurityTier::High), Some(&1));
        assert_eq!(tiers.get(&SecurityTier::Unknown), Some(&1));
        assert_eq!(tiers.get(&SecurityTier::Medium), None);
    }
}
