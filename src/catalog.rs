use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityTier {
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SecurityTier::Low => "low",
            SecurityTier::Medium => "medium",
            SecurityTier::High => "high",
            SecurityTier::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolProfile {
    pub protocol: String,
    pub description: String,
    pub tier: SecurityTier,
    /// Canonical port, or "N/A" / "Various"
    pub port: String,
    pub encrypted: bool,
}

impl ProtocolProfile {
    pub fn new(
        protocol: &str,
        description: &str,
        tier: SecurityTier,
        port: &str,
        encrypted: bool,
    ) -> Self {
        Self {
            protocol: protocol.to_string(),
            description: description.to_string(),
            tier,
            port: port.to_string(),
            encrypted,
        }
    }

    fn unclassified() -> Self {
        Self::new(
            "UNKNOWN",
            "Unclassified traffic",
            SecurityTier::Unknown,
            "Unknown",
            false,
        )
    }

    pub fn is_sentinel(&self) -> bool {
        self.tier == SecurityTier::Unknown
    }
}

// --- Built-in protocol table ---
lazy_static! {
    static ref BUILTIN_PROFILES: Vec<ProtocolProfile> = vec![
        ProtocolProfile::new(
            "HTTP",
            "Hypertext Transfer Protocol - Unencrypted web traffic",
            SecurityTier::Low,
            "80",
            false,
        ),
        ProtocolProfile::new(
            "HTTPS",
            "Secure HTTP with TLS/SSL encryption",
            SecurityTier::High,
            "443",
            true,
        ),
        ProtocolProfile::new(
            "TCP",
            "Transmission Control Protocol - Reliable connection",
            SecurityTier::Medium,
            "Various",
            false,
        ),
        ProtocolProfile::new(
            "UDP",
            "User Datagram Protocol - Fast, connectionless",
            SecurityTier::Medium,
            "Various",
            false,
        ),
        ProtocolProfile::new(
            "DNS",
            "Domain Name System - Name resolution",
            SecurityTier::Medium,
            "53",
            false,
        ),
        ProtocolProfile::new(
            "ARP",
            "Address Resolution Protocol - MAC address mapping",
            SecurityTier::Low,
            "N/A",
            false,
        ),
        ProtocolProfile::new(
            "ICMP",
            "Internet Control Message Protocol - Network diagnostics",
            SecurityTier::Low,
            "N/A",
            false,
        ),
    ];
}

/// Registry of protocol security metadata.
///
/// Lookups never fail: identifiers that were never registered resolve to a
/// shared sentinel profile with an `Unknown` tier.
#[derive(Debug, Clone)]
pub struct ProtocolCatalog {
    profiles: HashMap<String, ProtocolProfile>,
    sentinel: ProtocolProfile,
}

impl ProtocolCatalog {
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            sentinel: ProtocolProfile::unclassified(),
        }
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for profile in BUILTIN_PROFILES.iter() {
            catalog.register(profile.clone());
        }
        catalog
    }

    /// Adds or replaces a profile, returning the one it displaced.
    pub fn register(&mut self, profile: ProtocolProfile) -> Option<ProtocolProfile> {
        self.profiles.insert(profile.protocol.clone(), profile)
    }

    pub fn resolve(&self, protocol: &str) -> &ProtocolProfile {
        self.profiles.get(protocol).unwrap_or(&self.sentinel)
    }

    pub fn contains(&self, protocol: &str) -> bool {
        self.profiles.contains_key(protocol)
    }

    pub fn is_encrypted(&self, protocol: &str) -> bool {
        self.resolve(protocol).encrypted
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Registered identifiers in lexical order.
    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProtocolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
