use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{PeekError, Result};

/// One captured network event with header-level metadata only.
///
/// Packets are immutable once built; the fields are private and exposed
/// through accessors so nothing downstream of the source can rewrite them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    id: String,
    captured_at: DateTime<Utc>,
    source: String,
    destination: String,
    protocol: String,
    length: u32,
    summary: String,
    payload_digest: String,
    flags: Vec<String>,
}

impl Packet {
    pub fn builder(id: impl Into<String>, protocol: impl Into<String>, length: u32) -> PacketBuilder {
        PacketBuilder {
            id: id.into(),
            captured_at: None,
            source: String::new(),
            destination: String::new(),
            protocol: protocol.into(),
            length,
            summary: None,
            payload_digest: String::new(),
            flags: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn payload_digest(&self) -> &str {
        &self.payload_digest
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }
}

pub struct PacketBuilder {
    id: String,
    captured_at: Option<DateTime<Utc>>,
    source: String,
    destination: String,
    protocol: String,
    length: u32,
    summary: Option<String>,
    payload_digest: String,
    flags: Vec<String>,
}

impl PacketBuilder {
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    pub fn route(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.source = source.into();
        self.destination = destination.into();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn payload_digest(mut self, digest: impl Into<String>) -> Self {
        self.payload_digest = digest.into();
        self
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and freezes the packet. A zero length is rejected, as is an
    /// empty id or protocol identifier.
    pub fn build(self) -> Result<Packet> {
        if self.length == 0 {
            return Err(PeekError::ConfigError(format!(
                "packet {} has zero length",
                self.id
            )));
        }
        if self.id.is_empty() {
            return Err("packet id must not be empty".into());
        }
        if self.protocol.is_empty() {
            return Err(PeekError::ConfigError(format!(
                "packet {} has no protocol identifier",
                self.id
            )));
        }

        // "TCP packet from 10.0.0.1 to 10.0.0.10"
        let summary = self.summary.unwrap_or_else(|| {
            format!(
                "{} packet from {} to {}",
                self.protocol, self.source, self.destination
            )
        });

        Ok(Packet {
            id: self.id,
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
            source: self.source,
            destination: self.destination,
            protocol: self.protocol,
            length: self.length,
            summary,
            payload_digest: self.payload_digest,
            flags: self.flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_summary() {
        let packet = Packet::builder("p1", "TCP", 60)
            .route("10.0.0.1", "10.0.0.10")
            .flags(["SYN", "ACK"])
            .build()
            .unwrap();

        assert_eq!(packet.summary(), "TCP packet from 10.0.0.1 to 10.0.0.10");
        assert_eq!(packet.flags(), &["SYN".to_string(), "ACK".to_string()]);
        assert!(packet.payload_digest().is_empty());
    }

    #[test]
    fn test_zero_length_rejected() {
        let result = Packet::builder("p0", "UDP", 0).build();
        match result {
            Err(PeekError::ConfigError(msg)) => assert!(msg.contains("zero length")),
            other => panic!("Expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_protocol_rejected() {
        assert!(Packet::builder("p2", "", 10).build().is_err());
        assert!(Packet::builder("", "DNS", 10).build().is_err());
    }
}
