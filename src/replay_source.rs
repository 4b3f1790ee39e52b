use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PeekError, Result};
use crate::packet::Packet;
use crate::source::{PacketSource, SourceEvent};

const FLAG_SEPARATOR: &str = "|";

/// One CSV row of a replay file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    pub id: String,
    pub captured_at: String,
    pub source: String,
    pub destination: String,
    pub protocol: String,
    pub length: u32,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub payload_digest: String,
    #[serde(default)]
    pub flags: String,
}

impl PacketRecord {
    pub fn from_packet(packet: &Packet) -> Self {
        Self {
            id: packet.id().to_string(),
            captured_at: packet.captured_at().to_rfc3339(),
            source: packet.source().to_string(),
            destination: packet.destination().to_string(),
            protocol: packet.protocol().to_string(),
            length: packet.length(),
            summary: packet.summary().to_string(),
            payload_digest: packet.payload_digest().to_string(),
            flags: packet.flags().join(FLAG_SEPARATOR),
        }
    }

    pub fn into_packet(self) -> Result<Packet> {
        let captured_at = DateTime::parse_from_rfc3339(&self.captured_at)?.with_timezone(&Utc);
        let flags: Vec<&str> = self
            .flags
            .split(FLAG_SEPARATOR)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();

        let mut builder = Packet::builder(self.id, self.protocol, self.length)
            .captured_at(captured_at)
            .route(self.source, self.destination)
            .payload_digest(self.payload_digest)
            .flags(flags);
        if !self.summary.is_empty() {
            builder = builder.summary(self.summary);
        }
        builder.build()
    }
}

/// Replays packets recorded as CSV, optionally with a fixed gap between them.
pub struct ReplaySource<R: Read + Send> {
    origin: String,
    records: csv::DeserializeRecordsIntoIter<R, PacketRecord>,
    gap: Option<Duration>,
    replayed: u64,
}

impl ReplaySource<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            PeekError::IoError(format!("cannot open replay file {}: {}", path.display(), e))
        })?;
        Ok(Self::from_reader(file, path.display().to_string()))
    }
}

impl<R: Read + Send> ReplaySource<R> {
    pub fn from_reader(reader: R, origin: impl Into<String>) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_deserialize();

        Self {
            origin: origin.into(),
            records,
            gap: None,
            replayed: 0,
        }
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = Some(gap);
        self
    }

    pub fn replayed(&self) -> u64 {
        self.replayed
    }
}

impl<R: Read + Send> PacketSource for ReplaySource<R> {
    fn describe(&self) -> String {
        format!("replay of {}", self.origin)
    }

    fn next_event(&mut self) -> Result<SourceEvent> {
        let Some(record) = self.records.next() else {
            debug!("Replay of {} finished after {} packets", self.origin, self.replayed);
            return Ok(SourceEvent::Exhausted);
        };

        let packet = record?.into_packet()?;
        if let Some(gap) = self.gap {
            if self.replayed > 0 {
                thread::sleep(gap);
            }
        }
        self.replayed += 1;
        Ok(SourceEvent::Packet(packet))
    }
}

#[cfg(test)]
pub(crate) fn write_records<W: std::io::Write>(writer: W, packets: &[Packet]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for packet in packets {
        writer.serialize(PacketRecord::from_packet(packet))?;
    }
    writer.flush()?;
    Ok(())
}
