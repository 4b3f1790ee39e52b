//! Packet capture pipeline: sources feed a bounded newest-first buffer whose
//! running statistics are kept in step with every insert and eviction, and
//! a protocol analyzer reads security posture off those statistics.

pub mod analyzer;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod live_capture;
pub mod packet;
pub mod replay_source;
pub mod source;
pub mod stats;
pub mod synthetic_source;


pub use analyzer::{Advisory, ProtocolAnalyzer, ProtocolShare, SecurityOverview, Severity};
pub use buffer::CaptureBuffer;
pub use catalog::{ProtocolCatalog, ProtocolProfile, SecurityTier};
pub use config::{CaptureConfig, SourceConfig};
pub use controller::{CaptureController, CaptureEvent, CaptureState, CaptureStatus, Intake, Subscription};
pub use error::{PeekError, Result};
pub use ingest::{run_ingest, spawn_ingest, IngestReport};
pub use packet::{Packet, PacketBuilder};
pub use source::{PacketSource, SourceEvent};
pub use stats::{format_byte_count, RunningStats, StatKind, StatsAggregator, TopEntry};
