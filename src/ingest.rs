use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::controller::{CaptureController, Intake};
use crate::error::{PeekError, Result};
use crate::source::{PacketSource, SourceEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub pulled: u64,
    pub accepted: u64,
    pub evictions: u64,
    pub dropped: u64,
    pub errors: u64,
    pub exhausted: bool,
}

/// Pulls from `source` until it is exhausted, the shutdown channel fires (or
/// its sender goes away), or the source fails `max_consecutive_errors` times
/// in a row. Every packet is offered to the controller, which decides
/// whether it is ingested.
pub fn run_ingest(
    controller: &CaptureController,
    source: &mut dyn PacketSource,
    shutdown: &Receiver<()>,
    max_consecutive_errors: u32,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        source: source.describe(),
        ..Default::default()
    };
    let mut consecutive_errors = 0u32;

    info!("Ingest started from {}", report.source);
    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                debug!("Ingest shutdown requested");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match source.next_event() {
            Ok(SourceEvent::Packet(packet)) => {
                consecutive_errors = 0;
                report.pulled += 1;
                match controller.offer(packet) {
                    Intake::Accepted { evicted } => {
                        report.accepted += 1;
                        if evicted {
                            report.evictions += 1;
                        }
                    }
                    Intake::Dropped(_) => report.dropped += 1,
                }
            }
            Ok(SourceEvent::Idle) => consecutive_errors = 0,
            Ok(SourceEvent::Exhausted) => {
                report.exhausted = true;
                info!("Source {} exhausted", report.source);
                break;
            }
            Err(e) => {
                report.errors += 1;
                consecutive_errors += 1;
                warn!("Error reading from {}: {}", report.source, e);
                if consecutive_errors >= max_consecutive_errors {
                    error!(
                        "Giving up on {} after {} consecutive errors",
                        report.source, consecutive_errors
                    );
                    return Err(PeekError::SourceError(format!(
                        "{} failed {} times in a row, last error: {}",
                        report.source, consecutive_errors, e
                    )));
                }
            }
        }
    }

    info!(
        "Ingest finished: {} pulled, {} accepted, {} dropped, {} errors",
        report.pulled, report.accepted, report.dropped, report.errors
    );
    Ok(report)
}

/// Runs [`run_ingest`] on a dedicated thread.
pub fn spawn_ingest(
    controller: CaptureController,
    mut source: Box<dyn PacketSource>,
    shutdown: Receiver<()>,
    max_consecutive_errors: u32,
) -> Result<JoinHandle<Result<IngestReport>>> {
    let handle = thread::Builder::new()
        .name("peek-ingest".to_string())
        .spawn(move || run_ingest(&controller, source.as_mut(), &shutdown, max_consecutive_errors))?;
    Ok(handle)
}
