use std::io::ErrorKind;
use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use pnet::datalink::{self, Channel::Ethernet, Config, DataLinkReceiver, NetworkInterface};

use crate::error::{PeekError, Result};
use crate::frame::packet_from_frame;
use crate::source::{IdSequence, PacketSource, SourceEvent};

const READ_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub ipv4: Vec<String>,
    pub is_up: bool,
    pub is_loopback: bool,
}

pub fn list_interfaces() -> Vec<InterfaceInfo> {
    datalink::interfaces()
        .into_iter()
        .map(|iface| InterfaceInfo {
            ipv4: iface
                .ips
                .iter()
                .filter_map(|network| match network.ip() {
                    IpAddr::V4(ipv4) => Some(ipv4.to_string()),
                    IpAddr::V6(_) => None,
                })
                .collect(),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            name: iface.name,
        })
        .collect()
}

fn find_interface(name: &str) -> Result<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| PeekError::ConfigError(format!("no network interface named {}", name)))
}

/// Frames read from a datalink channel, classified at header level.
///
/// The channel is opened with a read timeout so the ingest loop regains
/// control regularly even on a silent link; a timeout surfaces as
/// `SourceEvent::Idle`.
pub struct LiveSource {
    interface: String,
    rx: Box<dyn DataLinkReceiver>,
    ids: IdSequence,
    skipped: u64,
}

impl LiveSource {
    pub fn open(interface_name: &str) -> Result<Self> {
        let interface = find_interface(interface_name)?;

        let config = Config {
            read_timeout: Some(READ_TIMEOUT),
            ..Default::default()
        };
        let rx = match datalink::channel(&interface, config) {
            Ok(Ethernet(_, rx)) => rx,
            Ok(_) => {
                return Err(PeekError::SourceError(format!(
                    "{} does not provide an Ethernet channel",
                    interface.name
                )))
            }
            Err(e) => {
                return Err(PeekError::SourceError(format!(
                    "failed to open channel on {}: {}",
                    interface.name, e
                )))
            }
        };

        info!("Opened datalink channel on {}", interface.name);
        Ok(Self {
            interface: interface.name,
            rx,
            ids: IdSequence::new("live"),
            skipped: 0,
        })
    }

    /// Frames seen but not classifiable (unknown ether type, truncated).
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl PacketSource for LiveSource {
    fn describe(&self) -> String {
        format!("live capture on {}", self.interface)
    }

    fn next_event(&mut self) -> Result<SourceEvent> {
        match self.rx.next() {
            Ok(frame) => match packet_from_frame(self.ids.next_id(), Utc::now(), frame) {
                Some(packet) => Ok(SourceEvent::Packet(packet?)),
                None => {
                    self.skipped += 1;
                    debug!("Skipped unclassified frame of {} bytes", frame.len());
                    Ok(SourceEvent::Idle)
                }
            },
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(SourceEvent::Idle)
            }
            Err(e) => Err(PeekError::SourceError(format!(
                "read on {} failed: {}",
                self.interface, e
            ))),
        }
    }
}
