use chrono::{DateTime, Utc};
use pnet::packet::arp::{ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet as _;

use crate::error::Result;
use crate::packet::Packet;

// TCP flag bits, low byte of the flags field
const FIN: u8 = 0x01;
const SYN: u8 = 0x02;
const RST: u8 = 0x04;
const PSH: u8 = 0x08;
const ACK: u8 = 0x10;
const URG: u8 = 0x20;
const ECE: u8 = 0x40;
const CWR: u8 = 0x80;

const FLAG_NAMES: [(u8, &str); 8] = [
    (SYN, "SYN"),
    (ACK, "ACK"),
    (FIN, "FIN"),
    (RST, "RST"),
    (PSH, "PSH"),
    (URG, "URG"),
    (ECE, "ECE"),
    (CWR, "CWR"),
];

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;
const DNS_PORT: u16 = 53;

/// Header-level view of one frame, before it becomes an immutable `Packet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub protocol: String,
    pub source: String,
    pub destination: String,
    pub summary: String,
    pub payload_digest: String,
    pub flags: Vec<String>,
}

pub fn tcp_flag_names(flags: u8) -> Vec<String> {
    FLAG_NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// "0x" plus the first four payload bytes in upper-case hex; "0x" alone for
/// an empty payload.
pub fn payload_digest(payload: &[u8]) -> String {
    let mut digest = String::from("0x");
    for byte in payload.iter().take(4) {
        digest.push_str(&format!("{:02X}", byte));
    }
    digest
}

fn port_protocol(base: &str, src_port: u16, dst_port: u16) -> String {
    let either = |port: u16| src_port == port || dst_port == port;
    if either(DNS_PORT) {
        "DNS".to_string()
    } else if base == "TCP" && either(HTTPS_PORT) {
        "HTTPS".to_string()
    } else if base == "TCP" && either(HTTP_PORT) {
        "HTTP".to_string()
    } else {
        base.to_string()
    }
}

fn classify_transport(
    next: IpNextHeaderProtocol,
    payload: &[u8],
    source: String,
    destination: String,
) -> FrameSummary {
    match next {
        IpNextHeaderProtocols::Tcp => {
            if let Some(tcp) = TcpPacket::new(payload) {
                let protocol = port_protocol("TCP", tcp.get_source(), tcp.get_destination());
                let flags = tcp_flag_names(tcp.get_flags());
                return FrameSummary {
                    summary: format!(
                        "{} {}:{} → {}:{} [{}]",
                        protocol,
                        source,
                        tcp.get_source(),
                        destination,
                        tcp.get_destination(),
                        flags.join(", ")
                    ),
                    payload_digest: payload_digest(tcp.payload()),
                    protocol,
                    source,
                    destination,
                    flags,
                };
            }
        }
        IpNextHeaderProtocols::Udp => {
            if let Some(udp) = UdpPacket::new(payload) {
                let protocol = port_protocol("UDP", udp.get_source(), udp.get_destination());
                return FrameSummary {
                    summary: format!(
                        "{} {}:{} → {}:{}",
                        protocol,
                        source,
                        udp.get_source(),
                        destination,
                        udp.get_destination()
                    ),
                    payload_digest: payload_digest(udp.payload()),
                    protocol,
                    source,
                    destination,
                    flags: Vec::new(),
                };
            }
        }
        IpNextHeaderProtocols::Icmp | IpNextHeaderProtocols::Icmpv6 => {
            let icmp_type = IcmpPacket::new(payload).map(|icmp| icmp.get_icmp_type().0);
            return FrameSummary {
                protocol: "ICMP".to_string(),
                summary: match icmp_type {
                    Some(kind) => format!("ICMP type {} from {} to {}", kind, source, destination),
                    None => format!("ICMP packet from {} to {}", source, destination),
                },
                payload_digest: payload_digest(payload),
                source,
                destination,
                flags: Vec::new(),
            };
        }
        _ => {}
    }

    // Unhandled or truncated transport; identified by its IP protocol number
    let protocol = format!("IP-{}", next.0);
    FrameSummary {
        summary: format!("{} packet from {} to {}", protocol, source, destination),
        payload_digest: payload_digest(payload),
        protocol,
        source,
        destination,
        flags: Vec::new(),
    }
}

/// Classifies a raw Ethernet frame. Returns `None` for frames too short to
/// carry a recognisable header and for ether types we do not track.
pub fn classify_ethernet(frame: &[u8]) -> Option<FrameSummary> {
    let ethernet = EthernetPacket::new(frame)?;

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ipv4 = Ipv4Packet::new(ethernet.payload())?;
            Some(classify_transport(
                ipv4.get_next_level_protocol(),
                ipv4.payload(),
                ipv4.get_source().to_string(),
                ipv4.get_destination().to_string(),
            ))
        }
        EtherTypes::Ipv6 => {
            let ipv6 = Ipv6Packet::new(ethernet.payload())?;
            Some(classify_transport(
                ipv6.get_next_header(),
                ipv6.payload(),
                ipv6.get_source().to_string(),
                ipv6.get_destination().to_string(),
            ))
        }
        EtherTypes::Arp => {
            let arp = ArpPacket::new(ethernet.payload())?;
            let source = arp.get_sender_proto_addr().to_string();
            let destination = arp.get_target_proto_addr().to_string();
            let summary = if arp.get_operation() == ArpOperations::Request {
                format!("Who has {}? Tell {}", destination, source)
            } else if arp.get_operation() == ArpOperations::Reply {
                format!("{} is at {}", source, arp.get_sender_hw_addr())
            } else {
                format!("ARP packet from {} to {}", source, destination)
            };
            Some(FrameSummary {
                protocol: "ARP".to_string(),
                source,
                destination,
                summary,
                payload_digest: payload_digest(arp.payload()),
                flags: Vec::new(),
            })
        }
        _ => None,
    }
}

/// Turns a captured frame into a `Packet`; the frame length is the packet
/// length.
pub fn packet_from_frame(id: String, captured_at: DateTime<Utc>, frame: &[u8]) -> Option<Result<Packet>> {
    let view = classify_ethernet(frame)?;
    Some(
        Packet::builder(id, view.protocol, frame.len() as u32)
            .captured_at(captured_at)
            .route(view.source, view.destination)
            .summary(view.summary)
            .payload_digest(view.payload_digest)
            .flags(view.flags)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethernet(ether_type: [u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // dst mac
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, // src mac
        ];
        frame.extend_from_slice(&ether_type);
        frame.extend_from_slice(payload);
        frame
    }

    fn ipv4(protocol: u8, transport: &[u8]) -> Vec<u8> {
        let total = (20 + transport.len()) as u16;
        let mut header = vec![
            0x45, 0x00, (total >> 8) as u8, total as u8, // version/ihl, tos, total length
            0x12, 0x34, 0x40, 0x00, // id, flags (DF)
            64, protocol, 0xab, 0xcd, // ttl, protocol, checksum
            192, 168, 1, 10, // source
            192, 168, 1, 1, // destination
        ];
        header.extend_from_slice(transport);
        header
    }

    fn tcp(src: u16, dst: u16, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut segment = vec![
            (src >> 8) as u8, src as u8, (dst >> 8) as u8, dst as u8,
            0, 0, 0, 1, // seq
            0, 0, 0, 0, // ack
            0x50, flags, // data offset 5, flags
            0xff, 0xff, // window
            0, 0, 0, 0, // checksum, urgent
        ];
        segment.extend_from_slice(payload);
        segment
    }

    fn udp(src: u16, dst: u16, payload: &[u8]) -> Vec<u8> {
        let len = (8 + payload.len()) as u16;
        let mut datagram = vec![
            (src >> 8) as u8, src as u8, (dst >> 8) as u8, dst as u8,
            (len >> 8) as u8, len as u8, 0, 0,
        ];
        datagram.extend_from_slice(payload);
        datagram
    }

    #[test]
    fn test_tcp_https_classification() {
        let frame = ethernet([0x08, 0x00], &ipv4(6, &tcp(51000, 443, SYN | ACK, &[0x16, 0x03, 0x01, 0x00, 0xa5])));
        let view = classify_ethernet(&frame).unwrap();
        assert_eq!(view.protocol, "HTTPS");
        assert_eq!(view.source, "192.168.1.10");
        assert_eq!(view.destination, "192.168.1.1");
        assert_eq!(view.flags, vec!["SYN", "ACK"]);
        assert_eq!(view.payload_digest, "0x16030100");
    }

    #[test]
    fn test_plain_tcp_and_http() {
        let frame = ethernet([0x08, 0x00], &ipv4(6, &tcp(40000, 8080, PSH | ACK, b"GET")));
        assert_eq!(classify_ethernet(&frame).unwrap().protocol, "TCP");

        let frame = ethernet([0x08, 0x00], &ipv4(6, &tcp(80, 40000, FIN, &[])));
        let view = classify_ethernet(&frame).unwrap();
        assert_eq!(view.protocol, "HTTP");
        assert_eq!(view.payload_digest, "0x");
    }

    #[test]
    fn test_udp_dns_classification() {
        let frame = ethernet([0x08, 0x00], &ipv4(17, &udp(53000, 53, &[0xbe, 0xef])));
        let view = classify_ethernet(&frame).unwrap();
        assert_eq!(view.protocol, "DNS");
        assert!(view.flags.is_empty());

        let frame = ethernet([0x08, 0x00], &ipv4(17, &udp(5000, 6000, &[])));
        assert_eq!(classify_ethernet(&frame).unwrap().protocol, "UDP");
    }

    #[test]
    fn test_icmp_classification() {
        let frame = ethernet([0x08, 0x00], &ipv4(1, &[8, 0, 0, 0, 0, 1, 0, 1]));
        let view = classify_ethernet(&frame).unwrap();
        assert_eq!(view.protocol, "ICMP");
        assert!(view.summary.contains("type 8"));
    }

    #[test]
    fn test_arp_request() {
        let arp = [
            0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01, // htype, ptype, hlen, plen, op=request
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 192, 168, 1, 10, // sender
            0, 0, 0, 0, 0, 0, 192, 168, 1, 1, // target
        ];
        let frame = ethernet([0x08, 0x06], &arp);
        let view = classify_ethernet(&frame).unwrap();
        assert_eq!(view.protocol, "ARP");
        assert_eq!(view.summary, "Who has 192.168.1.1? Tell 192.168.1.10");
    }

    #[test]
    fn test_untracked_transport_keeps_number() {
        let frame = ethernet([0x08, 0x00], &ipv4(47, &[0u8; 4]));
        let view = classify_ethernet(&frame).unwrap();
        assert_eq!(view.protocol, "IP-47");
        assert_eq!(view.summary, "IP-47 packet from 192.168.1.10 to 192.168.1.1");
    }

    #[test]
    fn test_short_or_unknown_frames() {
        assert!(classify_ethernet(&[0u8; 6]).is_none());
        assert!(classify_ethernet(&ethernet([0x88, 0xcc], &[0u8; 20])).is_none());
    }

    #[test]
    fn test_packet_from_frame_uses_frame_length() {
        let frame = ethernet([0x08, 0x00], &ipv4(17, &udp(1000, 2000, &[1, 2, 3])));
        let packet = packet_from_frame("live-1".to_string(), Utc::now(), &frame)
            .unwrap()
            .unwrap();
        assert_eq!(packet.length() as usize, frame.len());
        assert_eq!(packet.protocol(), "UDP");
    }

    #[test]
    fn test_flag_names_order() {
        assert_eq!(tcp_flag_names(FIN | ACK | CWR), vec!["ACK", "FIN", "CWR"]);
        assert!(tcp_flag_names(0).is_empty());
        assert_eq!(tcp_flag_names(RST | URG | ECE).len(), 3);
    }
}
