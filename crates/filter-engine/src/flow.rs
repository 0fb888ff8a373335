//! 흐름 키: 5-튜플

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::parser::{Ipv4Packet, Transport};
use crate::wire;

/// 흐름을 식별하는 5-튜플
///
/// 방향이 있는 키입니다. A→B와 B→A는 서로 다른 흐름으로 추적됩니다.
/// ICMP, 조각, 기타 프로토콜의 포트는 0입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl FlowKey {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, protocol: u8) -> Self {
        Self {
            src,
            dst,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// 해석된 패킷에서 키를 만듭니다.
    pub fn from_packet(packet: &Ipv4Packet<'_>) -> Self {
        let (src_port, dst_port) = match &packet.transport {
            Transport::Tcp(tcp) => (tcp.src_port, tcp.dst_port),
            Transport::Udp(udp) => (udp.src_port, udp.dst_port),
            Transport::Icmp(_) | Transport::Other | Transport::Fragment => (0, 0),
        };
        Self::new(packet.src, packet.dst, src_port, dst_port, packet.protocol)
    }

    fn protocol_name(&self) -> &'static str {
        match self.protocol {
            wire::PROTO_TCP => "tcp",
            wire::PROTO_UDP => "udp",
            wire::PROTO_ICMP => "icmp",
            _ => "ip",
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol_name(),
            self.src,
            self.src_port,
            self.dst,
            self.dst_port
        )
    }
}
