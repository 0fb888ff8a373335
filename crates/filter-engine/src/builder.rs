//! 합성 프레임 빌더
//!
//! 테스트, 벤치마크, 리플레이 입력 생성에 쓰는 Ethernet + IPv4 + L4 프레임
//! 조립기입니다. 기본값은 유효한 패킷이며, 각 필드를 덮어써서 비정상 입력을
//! 만들 수 있습니다.

use std::net::Ipv4Addr;

use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Tcp,
    Udp,
    Icmp,
}

/// 프레임 빌더
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    layout: Layout,
    ethertype: u16,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    src_port: u16,
    dst_port: u16,
    tcp_flags: u8,
    icmp_type: u8,
    frag_field: u16,
    total_len: Option<u16>,
    udp_len: Option<u16>,
    payload: Vec<u8>,
}

impl FrameBuilder {
    fn new(layout: Layout, protocol: u8, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self {
            layout,
            ethertype: wire::ETH_P_IPV4,
            src,
            dst,
            protocol,
            src_port: 40000,
            dst_port: 80,
            tcp_flags: wire::TCP_ACK,
            icmp_type: 8,
            frag_field: 0,
            total_len: None,
            udp_len: None,
            payload: Vec::new(),
        }
    }

    /// TCP 세그먼트 (기본 플래그: ACK)
    pub fn tcp(src: impl Into<Ipv4Addr>, dst: impl Into<Ipv4Addr>) -> Self {
        Self::new(Layout::Tcp, wire::PROTO_TCP, src.into(), dst.into())
    }

    /// UDP 데이터그램
    pub fn udp(src: impl Into<Ipv4Addr>, dst: impl Into<Ipv4Addr>) -> Self {
        Self::new(Layout::Udp, wire::PROTO_UDP, src.into(), dst.into())
    }

    /// ICMP echo request
    pub fn icmp(src: impl Into<Ipv4Addr>, dst: impl Into<Ipv4Addr>) -> Self {
        Self::new(Layout::Icmp, wire::PROTO_ICMP, src.into(), dst.into())
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    /// IPv4 Protocol 필드만 바꿉니다 (L4 바이트 배치는 유지).
    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub fn tcp_flags(mut self, flags: u8) -> Self {
        self.tcp_flags = flags;
        self
    }

    pub fn icmp_type(mut self, icmp_type: u8) -> Self {
        self.icmp_type = icmp_type;
        self
    }

    /// Flags + Fragment Offset 필드
    pub fn frag_field(mut self, frag_field: u16) -> Self {
        self.frag_field = frag_field;
        self
    }

    /// IPv4 Total Length를 강제로 지정합니다.
    pub fn ip_total_len(mut self, total_len: u16) -> Self {
        self.total_len = Some(total_len);
        self
    }

    /// UDP Length 필드를 강제로 지정합니다.
    pub fn udp_len(mut self, udp_len: u16) -> Self {
        self.udp_len = Some(udp_len);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// 프레임 바이트를 생성합니다.
    pub fn build(&self) -> Vec<u8> {
        let l4_len = match self.layout {
            Layout::Tcp => wire::TCP_MIN_HEADER_LEN,
            Layout::Udp => wire::UDP_HEADER_LEN,
            Layout::Icmp => wire::ICMP_HEADER_LEN,
        };
        let ip_len = wire::IPV4_MIN_HEADER_LEN + l4_len + self.payload.len();
        let mut frame = Vec::with_capacity(wire::ETH_HEADER_LEN + ip_len);

        // Ethernet: 로컬 관리 MAC 주소
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());

        // IPv4
        let total_len = self.total_len.unwrap_or(clamp_u16(ip_len));
        let ip_start = frame.len();
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.frag_field.to_be_bytes());
        frame.push(64);
        frame.push(self.protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.src.octets());
        frame.extend_from_slice(&self.dst.octets());
        let checksum = ipv4_checksum(&frame[ip_start..]);
        frame[ip_start + 10..ip_start + 12].copy_from_slice(&checksum.to_be_bytes());

        match self.layout {
            Layout::Tcp => {
                frame.extend_from_slice(&self.src_port.to_be_bytes());
                frame.extend_from_slice(&self.dst_port.to_be_bytes());
                frame.extend_from_slice(&[0; 8]); // seq, ack
                frame.push(0x50);
                frame.push(self.tcp_flags);
                frame.extend_from_slice(&u16::MAX.to_be_bytes());
                frame.extend_from_slice(&[0; 4]); // checksum, urgent
            }
            Layout::Udp => {
                let udp_len = self
                    .udp_len
                    .unwrap_or(clamp_u16(wire::UDP_HEADER_LEN + self.payload.len()));
                frame.extend_from_slice(&self.src_port.to_be_bytes());
                frame.extend_from_slice(&self.dst_port.to_be_bytes());
                frame.extend_from_slice(&udp_len.to_be_bytes());
                frame.extend_from_slice(&[0, 0]);
            }
            Layout::Icmp => {
                frame.push(self.icmp_type);
                frame.extend_from_slice(&[0; 7]);
            }
        }

        frame.extend_from_slice(&self.payload);
        frame
    }
}

fn clamp_u16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

/// RFC 1071 인터넷 체크섬
fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|pair| {
            let hi = u32::from(pair[0]) << 8;
            let lo = pair.get(1).copied().map(u32::from).unwrap_or(0);
            hi | lo
        })
        .sum();
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
