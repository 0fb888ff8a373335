//! 헤더 파서: Ethernet / IPv4 / TCP / UDP / ICMP
//!
//! 원시 프레임을 복사 없이 해석합니다. 선언된 헤더 크기가 버퍼를 넘는 순간
//! [`Malformed`]로 거부하며, 범위를 벗어난 바이트는 절대 읽지 않습니다.
//!
//! ```text
//! &[u8] ──▶ parse_frame ──▶ Frame::PassThrough      (IPv4 아님, 검사 생략)
//!                        └─▶ Frame::Ipv4(Ipv4Packet) (L4까지 해석 완료)
//!                        └─▶ Err(Malformed)
//! ```
//!
//! L4 헤더는 상태를 가진 단계가 실행되기 전에 모두 검증됩니다. 따라서 잘린
//! TCP 헤더 때문에 연결 추적 테이블에 반쯤 기록되는 일은 없습니다.

use std::net::Ipv4Addr;
use std::ops::Range;

use serde::Serialize;

use crate::wire::{self, be16};

// =============================================================================
// 에러
// =============================================================================

/// 헤더 계층
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Ethernet,
    Ipv4,
    Tcp,
    Udp,
    Icmp,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ethernet => "ethernet",
            Self::Ipv4 => "ipv4",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        };
        f.write_str(name)
    }
}

/// 헤더 검증 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    /// 헤더가 버퍼 끝을 넘어섬
    #[error("{layer} header truncated: need {needed} bytes, have {available}")]
    Truncated {
        layer: Layer,
        needed: usize,
        available: usize,
    },

    /// IP 버전이 4가 아님
    #[error("unsupported ip version {0}")]
    Version(u8),

    /// IHL이 5 워드 미만
    #[error("ipv4 header length {0} words is below minimum")]
    HeaderLength(u8),

    /// Total Length가 헤더 길이보다 작음
    #[error("ipv4 total length {total} is smaller than header length {header}")]
    TotalLength { total: u16, header: usize },

    /// TCP Data Offset이 5 워드 미만
    #[error("tcp data offset {0} words is below minimum")]
    DataOffset(u8),
}

// =============================================================================
// 해석 결과
// =============================================================================

/// 해석된 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// IPv4가 아닌 EtherType (검사 없이 통과)
    PassThrough { ethertype: u16 },
    /// IPv4 패킷
    Ipv4(Ipv4Packet<'a>),
}

/// TCP 플래그 바이트
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    /// 주어진 비트가 모두 설정되어 있는지 확인합니다.
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn syn(self) -> bool {
        self.contains(wire::TCP_SYN)
    }

    pub fn ack(self) -> bool {
        self.contains(wire::TCP_ACK)
    }

    pub fn fin(self) -> bool {
        self.contains(wire::TCP_FIN)
    }

    pub fn rst(self) -> bool {
        self.contains(wire::TCP_RST)
    }

    /// 연결 개시 SYN (SYN 설정, ACK 해제)
    pub fn is_initial_syn(self) -> bool {
        self.syn() && !self.ack()
    }
}

/// TCP 헤더 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: TcpFlags,
    /// Data Offset * 4
    pub header_len: usize,
}

/// UDP 헤더 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// UDP Length 필드 값 (헤더 포함)
    pub length: u16,
}

/// ICMP 헤더 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
}

/// 전송 계층
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Icmp(IcmpHeader),
    /// L4를 해석하지 않는 IPv4 프로토콜
    Other,
    /// L4 헤더가 없는 IP 조각
    ///
    /// 첫 조각이 아닌 조각, 또는 IP 전체 길이가 L4 헤더를 다 담지 못하는
    /// 첫 조각(MF 설정)입니다.
    Fragment,
}

/// 해석된 IPv4 패킷 뷰
///
/// 원본 버퍼를 빌려 쥐고, 페이로드는 오프셋 범위로만 기억합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet<'a> {
    buf: &'a [u8],
    /// IPv4 헤더 길이 (IHL * 4)
    pub header_len: usize,
    /// Total Length 필드 값
    pub total_len: u16,
    /// Flags + Fragment Offset 필드 값
    pub frag_field: u16,
    /// 프로토콜 번호
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub transport: Transport,
    payload: Range<usize>,
}

impl<'a> Ipv4Packet<'a> {
    /// L4 페이로드 바이트 (TCP/UDP/ICMP 헤더 이후)
    ///
    /// IP Total Length와 버퍼 끝 중 먼저 오는 지점에서 끝납니다.
    pub fn payload(&self) -> &'a [u8] {
        self.buf.get(self.payload.clone()).unwrap_or_default()
    }

    /// More Fragments 비트 여부
    pub fn more_fragments(&self) -> bool {
        self.frag_field & wire::IP_MF != 0
    }

    /// Fragment Offset (8바이트 단위)
    pub fn fragment_offset(&self) -> u16 {
        self.frag_field & wire::IP_OFFSET_MASK
    }

    /// 조각 패킷 여부 (MF 설정 또는 오프셋 0 아님)
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() != 0
    }
}

// =============================================================================
// 파싱
// =============================================================================

/// 원시 프레임을 해석합니다.
///
/// 순수 함수입니다. 호출자는 `Err`를 DROP + malformed 집계로 처리합니다.
pub fn parse_frame(frame: &[u8]) -> Result<Frame<'_>, Malformed> {
    ensure(frame, 0, wire::ETH_HEADER_LEN, Layer::Ethernet)?;
    let ethertype = be16(frame, wire::ETH_TYPE_OFFSET);
    if ethertype != wire::ETH_P_IPV4 {
        return Ok(Frame::PassThrough { ethertype });
    }

    let l3 = wire::ETH_HEADER_LEN;
    ensure(frame, l3, wire::IPV4_MIN_HEADER_LEN, Layer::Ipv4)?;

    let version = frame[l3] >> 4;
    if version != 4 {
        return Err(Malformed::Version(version));
    }
    let ihl = frame[l3] & 0x0F;
    if ihl < wire::IPV4_MIN_IHL {
        return Err(Malformed::HeaderLength(ihl));
    }
    let header_len = usize::from(ihl) * 4;
    ensure(frame, l3, header_len, Layer::Ipv4)?;

    let total_len = be16(frame, l3 + wire::IPV4_TOTAL_LEN_OFFSET);
    if usize::from(total_len) < header_len {
        return Err(Malformed::TotalLength {
            total: total_len,
            header: header_len,
        });
    }

    let frag_field = be16(frame, l3 + wire::IPV4_FRAG_OFFSET);
    let protocol = frame[l3 + wire::IPV4_PROTOCOL_OFFSET];
    let src = read_addr(frame, l3 + wire::IPV4_SRC_OFFSET);
    let dst = read_addr(frame, l3 + wire::IPV4_DST_OFFSET);

    // IP 데이터그램 끝: 선언된 길이와 실제 버퍼 중 짧은 쪽
    let datagram_end = (l3 + usize::from(total_len)).min(frame.len());
    let l4 = l3 + header_len;

    let (transport, payload_start) = if frag_field & wire::IP_OFFSET_MASK != 0 {
        (Transport::Fragment, l4)
    } else {
        match parse_transport(frame, l4, protocol) {
            // 첫 조각 자체가 L4 헤더보다 짧음: 조각 검사 단계에서 판정
            Err(Malformed::Truncated { needed, .. })
                if frag_field & wire::IP_MF != 0
                    && usize::from(total_len) < header_len + needed =>
            {
                (Transport::Fragment, l4)
            }
            parsed => parsed?,
        }
    };

    Ok(Frame::Ipv4(Ipv4Packet {
        buf: frame,
        header_len,
        total_len,
        frag_field,
        protocol,
        src,
        dst,
        transport,
        payload: payload_start..datagram_end.max(payload_start),
    }))
}

fn parse_transport(frame: &[u8], l4: usize, protocol: u8) -> Result<(Transport, usize), Malformed> {
    match protocol {
        wire::PROTO_TCP => {
            ensure(frame, l4, wire::TCP_MIN_HEADER_LEN, Layer::Tcp)?;
            let data_offset = frame[l4 + wire::TCP_DATA_OFFSET_OFFSET] >> 4;
            if data_offset < wire::TCP_MIN_DATA_OFFSET {
                return Err(Malformed::DataOffset(data_offset));
            }
            let header_len = usize::from(data_offset) * 4;
            ensure(frame, l4, header_len, Layer::Tcp)?;
            let header = TcpHeader {
                src_port: be16(frame, l4),
                dst_port: be16(frame, l4 + 2),
                flags: TcpFlags(frame[l4 + wire::TCP_FLAGS_OFFSET]),
                header_len,
            };
            Ok((Transport::Tcp(header), l4 + header_len))
        }
        wire::PROTO_UDP => {
            ensure(frame, l4, wire::UDP_HEADER_LEN, Layer::Udp)?;
            let header = UdpHeader {
                src_port: be16(frame, l4),
                dst_port: be16(frame, l4 + 2),
                length: be16(frame, l4 + wire::UDP_LEN_OFFSET),
            };
            Ok((Transport::Udp(header), l4 + wire::UDP_HEADER_LEN))
        }
        wire::PROTO_ICMP => {
            ensure(frame, l4, wire::ICMP_HEADER_LEN, Layer::Icmp)?;
            let header = IcmpHeader {
                icmp_type: frame[l4],
                code: frame[l4 + 1],
            };
            Ok((Transport::Icmp(header), l4 + wire::ICMP_HEADER_LEN))
        }
        _ => Ok((Transport::Other, l4)),
    }
}

/// `buf[offset..offset + len]`이 버퍼 안에 있는지 확인합니다.
fn ensure(buf: &[u8], offset: usize, len: usize, layer: Layer) -> Result<(), Malformed> {
    let available = buf.len().saturating_sub(offset);
    if available < len {
        return Err(Malformed::Truncated {
            layer,
            needed: len,
            available,
        });
    }
    Ok(())
}

fn read_addr(buf: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(buf[at], buf[at + 1], buf[at + 2], buf[at + 3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FrameBuilder;

    fn ipv4(frame: &[u8]) -> Ipv4Packet<'_> {
        match parse_frame(frame).unwrap() {
            Frame::Ipv4(p) => p,
            other => panic!("expected ipv4, got {other:?}"),
        }
    }

    #[test]
    fn empty_buffer_is_truncated_ethernet() {
        let err = parse_frame(&[]).unwrap_err();
        assert_eq!(
            err,
            Malformed::Truncated {
                layer: Layer::Ethernet,
                needed: 14,
                available: 0
            }
        );
    }

    #[test]
    fn non_ipv4_ethertype_passes_through() {
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
            .ethertype(0x86DD)
            .build();
        assert_eq!(
            parse_frame(&frame).unwrap(),
            Frame::PassThrough { ethertype: 0x86DD }
        );
    }

    #[test]
    fn arp_frame_without_ip_header_passes_through() {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x06;
        assert!(matches!(
            parse_frame(&frame),
            Ok(Frame::PassThrough { ethertype: 0x0806 })
        ));
    }

    #[test]
    fn ipv4_header_cut_short_is_malformed() {
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        let err = parse_frame(&frame[..14 + 19]).unwrap_err();
        assert!(matches!(
            err,
            Malformed::Truncated {
                layer: Layer::Ipv4,
                ..
            }
        ));
    }

    #[test]
    fn wrong_ip_version_is_malformed() {
        let mut frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        frame[14] = 0x65;
        assert_eq!(parse_frame(&frame).unwrap_err(), Malformed::Version(6));
    }

    #[test]
    fn ihl_below_five_is_malformed() {
        let mut frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        frame[14] = 0x44;
        assert_eq!(parse_frame(&frame).unwrap_err(), Malformed::HeaderLength(4));
    }

    #[test]
    fn ihl_beyond_buffer_is_malformed() {
        let mut frame = FrameBuilder::icmp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        frame[14] = 0x4F; // 60바이트 헤더 선언
        frame.truncate(14 + 40);
        assert!(matches!(
            parse_frame(&frame).unwrap_err(),
            Malformed::Truncated {
                layer: Layer::Ipv4,
                needed: 60,
                available: 40
            }
        ));
    }

    #[test]
    fn total_length_below_header_is_malformed() {
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .ip_total_len(12)
            .build();
        assert!(matches!(
            parse_frame(&frame).unwrap_err(),
            Malformed::TotalLength { total: 12, .. }
        ));
    }

    #[test]
    fn tcp_header_truncated_is_malformed() {
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        let err = parse_frame(&frame[..14 + 20 + 10]).unwrap_err();
        assert!(matches!(
            err,
            Malformed::Truncated {
                layer: Layer::Tcp,
                ..
            }
        ));
    }

    #[test]
    fn tcp_data_offset_below_five_is_malformed() {
        let mut frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        frame[14 + 20 + 12] = 0x40;
        assert_eq!(parse_frame(&frame).unwrap_err(), Malformed::DataOffset(4));
    }

    #[test]
    fn tcp_options_beyond_buffer_are_malformed() {
        let mut frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        frame[14 + 20 + 12] = 0xF0; // 60바이트 TCP 헤더 선언
        assert!(matches!(
            parse_frame(&frame).unwrap_err(),
            Malformed::Truncated {
                layer: Layer::Tcp,
                needed: 60,
                ..
            }
        ));
    }

    #[test]
    fn udp_and_icmp_truncation_are_malformed() {
        let udp = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        assert!(matches!(
            parse_frame(&udp[..14 + 20 + 7]).unwrap_err(),
            Malformed::Truncated {
                layer: Layer::Udp,
                ..
            }
        ));
        let icmp = FrameBuilder::icmp([10, 0, 0, 1], [10, 0, 0, 2]).build();
        assert!(matches!(
            parse_frame(&icmp[..14 + 20 + 4]).unwrap_err(),
            Malformed::Truncated {
                layer: Layer::Icmp,
                ..
            }
        ));
    }

    #[test]
    fn tcp_fields_are_decoded() {
        let frame = FrameBuilder::tcp([192, 0, 2, 1], [198, 51, 100, 7])
            .ports(40000, 443)
            .tcp_flags(wire::TCP_SYN)
            .payload(b"hello")
            .build();
        let packet = ipv4(&frame);
        assert_eq!(packet.src, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(packet.dst, Ipv4Addr::new(198, 51, 100, 7));
        assert_eq!(packet.protocol, wire::PROTO_TCP);
        match &packet.transport {
            Transport::Tcp(tcp) => {
                assert_eq!(tcp.src_port, 40000);
                assert_eq!(tcp.dst_port, 443);
                assert!(tcp.flags.is_initial_syn());
                assert_eq!(tcp.header_len, 20);
            }
            other => panic!("expected tcp, got {other:?}"),
        }
        assert_eq!(packet.payload(), b"hello");
    }

    #[test]
    fn payload_is_bounded_by_ip_total_length() {
        // 이더넷 패딩 바이트는 페이로드가 아님
        let mut frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .payload(b"abcd")
            .build();
        frame.extend_from_slice(&[0u8; 10]);
        assert_eq!(ipv4(&frame).payload(), b"abcd");
    }

    #[test]
    fn payload_is_bounded_by_buffer_when_total_length_lies() {
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .payload(b"abcd")
            .ip_total_len(1500)
            .build();
        assert_eq!(ipv4(&frame).payload(), b"abcd");
    }

    #[test]
    fn total_length_shorter_than_l4_header_gives_empty_payload() {
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
            .payload(b"ignored")
            .ip_total_len(24)
            .build();
        assert!(ipv4(&frame).payload().is_empty());
    }

    #[test]
    fn non_first_fragment_skips_l4() {
        // 오프셋이 있는 조각은 L4 헤더가 없으므로 잘린 TCP로 보지 않음
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(0x0010)
            .build();
        let packet = ipv4(&frame[..14 + 20 + 4]);
        assert_eq!(packet.transport, Transport::Fragment);
        assert!(packet.is_fragment());
        assert_eq!(packet.fragment_offset(), 0x10);
    }

    #[test]
    fn tiny_first_fragment_splitting_tcp_header_is_fragment() {
        // MF + IP 전체 길이 28: TCP 헤더 8바이트만 담김
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(wire::IP_MF)
            .ip_total_len(28)
            .build();
        let packet = ipv4(&frame[..14 + 28]);
        assert_eq!(packet.transport, Transport::Fragment);
        assert!(packet.more_fragments());
        assert_eq!(packet.fragment_offset(), 0);
    }

    #[test]
    fn first_fragment_cut_by_buffer_is_still_malformed() {
        // 선언된 길이는 TCP 헤더를 담지만 버퍼가 잘림
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(wire::IP_MF)
            .build();
        assert!(matches!(
            parse_frame(&frame[..14 + 28]).unwrap_err(),
            Malformed::Truncated {
                layer: Layer::Tcp,
                ..
            }
        ));
    }

    #[test]
    fn unknown_protocol_is_other() {
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
            .protocol(47)
            .build();
        assert_eq!(ipv4(&frame).transport, Transport::Other);
    }

    #[test]
    fn tcp_flags_helpers() {
        let synack = TcpFlags(wire::TCP_SYN | wire::TCP_ACK);
        assert!(synack.syn());
        assert!(synack.ack());
        assert!(!synack.is_initial_syn());
        assert!(TcpFlags(wire::TCP_FIN).fin());
        assert!(TcpFlags(wire::TCP_RST).rst());
    }
}
