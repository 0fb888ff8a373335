//! 와이어 포맷 상수
//!
//! Ethernet II, IPv4 (RFC 791), TCP (RFC 793), UDP (RFC 768), ICMP (RFC 792)
//! 헤더를 해석할 때 쓰는 크기, 오프셋, 비트 마스크입니다.

// =============================================================================
// Ethernet
// =============================================================================

/// Ethernet II 헤더 길이
pub const ETH_HEADER_LEN: usize = 14;
/// EtherType 필드 오프셋
pub const ETH_TYPE_OFFSET: usize = 12;
/// IPv4 EtherType
pub const ETH_P_IPV4: u16 = 0x0800;

// =============================================================================
// IPv4
// =============================================================================

/// IPv4 최소 헤더 길이 (IHL = 5)
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// IPv4 최소 IHL (32비트 워드 단위)
pub const IPV4_MIN_IHL: u8 = 5;
/// Total Length 필드 오프셋
pub const IPV4_TOTAL_LEN_OFFSET: usize = 2;
/// Flags + Fragment Offset 필드 오프셋
pub const IPV4_FRAG_OFFSET: usize = 6;
/// Protocol 필드 오프셋
pub const IPV4_PROTOCOL_OFFSET: usize = 9;
/// 출발지 주소 오프셋
pub const IPV4_SRC_OFFSET: usize = 12;
/// 목적지 주소 오프셋
pub const IPV4_DST_OFFSET: usize = 16;

/// More Fragments 비트
pub const IP_MF: u16 = 0x2000;
/// Don't Fragment 비트
pub const IP_DF: u16 = 0x4000;
/// Fragment Offset 마스크 (8바이트 단위)
pub const IP_OFFSET_MASK: u16 = 0x1FFF;

// =============================================================================
// 프로토콜 번호
// =============================================================================

/// ICMP 프로토콜 번호
pub const PROTO_ICMP: u8 = 1;
/// TCP 프로토콜 번호
pub const PROTO_TCP: u8 = 6;
/// UDP 프로토콜 번호
pub const PROTO_UDP: u8 = 17;

// =============================================================================
// L4 헤더
// =============================================================================

/// TCP 고정 헤더 길이
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// TCP 최소 Data Offset (32비트 워드 단위)
pub const TCP_MIN_DATA_OFFSET: u8 = 5;
/// TCP Data Offset 바이트 오프셋
pub const TCP_DATA_OFFSET_OFFSET: usize = 12;
/// TCP 플래그 바이트 오프셋
pub const TCP_FLAGS_OFFSET: usize = 13;
/// UDP 헤더 길이
pub const UDP_HEADER_LEN: usize = 8;
/// UDP Length 필드 오프셋
pub const UDP_LEN_OFFSET: usize = 4;
/// ICMP 헤더 길이
pub const ICMP_HEADER_LEN: usize = 8;

/// DNS 포트
pub const DNS_PORT: u16 = 53;

// =============================================================================
// TCP 플래그
// =============================================================================

/// FIN 플래그
pub const TCP_FIN: u8 = 0x01;
/// SYN 플래그
pub const TCP_SYN: u8 = 0x02;
/// RST 플래그
pub const TCP_RST: u8 = 0x04;
/// PSH 플래그
pub const TCP_PSH: u8 = 0x08;
/// ACK 플래그
pub const TCP_ACK: u8 = 0x10;
/// URG 플래그
pub const TCP_URG: u8 = 0x20;

/// 빅엔디언 u16을 읽습니다. 호출자가 범위를 보장해야 합니다.
#[inline]
pub(crate) fn be16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}
