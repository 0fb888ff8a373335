//! IP 조각 검사
//!
//! 재조립은 하지 않습니다. MF 비트가 설정되었거나 오프셋이 0이 아닌 조각
//! 중에서 IP 전체 길이가 최소값보다 작은 것만 차단합니다. 아주 작은 조각은
//! 정상 스택이 거의 만들지 않으며, 헤더 분할로 필터를 우회하는 데 쓰입니다.

use crate::parser::Ipv4Packet;

/// 기본 최소 조각 크기 (바이트)
pub const DEFAULT_MIN_FRAGMENT_SIZE: u16 = 60;

/// 조각 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentVerdict {
    Pass,
    TooSmall,
}

/// 조각 검사기
#[derive(Debug, Clone, Copy)]
pub struct FragmentValidator {
    min_size: u16,
}

impl FragmentValidator {
    pub fn new(min_size: u16) -> Self {
        Self { min_size }
    }

    pub fn check(&self, packet: &Ipv4Packet<'_>) -> FragmentVerdict {
        if packet.is_fragment() && packet.total_len < self.min_size {
            FragmentVerdict::TooSmall
        } else {
            FragmentVerdict::Pass
        }
    }

    pub fn min_size(&self) -> u16 {
        self.min_size
    }
}

impl Default for FragmentValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FRAGMENT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FrameBuilder;
    use crate::parser::{Frame, parse_frame};
    use crate::wire::{IP_DF, IP_MF};

    fn verdict(frame: &[u8]) -> FragmentVerdict {
        match parse_frame(frame).unwrap() {
            Frame::Ipv4(p) => FragmentValidator::default().check(&p),
            Frame::PassThrough { .. } => panic!("expected ipv4"),
        }
    }

    #[test]
    fn small_first_fragment_with_mf_is_dropped() {
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(IP_MF)
            .build();
        assert_eq!(verdict(&frame), FragmentVerdict::TooSmall);
    }

    #[test]
    fn small_trailing_fragment_is_dropped() {
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(0x00B9)
            .build();
        assert_eq!(verdict(&frame), FragmentVerdict::TooSmall);
    }

    #[test]
    fn large_fragment_passes() {
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(IP_MF)
            .payload(&[0u8; 64])
            .build();
        assert_eq!(verdict(&frame), FragmentVerdict::Pass);
    }

    #[test]
    fn boundary_size_passes() {
        // 전체 길이 60 = 20 (IP) + 8 (UDP) + 32
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(IP_MF)
            .payload(&[0u8; 32])
            .build();
        assert_eq!(verdict(&frame), FragmentVerdict::Pass);
    }

    #[test]
    fn small_unfragmented_packet_passes() {
        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2])
            .frag_field(IP_DF)
            .build();
        assert_eq!(verdict(&frame), FragmentVerdict::Pass);
    }
}
