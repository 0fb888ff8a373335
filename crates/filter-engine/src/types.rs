//! 판정 결과와 시간 표현
//!
//! [`Verdict`]는 호스트가 패킷에 적용할 최종 조치이고, [`Decision`]은
//! 판정에 이른 이유(차단 사유, 흐름 키)를 함께 담습니다.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flow::FlowKey;

// =============================================================================
// 타임스탬프
// =============================================================================

/// 패킷 도착 시각 (나노초, 호스트가 정한 단조 시계 기준)
///
/// 엔진은 벽시계를 읽지 않습니다. 호스트가 매 패킷마다 도착 시각을 넘기므로
/// 같은 입력은 항상 같은 판정을 냅니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// 시계 원점
    pub const ZERO: Self = Self(0);

    /// 나노초 값에서 생성합니다.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// 마이크로초 값에서 생성합니다.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// 밀리초 값에서 생성합니다.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// 초 값에서 생성합니다.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// 원점으로부터의 경과 시간에서 생성합니다. u64 범위를 넘으면 포화됩니다.
    pub fn from_duration(elapsed: Duration) -> Self {
        Self(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    /// 나노초 값을 반환합니다.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// `earlier` 이후 경과 시간을 반환합니다. 시계가 역행하면 0입니다.
    pub const fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// `d`만큼 지난 시각을 반환합니다.
    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(f, "{secs}.{nanos:09}")
    }
}

// =============================================================================
// 판정
// =============================================================================

/// 패킷에 대한 최종 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// 통과
    Allow,
    /// 차단
    Drop,
    /// 속도 제한 초과
    RateLimit,
}

impl Verdict {
    /// 소문자 문자열 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Drop => "drop",
            Self::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 차단 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 헤더 검증 실패
    Malformed,
    /// 블랙리스트 출발지
    Blacklisted,
    /// 지역 정책 거부 대역
    Geo,
    /// 비정상적으로 작은 IP 조각
    Fragment,
    /// SYN flood 휴리스틱
    SynFlood,
    /// 페이로드 시그니처 일치
    Signature,
    /// DNS 증폭 의심 (큰 UDP 53 요청)
    DnsAmplification,
    /// CLOSING 흐름에 대한 SYN (reject 정책)
    ConnectionViolation,
}

impl DropReason {
    /// 모든 사유 (통계 인덱스 순서)
    pub const ALL: [DropReason; 8] = [
        Self::Malformed,
        Self::Blacklisted,
        Self::Geo,
        Self::Fragment,
        Self::SynFlood,
        Self::Signature,
        Self::DnsAmplification,
        Self::ConnectionViolation,
    ];

    /// 소문자 문자열 표현 (메트릭 레이블 값)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Blacklisted => "blacklisted",
            Self::Geo => "geo",
            Self::Fragment => "fragment",
            Self::SynFlood => "syn_flood",
            Self::Signature => "signature",
            Self::DnsAmplification => "dns_amplification",
            Self::ConnectionViolation => "connection_violation",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 통계 분류용 프로토콜 구분
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolClass {
    Tcp,
    Udp,
    Icmp,
    /// 기타 IPv4 프로토콜 (L4 미해석 조각 포함)
    Other,
    /// IPv4가 아닌 프레임
    NonIp,
}

impl ProtocolClass {
    /// 모든 구분 (통계 인덱스 순서)
    pub const ALL: [ProtocolClass; 5] = [Self::Tcp, Self::Udp, Self::Icmp, Self::Other, Self::NonIp];

    /// 소문자 문자열 표현 (메트릭 레이블 값)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Other => "other",
            Self::NonIp => "non_ip",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// 판정 상세
///
/// `classify_detailed`가 반환합니다. `reason`은 `Drop`일 때만 채워집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// 최종 판정
    pub verdict: Verdict,
    /// 차단 사유
    pub reason: Option<DropReason>,
    /// 흐름 키 (IPv4 헤더까지 해석된 경우)
    pub flow: Option<FlowKey>,
    /// 통계 분류
    pub protocol: ProtocolClass,
}

impl Decision {
    pub(crate) fn allow(protocol: ProtocolClass, flow: Option<FlowKey>) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: None,
            flow,
            protocol,
        }
    }

    pub(crate) fn drop(reason: DropReason, protocol: ProtocolClass, flow: Option<FlowKey>) -> Self {
        Self {
            verdict: Verdict::Drop,
            reason: Some(reason),
            flow,
            protocol,
        }
    }

    pub(crate) fn rate_limited(protocol: ProtocolClass, flow: Option<FlowKey>) -> Self {
        Self {
            verdict: Verdict::RateLimit,
            reason: None,
            flow,
            protocol,
        }
    }
}
