//! 필터 엔진: 패킷 판정 파이프라인과 관리 연산
//!
//! [`FilterEngine`]은 프레임 하나를 받아 [`Verdict`]를 돌려줍니다.
//! 빌더 패턴([`FilterEngineBuilder`])으로 생성하며, 워커 스레드 사이에서
//! `Arc<FilterEngine>`으로 공유합니다. 모든 메서드는 `&self`를 받습니다.
//!
//! # 파이프라인
//! ```text
//! frame ─▶ parse ─┬─ malformed ──────────────────────────────▶ DROP
//!                 ├─ non-IPv4 ───────────────────────────────▶ ALLOW
//!                 └─▶ blacklist ─▶ rate ─▶ geo ─▶ fragment ─┐
//!                                                           ▼
//!           ┌────────────────────── protocol dispatch ──────┴──────────┐
//!           ▼                               ▼                          ▼
//!  TCP: SYN limit ─▶ SYN flood      UDP: track ─▶ DNS size      ICMP: ICMP limit
//!       ─▶ track ─▶ payload
//! ```
//! 어느 단계든 판정을 조기에 확정할 수 있습니다. 파싱 실패는 상태를 가진
//! 단계보다 먼저 끝나며, 블랙리스트 출발지는 속도 카운터를 올리지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! let engine = Arc::new(
//!     FilterEngine::builder()
//!         .config(FilterConfig::from_core(&core_config.engine))
//!         .build()?,
//! );
//!
//! let verdict = engine.classify(frame, Timestamp::from_duration(clock.elapsed()));
//! ```

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use ironwall_core::error::{EngineError, IronwallError};
use ironwall_core::metrics as m;

use crate::blacklist::Blacklist;
use crate::config::FilterConfig;
use crate::conntrack::{ConnectionRecord, ConnectionTracker};
use crate::detector::{SynFloodDetector, SynVerdict};
use crate::error::FilterError;
use crate::flow::FlowKey;
use crate::fragment::{FragmentValidator, FragmentVerdict};
use crate::geo::{GeoAction, GeoFilter, GeoRule, GeoTable};
use crate::inspector::{PayloadInspector, Signature};
use crate::parser::{Frame, Ipv4Packet, TcpHeader, Transport, UdpHeader, parse_frame};
use crate::ratelimit::{RateClass, RateDecision, RateKey, RateLimiter};
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::types::{Decision, DropReason, ProtocolClass, Timestamp, Verdict};
use crate::wire;

// =============================================================================
// 유지보수 결과
// =============================================================================

/// `evict_idle` 한 번의 제거 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// 제거된 연결 레코드 수
    pub connections: usize,
    /// 제거된 속도 제한 레코드 수
    pub rate_entries: usize,
    /// 제거된 SYN 레코드 수
    pub syn_entries: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.connections + self.rate_entries + self.syn_entries
    }
}

// =============================================================================
// 엔진
// =============================================================================

/// 상태 기반 패킷 필터 엔진
///
/// # 필드
/// - `blacklist`, `geo`, `inspector`: 읽기 위주 정책 (스냅샷 교체)
/// - `rate`, `syn`, `conntrack`: 키 단위 샤드 잠금 상태 테이블
/// - `stats`: 스레드별 샤드 카운터
pub struct FilterEngine {
    config: FilterConfig,
    blacklist: Blacklist,
    geo: GeoFilter,
    rate: RateLimiter,
    syn: SynFloodDetector,
    conntrack: ConnectionTracker,
    fragments: FragmentValidator,
    inspector: PayloadInspector,
    stats: StatsCollector,
}

/// 필터 엔진 빌더
pub struct FilterEngineBuilder {
    config: Option<FilterConfig>,
    stats_shards: Option<usize>,
}

impl FilterEngineBuilder {
    fn new() -> Self {
        Self {
            config: None,
            stats_shards: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: FilterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 통계 샤드 수를 지정합니다 (기본: CPU 수).
    pub fn stats_shards(mut self, shards: usize) -> Self {
        self.stats_shards = Some(shards);
        self
    }

    /// 엔진을 생성합니다.
    ///
    /// # 에러
    /// - `EngineError::InitFailed`: 설정이 누락된 경우
    /// - `ConfigError::InvalidValue`: 설정 값이 유효하지 않은 경우
    /// - `EngineError::Policy`: 시그니처 정의가 잘못된 경우
    pub fn build(self) -> Result<FilterEngine, IronwallError> {
        let config = self
            .config
            .ok_or_else(|| EngineError::InitFailed("config is required".to_owned()))?;
        config.validate()?;

        let base = &config.base;
        let signatures = config.policy.compile_signatures()?;
        let blacklist = Blacklist::with_entries(&config.policy.blacklist);
        let geo = GeoFilter::new(config.policy.geo.to_table());
        let rate = RateLimiter::new(
            config.rate_window(),
            base.rate_threshold,
            base.icmp_rate_threshold,
            base.syn_rate_threshold,
            base.max_rate_entries,
        );
        let syn = SynFloodDetector::new(config.syn_flood_config());
        let conntrack = ConnectionTracker::new(config.conntrack_config()?);
        let fragments = FragmentValidator::new(config.fragment_min_size());
        let inspector = PayloadInspector::new(signatures, base.inspect_min_payload);
        let stats = self
            .stats_shards
            .map_or_else(StatsCollector::new, StatsCollector::with_shards);

        info!(
            rate_window_ms = base.rate_window_ms,
            rate_threshold = base.rate_threshold,
            syn_min_gap_us = base.syn_min_gap_us,
            blacklist_exact = blacklist.exact_count(),
            blacklist_prefixes = blacklist.prefix_count(),
            signatures = inspector.signatures().len(),
            closing_syn_policy = ?conntrack.policy(),
            "filter engine initialized"
        );

        Ok(FilterEngine {
            config,
            blacklist,
            geo,
            rate,
            syn,
            conntrack,
            fragments,
            inspector,
            stats,
        })
    }
}

impl FilterEngine {
    /// 빌더를 반환합니다.
    pub fn builder() -> FilterEngineBuilder {
        FilterEngineBuilder::new()
    }

    /// 현재 설정을 반환합니다.
    ///
    /// 관리 연산으로 바뀐 임계값과 정책은 반영되지 않은 초기 설정입니다.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    // =========================================================================
    // 판정
    // =========================================================================

    /// 프레임 하나를 판정합니다.
    pub fn classify(&self, frame: &[u8], arrival: Timestamp) -> Verdict {
        self.classify_detailed(frame, arrival).verdict
    }

    /// 프레임 하나를 판정하고 차단 사유와 흐름 키를 함께 반환합니다.
    pub fn classify_detailed(&self, frame: &[u8], arrival: Timestamp) -> Decision {
        let byte_len = frame.len() as u64;
        let decision = self.decide(frame, byte_len, arrival);
        self.stats.record(&decision, byte_len);

        if let Some(reason) = decision.reason {
            match decision.flow {
                Some(flow) => debug!(reason = reason.as_str(), %flow, "packet dropped"),
                None => debug!(reason = reason.as_str(), len = frame.len(), "packet dropped"),
            }
        } else if decision.verdict == Verdict::RateLimit {
            trace!(flow = ?decision.flow, "packet rate limited");
        }
        decision
    }

    fn decide(&self, frame: &[u8], byte_len: u64, now: Timestamp) -> Decision {
        let packet = match parse_frame(frame) {
            Ok(Frame::Ipv4(packet)) => packet,
            Ok(Frame::PassThrough { ethertype }) => {
                trace!(ethertype, "non-ipv4 frame passed through");
                return Decision::allow(ProtocolClass::NonIp, None);
            }
            Err(e) => {
                trace!(error = %e, "malformed frame");
                return Decision::drop(DropReason::Malformed, malformed_class(frame), None);
            }
        };

        let class = protocol_class(packet.protocol);
        let flow = FlowKey::from_packet(&packet);
        let src = packet.src;

        if self.blacklist.is_blocked(src) {
            return Decision::drop(DropReason::Blacklisted, class, Some(flow));
        }
        if self.rate.check(RateKey::general(src), now) == RateDecision::Limited {
            return Decision::rate_limited(class, Some(flow));
        }
        if self.geo.policy(src) == GeoAction::Deny {
            return Decision::drop(DropReason::Geo, class, Some(flow));
        }
        if self.fragments.check(&packet) == FragmentVerdict::TooSmall {
            return Decision::drop(DropReason::Fragment, class, Some(flow));
        }

        match &packet.transport {
            Transport::Tcp(tcp) => self.check_tcp(&packet, tcp, flow, byte_len, now),
            Transport::Udp(udp) => self.check_udp(udp, flow, byte_len, now),
            Transport::Icmp(_) => {
                if self.rate.check(RateKey::icmp(src), now) == RateDecision::Limited {
                    Decision::rate_limited(class, Some(flow))
                } else {
                    Decision::allow(class, Some(flow))
                }
            }
            Transport::Other | Transport::Fragment => Decision::allow(class, Some(flow)),
        }
    }

    fn check_tcp(
        &self,
        packet: &Ipv4Packet<'_>,
        tcp: &TcpHeader,
        flow: FlowKey,
        byte_len: u64,
        now: Timestamp,
    ) -> Decision {
        let class = ProtocolClass::Tcp;

        if tcp.flags.is_initial_syn() {
            if self.rate.check(RateKey::syn(packet.src), now) == RateDecision::Limited {
                return Decision::rate_limited(class, Some(flow));
            }
            if self.syn.check(packet.src, now) == SynVerdict::Flood {
                return Decision::drop(DropReason::SynFlood, class, Some(flow));
            }
        }

        let outcome = self.conntrack.track(flow, byte_len, Some(tcp.flags), now);
        if outcome.is_rejected() {
            return Decision::drop(DropReason::ConnectionViolation, class, Some(flow));
        }

        if self.config.base.inspect_payload {
            let inspection = self.inspector.inspect(packet.payload());
            if inspection.is_drop() {
                trace!(?inspection, %flow, "payload signature matched");
                return Decision::drop(DropReason::Signature, class, Some(flow));
            }
        }

        Decision::allow(class, Some(flow))
    }

    fn check_udp(&self, udp: &UdpHeader, flow: FlowKey, byte_len: u64, now: Timestamp) -> Decision {
        let class = ProtocolClass::Udp;
        self.conntrack.track(flow, byte_len, None, now);

        if udp.dst_port == wire::DNS_PORT && usize::from(udp.length) > self.config.base.dns_max_udp_len
        {
            return Decision::drop(DropReason::DnsAmplification, class, Some(flow));
        }
        Decision::allow(class, Some(flow))
    }

    // =========================================================================
    // 관리 연산
    // =========================================================================

    /// 주소 하나의 차단 여부를 설정합니다.
    pub fn set_blacklist(&self, addr: Ipv4Addr, blocked: bool) {
        self.blacklist.set(addr, blocked);
        info!(%addr, blocked, version = self.blacklist.version(), "blacklist updated");
    }

    /// 대역의 차단 여부를 설정합니다.
    pub fn set_blacklist_prefix(&self, net: Ipv4Net, blocked: bool) {
        self.blacklist.set_prefix(net, blocked);
        info!(%net, blocked, version = self.blacklist.version(), "blacklist prefix updated");
    }

    /// 주소가 현재 차단 대상인지 확인합니다.
    pub fn is_blacklisted(&self, addr: Ipv4Addr) -> bool {
        self.blacklist.is_blocked(addr)
    }

    /// 일반 트래픽 임계값을 바꿉니다. 다음 검사부터 적용됩니다.
    pub fn set_rate_threshold(&self, value: u64) -> Result<(), FilterError> {
        self.set_threshold(RateClass::General, "rate_threshold", value)
    }

    /// ICMP 임계값을 바꿉니다.
    pub fn set_icmp_threshold(&self, value: u64) -> Result<(), FilterError> {
        self.set_threshold(RateClass::Icmp, "icmp_rate_threshold", value)
    }

    /// SYN 임계값을 바꿉니다.
    pub fn set_syn_threshold(&self, value: u64) -> Result<(), FilterError> {
        self.set_threshold(RateClass::Syn, "syn_rate_threshold", value)
    }

    fn set_threshold(&self, class: RateClass, field: &str, value: u64) -> Result<(), FilterError> {
        if value == 0 {
            return Err(FilterError::invalid_config(field, "must be greater than 0"));
        }
        let previous = self.rate.threshold(class);
        self.rate.set_threshold(class, value);
        info!(field, previous, value, "rate threshold updated");
        Ok(())
    }

    /// 현재 임계값
    pub fn rate_threshold(&self, class: RateClass) -> u64 {
        self.rate.threshold(class)
    }

    /// 지역 규칙 전체를 교체합니다.
    pub fn replace_geo_rules(&self, rules: Vec<GeoRule>, default_action: GeoAction) {
        let count = rules.len();
        self.geo.replace(GeoTable::new(rules, default_action));
        info!(rules = count, ?default_action, "geo rules replaced");
    }

    /// 시그니처 목록 전체를 교체합니다.
    pub fn replace_signatures(&self, signatures: Vec<Signature>) {
        let count = signatures.len();
        self.inspector.replace(signatures);
        info!(signatures = count, "payload signatures replaced");
    }

    /// 통계 스냅샷을 반환합니다.
    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 흐름의 연결 레코드 복사본
    pub fn connection(&self, key: &FlowKey) -> Option<ConnectionRecord> {
        self.conntrack.get(key)
    }

    /// 추적 중인 연결 수
    pub fn connection_count(&self) -> usize {
        self.conntrack.len()
    }

    /// 유휴 레코드를 제거합니다. 호스트가 주기적으로 호출합니다.
    pub fn evict_idle(&self, now: Timestamp) -> EvictionReport {
        let report = EvictionReport {
            connections: self.conntrack.evict_idle(now),
            rate_entries: self.rate.evict_idle(now),
            syn_entries: self.syn.evict_idle(now),
        };

        let base = &self.config.base;
        for (table, len, capacity) in [
            ("connections", self.conntrack.len(), base.max_connections),
            ("rate", self.rate.len(), base.max_rate_entries),
            ("syn", self.syn.len(), base.max_syn_entries),
        ] {
            if len >= capacity {
                warn!(table, len, capacity, "table at capacity after idle sweep");
            }
        }

        if report.total() > 0 {
            info!(
                connections = report.connections,
                rate_entries = report.rate_entries,
                syn_entries = report.syn_entries,
                "idle entries evicted"
            );
        }
        report
    }

    /// 통계와 테이블 상태를 `metrics` 레코더로 내보냅니다.
    pub fn publish_metrics(&self) -> StatsSnapshot {
        let snapshot = self.get_stats();
        snapshot.publish();

        #[allow(clippy::cast_precision_loss)]
        let active = self.conntrack.len() as f64;
        metrics::gauge!(m::FILTER_ACTIVE_CONNECTIONS).set(active);
        for (table, evictions) in [
            ("connections", self.conntrack.evictions()),
            ("rate", self.rate.evictions()),
            ("syn", self.syn.evictions()),
        ] {
            metrics::counter!(m::FILTER_TABLE_EVICTIONS_TOTAL, m::LABEL_TABLE => table)
                .absolute(evictions);
        }
        snapshot
    }
}

fn protocol_class(protocol: u8) -> ProtocolClass {
    match protocol {
        wire::PROTO_TCP => ProtocolClass::Tcp,
        wire::PROTO_UDP => ProtocolClass::Udp,
        wire::PROTO_ICMP => ProtocolClass::Icmp,
        _ => ProtocolClass::Other,
    }
}

/// 해석에 실패한 프레임의 프로토콜 분류 (읽을 수 있는 만큼만)
fn malformed_class(frame: &[u8]) -> ProtocolClass {
    if frame.len() < wire::ETH_HEADER_LEN {
        return ProtocolClass::NonIp;
    }
    frame
        .get(wire::ETH_HEADER_LEN + wire::IPV4_PROTOCOL_OFFSET)
        .map_or(ProtocolClass::Other, |&p| protocol_class(p))
}
