//! 통계 수집: 샤드 원자 카운터와 처리량 계산
//!
//! [`StatsCollector`]는 스레드마다 다른 캐시 라인의 카운터 샤드를 갱신하고,
//! 조회 시 모든 샤드를 합산해 [`StatsSnapshot`]을 만듭니다. 전역 잠금은 없습니다.
//!
//! # 데이터 흐름
//! ```text
//! classify ──record──▶ Shard[i] (스레드별)
//!                         │
//! get_stats ◀──합산───────┘ StatsSnapshot ──update──▶ TrafficMeter
//!                                                     (rate 계산)
//! ```
//!
//! 스냅샷의 `total`은 세 판정 카운터의 합으로 계산되므로
//! `allowed + dropped + rate_limited == total`이 모든 스냅샷에서 성립합니다.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ironwall_core::metrics as m;
use serde::Serialize;

use crate::types::{Decision, DropReason, ProtocolClass, Timestamp, Verdict};

// =============================================================================
// 카운터 배치
// =============================================================================

const ALLOWED: usize = 0;
const DROPPED: usize = 1;
const RATE_LIMITED: usize = 2;
const BYTES: usize = 3;
const REASON_BASE: usize = 4;
const PROTO_PACKETS_BASE: usize = REASON_BASE + DropReason::ALL.len();
const PROTO_BYTES_BASE: usize = PROTO_PACKETS_BASE + ProtocolClass::ALL.len();
const PROTO_DROPS_BASE: usize = PROTO_BYTES_BASE + ProtocolClass::ALL.len();
const COUNTERS: usize = PROTO_DROPS_BASE + ProtocolClass::ALL.len();

/// 최대 샤드 수
const MAX_SHARDS: usize = 64;

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: usize = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
}

/// 캐시 라인 하나를 차지하는 카운터 묶음
#[repr(align(64))]
struct Shard {
    counters: [AtomicU64; COUNTERS],
}

impl Shard {
    fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    fn add(&self, index: usize, value: u64) {
        self.counters[index].fetch_add(value, Ordering::Relaxed);
    }
}

// =============================================================================
// 수집기
// =============================================================================

/// 동시성 통계 수집기
pub struct StatsCollector {
    shards: Box<[Shard]>,
}

impl StatsCollector {
    /// CPU 수만큼 샤드를 둔 수집기를 생성합니다.
    pub fn new() -> Self {
        let cpus = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self::with_shards(cpus)
    }

    /// 샤드 수를 지정해 생성합니다 (1..=64로 제한).
    pub fn with_shards(count: usize) -> Self {
        let count = count.clamp(1, MAX_SHARDS);
        Self {
            shards: (0..count).map(|_| Shard::new()).collect(),
        }
    }

    #[inline]
    fn shard(&self) -> &Shard {
        let hint = SHARD_HINT.with(|h| *h);
        &self.shards[hint % self.shards.len()]
    }

    /// 판정 하나를 집계합니다.
    #[inline]
    pub fn record(&self, decision: &Decision, byte_len: u64) {
        let shard = self.shard();
        let proto = decision.protocol.index();

        match decision.verdict {
            Verdict::Allow => shard.add(ALLOWED, 1),
            Verdict::Drop => {
                shard.add(DROPPED, 1);
                shard.add(PROTO_DROPS_BASE + proto, 1);
            }
            Verdict::RateLimit => shard.add(RATE_LIMITED, 1),
        }
        if let Some(reason) = decision.reason {
            shard.add(REASON_BASE + reason.index(), 1);
        }

        shard.add(BYTES, byte_len);
        shard.add(PROTO_PACKETS_BASE + proto, 1);
        shard.add(PROTO_BYTES_BASE + proto, byte_len);
    }

    /// 모든 샤드를 합산한 스냅샷을 만듭니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut sums = [0u64; COUNTERS];
        for shard in self.shards.iter() {
            for (sum, counter) in sums.iter_mut().zip(shard.counters.iter()) {
                *sum = sum.wrapping_add(counter.load(Ordering::Relaxed));
            }
        }

        let reason = |r: DropReason| sums[REASON_BASE + r.index()];
        let proto = |p: ProtocolClass| ProtoCounters {
            packets: sums[PROTO_PACKETS_BASE + p.index()],
            bytes: sums[PROTO_BYTES_BASE + p.index()],
            drops: sums[PROTO_DROPS_BASE + p.index()],
        };

        let allowed = sums[ALLOWED];
        let dropped = sums[DROPPED];
        let rate_limited = sums[RATE_LIMITED];

        StatsSnapshot {
            total: allowed + dropped + rate_limited,
            allowed,
            dropped,
            rate_limited,
            blacklisted: reason(DropReason::Blacklisted),
            malformed: reason(DropReason::Malformed),
            ddos_detected: reason(DropReason::SynFlood),
            bytes_processed: sums[BYTES],
            drops_by_reason: DropReasonCounts {
                malformed: reason(DropReason::Malformed),
                blacklisted: reason(DropReason::Blacklisted),
                geo: reason(DropReason::Geo),
                fragment: reason(DropReason::Fragment),
                syn_flood: reason(DropReason::SynFlood),
                signature: reason(DropReason::Signature),
                dns_amplification: reason(DropReason::DnsAmplification),
                connection_violation: reason(DropReason::ConnectionViolation),
            },
            protocols: ProtocolBreakdown {
                tcp: proto(ProtocolClass::Tcp),
                udp: proto(ProtocolClass::Udp),
                icmp: proto(ProtocolClass::Icmp),
                other: proto(ProtocolClass::Other),
                non_ip: proto(ProtocolClass::NonIp),
            },
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// 스냅샷
// =============================================================================

/// 사유별 차단 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropReasonCounts {
    pub malformed: u64,
    pub blacklisted: u64,
    pub geo: u64,
    pub fragment: u64,
    pub syn_flood: u64,
    pub signature: u64,
    pub dns_amplification: u64,
    pub connection_violation: u64,
}

impl DropReasonCounts {
    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::Malformed => self.malformed,
            DropReason::Blacklisted => self.blacklisted,
            DropReason::Geo => self.geo,
            DropReason::Fragment => self.fragment,
            DropReason::SynFlood => self.syn_flood,
            DropReason::Signature => self.signature,
            DropReason::DnsAmplification => self.dns_amplification,
            DropReason::ConnectionViolation => self.connection_violation,
        }
    }
}

/// 프로토콜 하나의 누적 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtoCounters {
    /// 처리된 패킷 수
    pub packets: u64,
    /// 전송 바이트 수
    pub bytes: u64,
    /// 차단된 패킷 수
    pub drops: u64,
}

/// 프로토콜별 누적 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtocolBreakdown {
    pub tcp: ProtoCounters,
    pub udp: ProtoCounters,
    pub icmp: ProtoCounters,
    pub other: ProtoCounters,
    pub non_ip: ProtoCounters,
}

impl ProtocolBreakdown {
    pub fn get(&self, class: ProtocolClass) -> &ProtoCounters {
        match class {
            ProtocolClass::Tcp => &self.tcp,
            ProtocolClass::Udp => &self.udp,
            ProtocolClass::Icmp => &self.icmp,
            ProtocolClass::Other => &self.other,
            ProtocolClass::NonIp => &self.non_ip,
        }
    }
}

/// 엔진 통계 스냅샷
///
/// 모든 카운터는 단조 증가합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub allowed: u64,
    pub dropped: u64,
    pub rate_limited: u64,
    pub blacklisted: u64,
    pub malformed: u64,
    pub ddos_detected: u64,
    pub bytes_processed: u64,
    pub drops_by_reason: DropReasonCounts,
    pub protocols: ProtocolBreakdown,
}

impl StatsSnapshot {
    /// 누적 카운터를 `metrics` 레코더로 내보냅니다.
    pub fn publish(&self) {
        metrics::counter!(m::FILTER_PACKETS_TOTAL).absolute(self.total);
        metrics::counter!(m::FILTER_PACKETS_ALLOWED_TOTAL).absolute(self.allowed);
        metrics::counter!(m::FILTER_PACKETS_DROPPED_TOTAL).absolute(self.dropped);
        metrics::counter!(m::FILTER_PACKETS_RATE_LIMITED_TOTAL).absolute(self.rate_limited);
        metrics::counter!(m::FILTER_PACKETS_BLACKLISTED_TOTAL).absolute(self.blacklisted);
        metrics::counter!(m::FILTER_PACKETS_MALFORMED_TOTAL).absolute(self.malformed);
        metrics::counter!(m::FILTER_DDOS_DETECTED_TOTAL).absolute(self.ddos_detected);
        metrics::counter!(m::FILTER_BYTES_TOTAL).absolute(self.bytes_processed);

        for reason in DropReason::ALL {
            metrics::counter!(
                m::FILTER_DROPS_BY_REASON_TOTAL,
                m::LABEL_REASON => reason.as_str()
            )
            .absolute(self.drops_by_reason.get(reason));
        }

        for class in ProtocolClass::ALL {
            metrics::counter!(
                m::FILTER_PROTOCOL_PACKETS_TOTAL,
                m::LABEL_PROTOCOL => class.as_str()
            )
            .absolute(self.protocols.get(class).packets);
        }
    }
}

// =============================================================================
// 처리량
// =============================================================================

/// 프로토콜별 처리량 (누적 + 비율)
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtoRates {
    /// 처리된 패킷 수 (누적)
    pub packets: u64,
    /// 전송 바이트 수 (누적)
    pub bytes: u64,
    /// 차단된 패킷 수 (누적)
    pub drops: u64,
    /// 초당 패킷 수
    pub pps: f64,
    /// 초당 비트 수
    pub bps: f64,
}

/// 처리량 계산기
///
/// `update()`를 호출할 때마다 이전 스냅샷과의 차이를 경과 시간으로 나누어
/// pps, bps를 계산합니다. 시간은 엔진과 같은 [`Timestamp`] 축을 씁니다.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrafficMeter {
    pub tcp: ProtoRates,
    pub udp: ProtoRates,
    pub icmp: ProtoRates,
    pub other: ProtoRates,
    pub non_ip: ProtoRates,
    pub total: ProtoRates,
    /// 초당 차단 패킷 수 (Drop 판정만)
    pub drops_per_second: f64,
    #[serde(skip)]
    prev: Option<(Timestamp, StatsSnapshot)>,
}

impl TrafficMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 스냅샷으로 처리량을 갱신합니다.
    ///
    /// 첫 호출이나 시간이 흐르지 않은 호출에서는 누적값만 갱신되고 비율은 0입니다.
    pub fn update(&mut self, snapshot: &StatsSnapshot, at: Timestamp) {
        let elapsed = match &self.prev {
            Some((prev_at, _)) => at.saturating_since(*prev_at).as_secs_f64(),
            None => 0.0,
        };
        let prev = self
            .prev
            .as_ref()
            .map(|(_, s)| *s)
            .filter(|_| elapsed > 0.0);

        let total_now = ProtoCounters {
            packets: snapshot.total,
            bytes: snapshot.bytes_processed,
            drops: snapshot.dropped,
        };
        let total_prev = prev.map(|p| ProtoCounters {
            packets: p.total,
            bytes: p.bytes_processed,
            drops: p.dropped,
        });

        compute_rate(&mut self.total, &total_now, total_prev.as_ref(), elapsed);
        for class in ProtocolClass::ALL {
            let current = snapshot.protocols.get(class);
            let previous = prev.as_ref().map(|p| p.protocols.get(class));
            compute_rate(self.rates_mut(class), current, previous, elapsed);
        }

        #[allow(clippy::cast_precision_loss)]
        {
            self.drops_per_second = match total_prev {
                Some(p) => total_now.drops.saturating_sub(p.drops) as f64 / elapsed,
                None => 0.0,
            };
        }

        self.prev = Some((at, *snapshot));
    }

    fn rates_mut(&mut self, class: ProtocolClass) -> &mut ProtoRates {
        match class {
            ProtocolClass::Tcp => &mut self.tcp,
            ProtocolClass::Udp => &mut self.udp,
            ProtocolClass::Icmp => &mut self.icmp,
            ProtocolClass::Other => &mut self.other,
            ProtocolClass::NonIp => &mut self.non_ip,
        }
    }

    /// 처리량 게이지를 `metrics` 레코더로 내보냅니다.
    pub fn publish(&self) {
        for (proto, rates) in [
            ("tcp", &self.tcp),
            ("udp", &self.udp),
            ("icmp", &self.icmp),
            ("other", &self.other),
            ("non_ip", &self.non_ip),
            ("total", &self.total),
        ] {
            metrics::gauge!(m::FILTER_PACKETS_PER_SECOND, m::LABEL_PROTOCOL => proto)
                .set(rates.pps);
            metrics::gauge!(m::FILTER_BITS_PER_SECOND, m::LABEL_PROTOCOL => proto).set(rates.bps);
        }
        metrics::gauge!(m::FILTER_DROPS_PER_SECOND).set(self.drops_per_second);
    }

    /// 통계를 초기화합니다.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// delta를 계산하여 rate를 갱신합니다. `prev`가 없으면 rate는 0입니다.
fn compute_rate(
    rates: &mut ProtoRates,
    current: &ProtoCounters,
    prev: Option<&ProtoCounters>,
    elapsed_secs: f64,
) {
    rates.packets = current.packets;
    rates.bytes = current.bytes;
    rates.drops = current.drops;

    let Some(prev) = prev else {
        rates.pps = 0.0;
        rates.bps = 0.0;
        return;
    };

    let delta_packets = current.packets.saturating_sub(prev.packets);
    let delta_bytes = current.bytes.saturating_sub(prev.bytes);

    // delta 값은 실용적으로 2^53 미만
    #[allow(clippy::cast_precision_loss)]
    {
        rates.pps = delta_packets as f64 / elapsed_secs;
        rates.bps = (delta_bytes as f64 * 8.0) / elapsed_secs;
    }
}
