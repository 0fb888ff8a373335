//! 연결 추적: 흐름별 상태와 카운터
//!
//! [`FlowKey`]마다 [`ConnectionRecord`] 하나를 유지합니다. 레코드는 이
//! 모듈만 변경하며, 밖으로는 복사본만 내보냅니다.
//!
//! # TCP 상태 전이
//! ```text
//!           첫 패킷
//!              │
//!              ▼
//!   ┌──────▶  NEW ──── SYN ────▶ ESTABLISHED
//!   │          │                     │
//!   │         FIN                   FIN
//!   │          ▼                     │
//!   │       CLOSING ◀────────────────┘
//!   │          │
//!   └─ SYN ────┘  (ClosingSynPolicy::Restart)
//! ```
//!
//! 엔진은 TCP와 UDP 흐름만 추적합니다. UDP는 상태 전이 없이 NEW로 남고
//! 카운터만 갱신됩니다. ICMP와 기타 프로토콜은 레코드를 만들지 않습니다.
//! 추적 자체는 패킷을 차단하지 않습니다. 단, [`ClosingSynPolicy::Reject`]가
//! 설정된 경우 CLOSING 흐름의 SYN을 위반으로 보고합니다.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flow::FlowKey;
use crate::parser::TcpFlags;
use crate::table::{BoundedTable, Touched};
use crate::types::Timestamp;

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Established,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Established => "established",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CLOSING 흐름에 SYN이 들어왔을 때의 처리
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosingSynPolicy {
    /// 상태를 유지하고 카운터만 갱신
    #[default]
    Ignore,
    /// 기존 레코드를 버리고 새 NEW 레코드로 시작
    Restart,
    /// 패킷을 위반으로 보고 (호출자가 차단)
    Reject,
}

impl FromStr for ClosingSynPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "restart" => Ok(Self::Restart),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown closing syn policy '{other}'")),
        }
    }
}

/// 흐름 하나의 추적 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub packet_count: u64,
    pub byte_count: u64,
    pub state: ConnectionState,
    /// 흐름에서 관찰된 TCP 플래그의 누적 OR
    pub flags: TcpFlags,
}

impl ConnectionRecord {
    fn open(byte_len: u64, flags: TcpFlags, now: Timestamp) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            packet_count: 1,
            byte_count: byte_len,
            state: ConnectionState::New,
            flags,
        }
    }
}

impl Touched for ConnectionRecord {
    fn last_touched(&self) -> Timestamp {
        self.last_seen
    }
}

/// 추적 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// 갱신 후 레코드
    Tracked(ConnectionRecord),
    /// reject 정책 위반 (레코드는 카운터만 갱신됨)
    Rejected(ConnectionRecord),
}

impl TrackOutcome {
    pub fn record(&self) -> &ConnectionRecord {
        match self {
            Self::Tracked(r) | Self::Rejected(r) => r,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// 연결 추적 설정
#[derive(Debug, Clone)]
pub struct ConntrackConfig {
    pub capacity: usize,
    pub idle_timeout: Duration,
    pub closing_syn: ClosingSynPolicy,
}

impl Default for ConntrackConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            idle_timeout: Duration::from_secs(300),
            closing_syn: ClosingSynPolicy::Ignore,
        }
    }
}

/// 연결 추적기
pub struct ConnectionTracker {
    config: ConntrackConfig,
    table: BoundedTable<FlowKey, ConnectionRecord>,
}

impl ConnectionTracker {
    pub fn new(config: ConntrackConfig) -> Self {
        let table = BoundedTable::new(config.capacity);
        Self { config, table }
    }

    /// 패킷 하나를 흐름에 반영합니다.
    ///
    /// `tcp_flags`는 TCP가 아니면 `None`입니다.
    pub fn track(
        &self,
        key: FlowKey,
        byte_len: u64,
        tcp_flags: Option<TcpFlags>,
        now: Timestamp,
    ) -> TrackOutcome {
        let flags = tcp_flags.unwrap_or_default();
        let policy = self.config.closing_syn;

        self.table.upsert(
            key,
            |record| {
                let Some(tcp) = tcp_flags else {
                    touch(record, byte_len, flags, now);
                    return TrackOutcome::Tracked(*record);
                };

                if tcp.syn() && record.state == ConnectionState::Closing {
                    match policy {
                        ClosingSynPolicy::Ignore => {}
                        ClosingSynPolicy::Restart => {
                            *record = ConnectionRecord::open(byte_len, flags, now);
                            return TrackOutcome::Tracked(*record);
                        }
                        ClosingSynPolicy::Reject => {
                            touch(record, byte_len, flags, now);
                            return TrackOutcome::Rejected(*record);
                        }
                    }
                }

                touch(record, byte_len, flags, now);
                if tcp.syn() && record.state == ConnectionState::New {
                    record.state = ConnectionState::Established;
                } else if tcp.fin() {
                    record.state = ConnectionState::Closing;
                }
                TrackOutcome::Tracked(*record)
            },
            || {
                let record = ConnectionRecord::open(byte_len, flags, now);
                (record, TrackOutcome::Tracked(record))
            },
        )
    }

    /// 흐름의 현재 레코드 복사본
    pub fn get(&self, key: &FlowKey) -> Option<ConnectionRecord> {
        self.table.get(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 유휴 시간을 넘긴 흐름을 제거합니다.
    pub fn evict_idle(&self, now: Timestamp) -> usize {
        self.table.evict_idle(now, self.config.idle_timeout)
    }

    pub fn evictions(&self) -> u64 {
        self.table.evictions()
    }

    pub fn policy(&self) -> ClosingSynPolicy {
        self.config.closing_syn
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new(ConntrackConfig::default())
    }
}

fn touch(record: &mut ConnectionRecord, byte_len: u64, flags: TcpFlags, now: Timestamp) {
    record.last_seen = now;
    record.packet_count = record.packet_count.saturating_add(1);
    record.byte_count = record.byte_count.saturating_add(byte_len);
    record.flags = TcpFlags(record.flags.0 | flags.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{PROTO_TCP, PROTO_UDP, TCP_ACK, TCP_FIN, TCP_SYN};
    use std::net::Ipv4Addr;

    fn tcp_key() -> FlowKey {
        FlowKey::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            443,
            PROTO_TCP,
        )
    }

    fn tracker(policy: ClosingSynPolicy) -> ConnectionTracker {
        ConnectionTracker::new(ConntrackConfig {
            closing_syn: policy,
            ..ConntrackConfig::default()
        })
    }

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn first_packet_creates_new_record() {
        let ct = ConnectionTracker::default();
        let out = ct.track(tcp_key(), 60, Some(TcpFlags(TCP_SYN)), at(1));
        let record = out.record();
        assert_eq!(record.state, ConnectionState::New);
        assert_eq!(record.packet_count, 1);
        assert_eq!(record.byte_count, 60);
        assert_eq!(record.first_seen, at(1));
        assert_eq!(ct.len(), 1);
    }

    #[test]
    fn syn_while_new_establishes() {
        let ct = ConnectionTracker::default();
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_ACK)), at(1));
        let out = ct.track(tcp_key(), 60, Some(TcpFlags(TCP_SYN)), at(2));
        assert_eq!(out.record().state, ConnectionState::Established);
    }

    #[test]
    fn fin_moves_to_closing_from_any_state() {
        let ct = ConnectionTracker::default();
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_ACK)), at(1));
        let out = ct.track(tcp_key(), 60, Some(TcpFlags(TCP_FIN | TCP_ACK)), at(2));
        assert_eq!(out.record().state, ConnectionState::Closing);

        let other = FlowKey { src_port: 40001, ..tcp_key() };
        ct.track(other, 60, Some(TcpFlags(TCP_ACK)), at(1));
        ct.track(other, 60, Some(TcpFlags(TCP_SYN)), at(2));
        let out = ct.track(other, 60, Some(TcpFlags(TCP_FIN)), at(3));
        assert_eq!(out.record().state, ConnectionState::Closing);
    }

    #[test]
    fn counters_accumulate() {
        let ct = ConnectionTracker::default();
        for i in 0..5 {
            ct.track(tcp_key(), 100, Some(TcpFlags(TCP_ACK)), at(i));
        }
        let record = ct.get(&tcp_key()).unwrap();
        assert_eq!(record.packet_count, 5);
        assert_eq!(record.byte_count, 500);
        assert_eq!(record.first_seen, at(0));
        assert_eq!(record.last_seen, at(4));
    }

    #[test]
    fn flags_are_accumulated() {
        let ct = ConnectionTracker::default();
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_SYN)), at(1));
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_ACK)), at(2));
        let record = ct.get(&tcp_key()).unwrap();
        assert!(record.flags.syn());
        assert!(record.flags.ack());
    }

    #[test]
    fn udp_stays_new() {
        let ct = ConnectionTracker::default();
        let key = FlowKey::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 53),
            5353,
            53,
            PROTO_UDP,
        );
        ct.track(key, 80, None, at(1));
        let out = ct.track(key, 80, None, at(2));
        assert_eq!(out.record().state, ConnectionState::New);
        assert_eq!(out.record().packet_count, 2);
        assert_eq!(out.record().flags, TcpFlags(0));
    }

    fn close(ct: &ConnectionTracker) {
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_ACK)), at(1));
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_FIN)), at(2));
    }

    #[test]
    fn closing_syn_ignore_keeps_closing() {
        let ct = tracker(ClosingSynPolicy::Ignore);
        close(&ct);
        let out = ct.track(tcp_key(), 60, Some(TcpFlags(TCP_SYN)), at(3));
        assert!(!out.is_rejected());
        assert_eq!(out.record().state, ConnectionState::Closing);
        assert_eq!(out.record().packet_count, 3);
    }

    #[test]
    fn closing_syn_restart_opens_fresh_record() {
        let ct = tracker(ClosingSynPolicy::Restart);
        close(&ct);
        let out = ct.track(tcp_key(), 60, Some(TcpFlags(TCP_SYN)), at(3));
        assert_eq!(out.record().state, ConnectionState::New);
        assert_eq!(out.record().packet_count, 1);
        assert_eq!(out.record().first_seen, at(3));
        assert_eq!(ct.len(), 1);
    }

    #[test]
    fn closing_syn_reject_reports_violation() {
        let ct = tracker(ClosingSynPolicy::Reject);
        close(&ct);
        let out = ct.track(tcp_key(), 60, Some(TcpFlags(TCP_SYN)), at(3));
        assert!(out.is_rejected());
        assert_eq!(out.record().state, ConnectionState::Closing);
        assert_eq!(out.record().packet_count, 3);
    }

    #[test]
    fn idle_flows_are_evicted() {
        let ct = ConnectionTracker::new(ConntrackConfig {
            idle_timeout: Duration::from_secs(30),
            ..ConntrackConfig::default()
        });
        ct.track(tcp_key(), 60, Some(TcpFlags(TCP_ACK)), Timestamp::from_secs(0));
        assert_eq!(ct.evict_idle(Timestamp::from_secs(10)), 0);
        assert_eq!(ct.evict_idle(Timestamp::from_secs(31)), 1);
        assert!(ct.get(&tcp_key()).is_none());
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("restart".parse::<ClosingSynPolicy>(), Ok(ClosingSynPolicy::Restart));
        assert!("reset".parse::<ClosingSynPolicy>().is_err());
    }
}
