//! 메트릭 상수 및 설명 등록
//!
//! 필터 엔진이 내보내는 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더(exporter) 설치는 호스트의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironwall_filter_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(ironwall_core::metrics::FILTER_PACKETS_TOTAL).absolute(42);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (tcp, udp, icmp, other, non_ip)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 차단 사유 레이블 키 (malformed, blacklisted, geo, ...)
pub const LABEL_REASON: &str = "reason";

/// 테이블 레이블 키 (connections, rate, syn)
pub const LABEL_TABLE: &str = "table";

// ─── 판정 카운터 ────────────────────────────────────────────────────

/// 처리된 전체 패킷 수 (counter)
pub const FILTER_PACKETS_TOTAL: &str = "ironwall_filter_packets_total";

/// 허용된 패킷 수 (counter)
pub const FILTER_PACKETS_ALLOWED_TOTAL: &str = "ironwall_filter_packets_allowed_total";

/// 차단된 패킷 수 (counter)
pub const FILTER_PACKETS_DROPPED_TOTAL: &str = "ironwall_filter_packets_dropped_total";

/// 속도 제한된 패킷 수 (counter)
pub const FILTER_PACKETS_RATE_LIMITED_TOTAL: &str = "ironwall_filter_packets_rate_limited_total";

/// 블랙리스트로 차단된 패킷 수 (counter)
pub const FILTER_PACKETS_BLACKLISTED_TOTAL: &str = "ironwall_filter_packets_blacklisted_total";

/// 잘못된 형식으로 차단된 패킷 수 (counter)
pub const FILTER_PACKETS_MALFORMED_TOTAL: &str = "ironwall_filter_packets_malformed_total";

/// SYN flood로 탐지된 패킷 수 (counter)
pub const FILTER_DDOS_DETECTED_TOTAL: &str = "ironwall_filter_ddos_detected_total";

/// 처리된 전체 바이트 수 (counter)
pub const FILTER_BYTES_TOTAL: &str = "ironwall_filter_bytes_total";

/// 사유별 차단 패킷 수 (counter, label: reason)
pub const FILTER_DROPS_BY_REASON_TOTAL: &str = "ironwall_filter_drops_by_reason_total";

/// 프로토콜별 패킷 수 (counter, label: protocol)
pub const FILTER_PROTOCOL_PACKETS_TOTAL: &str = "ironwall_filter_protocol_packets_total";

// ─── 처리량 게이지 ──────────────────────────────────────────────────

/// 초당 패킷 처리량 (gauge)
pub const FILTER_PACKETS_PER_SECOND: &str = "ironwall_filter_packets_per_second";

/// 초당 비트 처리량 (gauge)
pub const FILTER_BITS_PER_SECOND: &str = "ironwall_filter_bits_per_second";

/// 초당 차단 패킷 수 (gauge)
pub const FILTER_DROPS_PER_SECOND: &str = "ironwall_filter_drops_per_second";

// ─── 상태 테이블 ────────────────────────────────────────────────────

/// 추적 중인 연결 수 (gauge)
pub const FILTER_ACTIVE_CONNECTIONS: &str = "ironwall_filter_active_connections";

/// 만료 또는 용량 초과로 제거된 엔트리 수 (counter, label: table)
pub const FILTER_TABLE_EVICTIONS_TOTAL: &str = "ironwall_filter_table_evictions_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        FILTER_PACKETS_TOTAL,
        "Total number of frames classified by the filter engine"
    );
    describe_counter!(FILTER_PACKETS_ALLOWED_TOTAL, "Frames given an Allow verdict");
    describe_counter!(FILTER_PACKETS_DROPPED_TOTAL, "Frames given a Drop verdict");
    describe_counter!(
        FILTER_PACKETS_RATE_LIMITED_TOTAL,
        "Frames given a RateLimit verdict"
    );
    describe_counter!(
        FILTER_PACKETS_BLACKLISTED_TOTAL,
        "Frames dropped because the source is blacklisted"
    );
    describe_counter!(
        FILTER_PACKETS_MALFORMED_TOTAL,
        "Frames dropped because a header failed validation"
    );
    describe_counter!(
        FILTER_DDOS_DETECTED_TOTAL,
        "SYN packets dropped by the SYN-flood detector"
    );
    describe_counter!(FILTER_BYTES_TOTAL, "Total bytes of classified frames");
    describe_counter!(
        FILTER_DROPS_BY_REASON_TOTAL,
        "Dropped frames per drop reason"
    );
    describe_counter!(
        FILTER_PROTOCOL_PACKETS_TOTAL,
        "Classified frames per protocol (tcp, udp, icmp, other, non_ip)"
    );
    describe_gauge!(
        FILTER_PACKETS_PER_SECOND,
        "Current classification rate (packets/sec)"
    );
    describe_gauge!(FILTER_BITS_PER_SECOND, "Current throughput rate (bits/sec)");
    describe_gauge!(FILTER_DROPS_PER_SECOND, "Current drop rate (packets/sec)");
    describe_gauge!(
        FILTER_ACTIVE_CONNECTIONS,
        "Number of flows in the connection table"
    );
    describe_counter!(
        FILTER_TABLE_EVICTIONS_TOTAL,
        "State table entries removed by idle sweep or capacity pressure"
    );
}
