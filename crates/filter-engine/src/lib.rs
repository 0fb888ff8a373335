//! Ironwall 필터 엔진
//!
//! 원시 프레임 하나를 받아 ALLOW / DROP / RATE_LIMIT 판정을 내리는 상태 기반
//! 패킷 필터입니다. 판정은 동기적이며 블로킹하지 않고, 여러 워커 스레드가
//! 하나의 [`FilterEngine`]을 `Arc`로 공유합니다.
//!
//! # 모듈 구성
//! - [`parser`]: Ethernet / IPv4 / TCP / UDP / ICMP 헤더 해석 (복사 없음)
//! - [`flow`]: 5-튜플 흐름 키
//! - [`ratelimit`]: 출발지별 고정 윈도우 속도 제한
//! - [`blacklist`], [`geo`]: 스냅샷 교체형 주소 정책
//! - [`detector`]: SYN flood 탐지
//! - [`conntrack`]: 연결 상태 추적
//! - [`fragment`]: 작은 IP 조각 차단
//! - [`inspector`]: 페이로드 시그니처 검사
//! - [`stats`]: 샤드 카운터 통계와 처리량 계산
//! - [`engine`]: 판정 파이프라인과 관리 연산
//! - [`config`]: core 설정 확장 + 정책 파일

pub mod blacklist;
pub mod builder;
pub mod config;
pub mod conntrack;
pub mod detector;
pub mod engine;
pub mod error;
pub mod flow;
pub mod fragment;
pub mod geo;
pub mod inspector;
pub mod parser;
pub mod ratelimit;
pub mod stats;
pub mod table;
pub mod types;
pub mod wire;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{EvictionReport, FilterEngine, FilterEngineBuilder};

// 설정
pub use config::{FilterConfig, GeoPolicy, PatternKind, PolicyConfig, SignatureSpec};

// 에러
pub use error::FilterError;

// 판정
pub use types::{Decision, DropReason, ProtocolClass, Timestamp, Verdict};

// 해석
pub use flow::FlowKey;
pub use parser::{Frame, Ipv4Packet, Malformed, TcpFlags, Transport, parse_frame};

// 정책
pub use blacklist::{Blacklist, BlacklistEntry};
pub use geo::{GeoAction, GeoRule, GeoTable};
pub use inspector::{Inspection, Pattern, Signature, SignatureAction};

// 상태
pub use conntrack::{ClosingSynPolicy, ConnectionRecord, ConnectionState};
pub use ratelimit::RateClass;

// 통계
pub use stats::{StatsSnapshot, TrafficMeter};
