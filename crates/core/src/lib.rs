//! Ironwall 공통 크레이트
//!
//! 필터 엔진과 호스트 바이너리가 함께 쓰는 에러 타입, 설정 구조체,
//! 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EngineError, IronwallError, ParseError};

// 설정
pub use config::{EngineSection, GeneralConfig, IronwallConfig};
