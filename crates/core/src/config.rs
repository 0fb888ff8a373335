//! 설정 관리: ironwall.toml 파싱 및 런타임 설정
//!
//! [`IronwallConfig`]는 호스트와 필터 엔진의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONWALL_ENGINE_RATE_THRESHOLD=5000` 형식)
//! 3. 설정 파일 (`ironwall.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironwall_core::error::IronwallError> {
//! use ironwall_core::config::IronwallConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronwallConfig::load("ironwall.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronwallConfig::parse("[engine]\nrate_threshold = 500")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronwallError};

/// 테이블 용량 상한
const MAX_TABLE_CAPACITY: usize = 64 * 1024 * 1024;

/// 허용되는 CLOSING 상태 SYN 처리 정책
pub const CLOSING_SYN_POLICIES: [&str; 3] = ["ignore", "restart", "reject"];

/// Ironwall 통합 설정
///
/// `ironwall.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronwallConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 필터 엔진 설정
    #[serde(default)]
    pub engine: EngineSection,
}

impl IronwallConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronwallError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronwallError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronwallError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronwallError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronwallError> {
        toml::from_str(toml_str).map_err(|e| {
            IronwallError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONWALL_{SECTION}_{FIELD}`
    /// 예: `IRONWALL_ENGINE_RATE_THRESHOLD=5000`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONWALL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONWALL_GENERAL_LOG_FORMAT");

        // Engine
        let engine = &mut self.engine;
        override_u64(&mut engine.rate_window_ms, "IRONWALL_ENGINE_RATE_WINDOW_MS");
        override_u64(&mut engine.rate_threshold, "IRONWALL_ENGINE_RATE_THRESHOLD");
        override_u64(
            &mut engine.icmp_rate_threshold,
            "IRONWALL_ENGINE_ICMP_RATE_THRESHOLD",
        );
        override_u64(
            &mut engine.syn_rate_threshold,
            "IRONWALL_ENGINE_SYN_RATE_THRESHOLD",
        );
        override_u64(&mut engine.syn_min_gap_us, "IRONWALL_ENGINE_SYN_MIN_GAP_US");
        override_usize(
            &mut engine.fragment_min_size,
            "IRONWALL_ENGINE_FRAGMENT_MIN_SIZE",
        );
        override_bool(&mut engine.inspect_payload, "IRONWALL_ENGINE_INSPECT_PAYLOAD");
        override_usize(
            &mut engine.inspect_min_payload,
            "IRONWALL_ENGINE_INSPECT_MIN_PAYLOAD",
        );
        override_usize(&mut engine.dns_max_udp_len, "IRONWALL_ENGINE_DNS_MAX_UDP_LEN");
        override_usize(&mut engine.max_connections, "IRONWALL_ENGINE_MAX_CONNECTIONS");
        override_usize(
            &mut engine.max_rate_entries,
            "IRONWALL_ENGINE_MAX_RATE_ENTRIES",
        );
        override_usize(&mut engine.max_syn_entries, "IRONWALL_ENGINE_MAX_SYN_ENTRIES");
        override_u64(
            &mut engine.connection_idle_secs,
            "IRONWALL_ENGINE_CONNECTION_IDLE_SECS",
        );
        override_string(
            &mut engine.closing_syn_policy,
            "IRONWALL_ENGINE_CLOSING_SYN_POLICY",
        );
        override_string(&mut engine.policy_path, "IRONWALL_ENGINE_POLICY_PATH");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronwallError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.engine.validate()
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 필터 엔진 설정 (`[engine]` 섹션)
///
/// 스칼라 튜닝 값만 담습니다. 블랙리스트, 지역 규칙, 시그니처 같은
/// 목록형 정책은 `policy_path`가 가리키는 별도 파일에서 읽습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 속도 제한 윈도우 길이 (밀리초)
    pub rate_window_ms: u64,
    /// 소스 주소당 윈도우 내 허용 패킷 수
    pub rate_threshold: u64,
    /// ICMP 전용 버킷 임계값
    pub icmp_rate_threshold: u64,
    /// SYN 전용 버킷 임계값
    pub syn_rate_threshold: u64,
    /// 같은 소스의 연속 SYN 최소 간격 (마이크로초)
    pub syn_min_gap_us: u64,
    /// 조각 패킷의 최소 IP 전체 길이 (바이트)
    pub fragment_min_size: usize,
    /// 페이로드 검사 활성화 여부
    pub inspect_payload: bool,
    /// 검사 대상 최소 TCP 페이로드 길이 (바이트)
    pub inspect_min_payload: usize,
    /// DNS(53) 요청 UDP 최대 길이 (바이트)
    pub dns_max_udp_len: usize,
    /// 연결 추적 테이블 용량
    pub max_connections: usize,
    /// 속도 제한 테이블 용량
    pub max_rate_entries: usize,
    /// SYN 타이밍 테이블 용량
    pub max_syn_entries: usize,
    /// 유휴 연결 만료 시간 (초)
    pub connection_idle_secs: u64,
    /// CLOSING 상태에서 SYN 수신 시 정책 (ignore, restart, reject)
    pub closing_syn_policy: String,
    /// 정책 파일 경로 (비어 있으면 기본 정책 사용)
    pub policy_path: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            rate_window_ms: 1_000,
            rate_threshold: 10_000,
            icmp_rate_threshold: 10_000,
            syn_rate_threshold: 10_000,
            syn_min_gap_us: 1_000,
            fragment_min_size: 60,
            inspect_payload: true,
            inspect_min_payload: 11,
            dns_max_udp_len: 512,
            max_connections: 1_000_000,
            max_rate_entries: 1_000_000,
            max_syn_entries: 1_000_000,
            connection_idle_secs: 300,
            closing_syn_policy: "ignore".to_owned(),
            policy_path: String::new(),
        }
    }
}

impl EngineSection {
    /// 엔진 섹션의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronwallError> {
        if self.rate_window_ms == 0 {
            return Err(invalid("engine.rate_window_ms", "must be greater than 0"));
        }

        let thresholds = [
            ("engine.rate_threshold", self.rate_threshold),
            ("engine.icmp_rate_threshold", self.icmp_rate_threshold),
            ("engine.syn_rate_threshold", self.syn_rate_threshold),
        ];
        for (field, value) in thresholds {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        let capacities = [
            ("engine.max_connections", self.max_connections),
            ("engine.max_rate_entries", self.max_rate_entries),
            ("engine.max_syn_entries", self.max_syn_entries),
        ];
        for (field, value) in capacities {
            if value == 0 || value > MAX_TABLE_CAPACITY {
                return Err(invalid(
                    field,
                    format!("must be between 1 and {MAX_TABLE_CAPACITY}"),
                ));
            }
        }

        if self.connection_idle_secs == 0 {
            return Err(invalid(
                "engine.connection_idle_secs",
                "must be greater than 0",
            ));
        }

        if self.fragment_min_size > usize::from(u16::MAX) {
            return Err(invalid(
                "engine.fragment_min_size",
                "must fit an IPv4 total length",
            ));
        }

        if !CLOSING_SYN_POLICIES.contains(&self.closing_syn_policy.as_str()) {
            return Err(invalid(
                "engine.closing_syn_policy",
                format!("must be one of: {}", CLOSING_SYN_POLICIES.join(", ")),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> IronwallError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
