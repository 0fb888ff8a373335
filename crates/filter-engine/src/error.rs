//! 필터 엔진 에러 타입
//!
//! [`FilterError`]는 엔진 구성과 정책 관리에서 발생하는 에러입니다.
//! 패킷 판정 자체는 에러를 반환하지 않습니다. 잘못된 프레임은 DROP 판정입니다.
//!
//! `From<FilterError> for IronwallError` 구현으로 `?` 연산자를 통해
//! 상위 에러 타입으로 전파됩니다.

use ironwall_core::error::{ConfigError, EngineError, IronwallError};

/// 필터 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// 설정 값이 유효하지 않음
    #[error("invalid config: {field}: {reason}")]
    InvalidConfig {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 시그니처 정의가 유효하지 않음
    #[error("invalid signature '{name}': {reason}")]
    InvalidSignature {
        /// 시그니처 이름
        name: String,
        /// 에러 사유
        reason: String,
    },

    /// 정책 파일 로딩 실패
    #[error("policy load error: {path}: {reason}")]
    PolicyLoad {
        /// 정책 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },
}

impl FilterError {
    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<FilterError> for IronwallError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidConfig { field, reason } => {
                IronwallError::Config(ConfigError::InvalidValue { field, reason })
            }
            FilterError::InvalidSignature { name, reason } => IronwallError::Engine(
                EngineError::Policy(format!("invalid signature '{name}': {reason}")),
            ),
            FilterError::PolicyLoad { path, reason } => IronwallError::Engine(
                EngineError::Policy(format!("policy load error: {path}: {reason}")),
            ),
            FilterError::Io { path, source } => IronwallError::Engine(EngineError::Policy(
                format!("io error: {path}: {source}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let err = FilterError::invalid_config("rate_threshold", "must be greater than 0");
        let msg = err.to_string();
        assert!(msg.contains("rate_threshold"));
        assert!(msg.contains("must be greater than 0"));
    }

    #[test]
    fn invalid_signature_display() {
        let err = FilterError::InvalidSignature {
            name: "nop-sled".to_owned(),
            reason: "odd number of hex digits".to_owned(),
        };
        assert!(err.to_string().contains("nop-sled"));
    }

    #[test]
    fn invalid_config_converts_to_config_error() {
        let err: IronwallError = FilterError::invalid_config("syn_min_gap", "zero").into();
        assert!(matches!(
            err,
            IronwallError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn policy_errors_convert_to_engine_error() {
        let err: IronwallError = FilterError::PolicyLoad {
            path: "/etc/ironwall/policy.toml".to_owned(),
            reason: "expected table".to_owned(),
        }
        .into();
        assert!(matches!(err, IronwallError::Engine(EngineError::Policy(_))));
        assert!(err.to_string().contains("policy.toml"));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: IronwallError = FilterError::Io {
            path: "/tmp/p".to_owned(),
            source: io_err,
        }
        .into();
        assert!(err.to_string().contains("denied"));
    }
}
