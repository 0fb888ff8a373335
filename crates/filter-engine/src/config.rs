//! 필터 엔진 설정: 스칼라 튜닝 값과 목록형 정책
//!
//! [`FilterConfig`]는 core의 [`EngineSection`]을 확장하여 블랙리스트,
//! 지역 규칙, 시그니처 같은 목록형 정책을 함께 담습니다.
//! `from_core()`로 core 설정에서 생성하고, `load_policy()`로 TOML 정책 파일을 읽습니다.
//!
//! # 정책 파일 예시 (TOML)
//! ```toml
//! [[blacklist]]
//! addr = "203.0.113.7/32"
//!
//! [[blacklist]]
//! addr = "198.51.100.0/24"
//!
//! [geo]
//! default_action = "allow"
//! rules = [
//!     { net = "192.168.0.0/16", action = "allow" },
//!     { net = "1.0.0.0/8", action = "deny" },
//! ]
//!
//! [[signatures]]
//! name = "sql-select-prefix"
//! kind = "prefix"
//! text = "SELECT"
//!
//! [[signatures]]
//! name = "nop-sled"
//! kind = "contains"
//! hex = "90909090"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ironwall_core::config::EngineSection;
use ironwall_core::error::IronwallError;

use crate::blacklist::BlacklistEntry;
use crate::conntrack::{ClosingSynPolicy, ConntrackConfig};
use crate::detector::SynFloodConfig;
use crate::error::FilterError;
use crate::geo::{GeoAction, GeoRule, GeoTable};
use crate::inspector::{Pattern, Signature, SignatureAction};

/// 정책 파일 최대 크기 (바이트)
pub const MAX_POLICY_FILE_SIZE: u64 = 16 * 1024 * 1024;

// =============================================================================
// 정책
// =============================================================================

/// 시그니처 패턴 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// 페이로드 시작 일치
    Prefix,
    /// 페이로드 내 포함
    #[default]
    Contains,
}

fn default_signature_action() -> SignatureAction {
    SignatureAction::Drop
}

/// 정책 파일의 시그니처 정의
///
/// `text`(ASCII)와 `hex` 중 정확히 하나를 지정합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSpec {
    /// 시그니처 이름
    pub name: String,
    /// 패턴 종류 (기본: contains)
    #[serde(default)]
    pub kind: PatternKind,
    /// ASCII 패턴
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// 16진수 패턴
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    /// 일치 시 동작 (기본: drop)
    #[serde(default = "default_signature_action")]
    pub action: SignatureAction,
}

impl SignatureSpec {
    /// 검사기용 [`Signature`]로 변환합니다.
    pub fn to_signature(&self) -> Result<Signature, FilterError> {
        let invalid = |reason: &str| FilterError::InvalidSignature {
            name: self.name.clone(),
            reason: reason.to_owned(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }

        let bytes = match (&self.text, &self.hex) {
            (Some(text), None) => text.as_bytes().to_vec(),
            (None, Some(hex_str)) => hex::decode(hex_str.trim())
                .map_err(|e| invalid(&format!("invalid hex pattern: {e}")))?,
            (Some(_), Some(_)) => return Err(invalid("set either 'text' or 'hex', not both")),
            (None, None) => return Err(invalid("one of 'text' or 'hex' is required")),
        };

        if bytes.is_empty() {
            return Err(invalid("pattern must not be empty"));
        }

        let pattern = match self.kind {
            PatternKind::Prefix => Pattern::Prefix(bytes),
            PatternKind::Contains => Pattern::Contains(bytes),
        };
        Ok(Signature::new(&self.name, pattern, self.action))
    }

    /// 검사기 시그니처에서 정의를 만듭니다 (항상 hex 표기).
    pub fn from_signature(signature: &Signature) -> Self {
        let kind = match signature.pattern {
            Pattern::Prefix(_) => PatternKind::Prefix,
            Pattern::Contains(_) => PatternKind::Contains,
        };
        Self {
            name: signature.name.to_string(),
            kind,
            text: None,
            hex: Some(hex::encode(signature.pattern.bytes())),
            action: signature.action,
        }
    }
}

/// 지역 정책
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPolicy {
    /// 일치하는 규칙이 없을 때의 동작
    pub default_action: GeoAction,
    /// 대역 규칙. 지정하지 않으면 기본 규칙(192.168.0.0/16 허용, 1.0.0.0/8 거부)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<GeoRule>>,
}

impl Default for GeoPolicy {
    fn default() -> Self {
        Self {
            default_action: GeoAction::Allow,
            rules: None,
        }
    }
}

impl GeoPolicy {
    /// 조회용 규칙 테이블을 만듭니다.
    pub fn to_table(&self) -> GeoTable {
        let rules = self
            .rules
            .clone()
            .unwrap_or_else(|| GeoTable::legacy().rules().to_vec());
        GeoTable::new(rules, self.default_action)
    }
}

/// 목록형 정책 (정책 파일 최상위 구조)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 블랙리스트 엔트리
    pub blacklist: Vec<BlacklistEntry>,
    /// 지역 정책
    pub geo: GeoPolicy,
    /// 시그니처. 지정하지 않으면 기본 시그니처, 빈 목록이면 검사 규칙 없음
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<SignatureSpec>>,
}

impl PolicyConfig {
    /// TOML 문자열에서 정책을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FilterError> {
        toml::from_str(toml_str).map_err(|e| FilterError::PolicyLoad {
            path: "<inline>".to_owned(),
            reason: e.to_string(),
        })
    }

    /// 검사기용 시그니처 목록을 만듭니다.
    pub fn compile_signatures(&self) -> Result<Vec<Signature>, FilterError> {
        match &self.signatures {
            None => Ok(Signature::defaults()),
            Some(specs) => specs.iter().map(SignatureSpec::to_signature).collect(),
        }
    }

    /// 정책 값을 검증합니다.
    pub fn validate(&self) -> Result<(), FilterError> {
        self.compile_signatures().map(|_| ())
    }
}

// =============================================================================
// 엔진 설정
// =============================================================================

/// 필터 엔진 설정
///
/// core의 [`EngineSection`]을 기반으로 목록형 정책을 추가합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// core에서 가져온 스칼라 설정
    #[serde(flatten)]
    pub base: EngineSection,
    /// 목록형 정책
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl FilterConfig {
    /// core EngineSection에서 엔진 설정을 생성합니다 (기본 정책).
    pub fn from_core(section: &EngineSection) -> Self {
        Self {
            base: section.clone(),
            policy: PolicyConfig::default(),
        }
    }

    /// core 설정에서 생성하고, `policy_path`가 지정되어 있으면 정책 파일을 읽습니다.
    pub async fn resolve(section: &EngineSection) -> Result<Self, IronwallError> {
        let mut config = Self::from_core(section);
        if !section.policy_path.is_empty() {
            config.policy = Self::load_policy(&section.policy_path).await?;
        }
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 정책을 로드합니다.
    ///
    /// 파일이 존재하지 않으면 경고를 남기고 기본 정책을 반환합니다.
    pub async fn load_policy(path: impl AsRef<Path>) -> Result<PolicyConfig, FilterError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %shown, "policy file not found, using default policy");
                return Ok(PolicyConfig::default());
            }
            Err(e) => {
                return Err(FilterError::Io {
                    path: shown,
                    source: e,
                });
            }
        };

        if metadata.len() > MAX_POLICY_FILE_SIZE {
            return Err(FilterError::PolicyLoad {
                path: shown,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_POLICY_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FilterError::Io {
                path: shown.clone(),
                source: e,
            })?;

        let policy: PolicyConfig =
            toml::from_str(&content).map_err(|e| FilterError::PolicyLoad {
                path: shown.clone(),
                reason: e.to_string(),
            })?;
        policy.validate()?;

        debug!(
            path = %shown,
            blacklist = policy.blacklist.len(),
            signatures = policy.signatures.as_ref().map_or(0, Vec::len),
            "policy loaded"
        );
        Ok(policy)
    }

    /// 스칼라 값과 정책을 모두 검증합니다.
    pub fn validate(&self) -> Result<(), IronwallError> {
        self.base.validate()?;
        self.closing_syn_policy()?;
        self.policy.validate()?;
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.base.rate_window_ms)
    }

    pub fn syn_min_gap(&self) -> Duration {
        Duration::from_micros(self.base.syn_min_gap_us)
    }

    pub fn connection_idle(&self) -> Duration {
        Duration::from_secs(self.base.connection_idle_secs)
    }

    /// 조각 최소 크기. 검증을 거친 값은 u16 범위 안입니다.
    pub fn fragment_min_size(&self) -> u16 {
        u16::try_from(self.base.fragment_min_size).unwrap_or(u16::MAX)
    }

    pub fn closing_syn_policy(&self) -> Result<ClosingSynPolicy, FilterError> {
        self.base
            .closing_syn_policy
            .parse()
            .map_err(|reason: String| FilterError::invalid_config("closing_syn_policy", reason))
    }

    pub fn conntrack_config(&self) -> Result<ConntrackConfig, FilterError> {
        Ok(ConntrackConfig {
            capacity: self.base.max_connections,
            idle_timeout: self.connection_idle(),
            closing_syn: self.closing_syn_policy()?,
        })
    }

    pub fn syn_flood_config(&self) -> SynFloodConfig {
        SynFloodConfig {
            min_gap: self.syn_min_gap(),
            capacity: self.base.max_syn_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn from_core_uses_default_policy() {
        let config = FilterConfig::from_core(&EngineSection::default());
        assert!(config.policy.blacklist.is_empty());
        assert!(config.policy.signatures.is_none());
        assert_eq!(config.rate_window(), Duration::from_secs(1));
        assert_eq!(config.syn_min_gap(), Duration::from_millis(1));
        assert_eq!(config.connection_idle(), Duration::from_secs(300));
        assert_eq!(config.fragment_min_size(), 60);
        assert_eq!(config.closing_syn_policy().unwrap(), ClosingSynPolicy::Ignore);
        config.validate().unwrap();
    }

    #[test]
    fn default_policy_compiles_default_signatures() {
        let signatures = PolicyConfig::default().compile_signatures().unwrap();
        assert_eq!(signatures, Signature::defaults());
    }

    #[test]
    fn empty_signature_list_disables_inspection_rules() {
        let policy = PolicyConfig::parse("signatures = []").unwrap();
        assert!(policy.compile_signatures().unwrap().is_empty());
    }

    #[test]
    fn parse_full_policy() {
        let policy = PolicyConfig::parse(
            r#"
[[blacklist]]
addr = "203.0.113.7/32"

[[blacklist]]
addr = "198.51.100.0/24"
blocked = false

[geo]
default_action = "deny"
rules = [{ net = "10.0.0.0/8", action = "allow" }]

[[signatures]]
name = "ssh-banner"
kind = "prefix"
text = "SSH-1."

[[signatures]]
name = "nop-sled"
hex = "90909090"
action = "drop"
"#,
        )
        .unwrap();

        assert_eq!(policy.blacklist.len(), 2);
        assert!(policy.blacklist[0].blocked);
        assert!(!policy.blacklist[1].blocked);

        let geo = policy.geo.to_table();
        assert_eq!(geo.default_action(), GeoAction::Deny);
        assert_eq!(geo.lookup(Ipv4Addr::new(10, 1, 2, 3)), GeoAction::Allow);
        assert_eq!(geo.lookup(Ipv4Addr::new(8, 8, 8, 8)), GeoAction::Deny);

        let signatures = policy.compile_signatures().unwrap();
        assert_eq!(signatures[0].pattern, Pattern::Prefix(b"SSH-1.".to_vec()));
        assert_eq!(signatures[1].pattern, Pattern::Contains(vec![0x90; 4]));
    }

    #[test]
    fn geo_without_rules_uses_legacy_ranges() {
        let table = GeoPolicy::default().to_table();
        assert_eq!(table, GeoTable::legacy());
    }

    #[test]
    fn signature_requires_exactly_one_pattern() {
        let both = SignatureSpec {
            name: "x".to_owned(),
            kind: PatternKind::Contains,
            text: Some("a".to_owned()),
            hex: Some("61".to_owned()),
            action: SignatureAction::Drop,
        };
        assert!(matches!(
            both.to_signature(),
            Err(FilterError::InvalidSignature { .. })
        ));

        let neither = SignatureSpec {
            text: None,
            hex: None,
            ..both.clone()
        };
        assert!(neither.to_signature().is_err());
    }

    #[test]
    fn signature_rejects_bad_hex_and_empty_pattern() {
        let bad_hex = SignatureSpec {
            name: "odd".to_owned(),
            kind: PatternKind::Contains,
            text: None,
            hex: Some("909".to_owned()),
            action: SignatureAction::Drop,
        };
        assert!(bad_hex.to_signature().is_err());

        let empty = SignatureSpec {
            hex: None,
            text: Some(String::new()),
            ..bad_hex
        };
        let err = empty.to_signature().unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn signature_spec_from_signature_uses_hex() {
        let spec = SignatureSpec::from_signature(&Signature::defaults()[0]);
        assert_eq!(spec.kind, PatternKind::Prefix);
        assert_eq!(spec.hex.as_deref(), Some("53454c454354"));
        assert_eq!(spec.to_signature().unwrap(), Signature::defaults()[0]);
    }

    #[test]
    fn invalid_closing_syn_policy_is_rejected() {
        let mut section = EngineSection::default();
        section.closing_syn_policy = "drop-everything".to_owned();
        let config = FilterConfig::from_core(&section);
        assert!(config.closing_syn_policy().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_policy_fails_validation() {
        let mut config = FilterConfig::default();
        config.policy.signatures = Some(vec![SignatureSpec {
            name: String::new(),
            kind: PatternKind::Prefix,
            text: Some("x".to_owned()),
            hex: None,
            action: SignatureAction::Drop,
        }]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, IronwallError::Engine(_)));
    }

    #[tokio::test]
    async fn load_policy_missing_file_returns_default() {
        let policy = FilterConfig::load_policy("/nonexistent/ironwall/policy.toml")
            .await
            .unwrap();
        assert_eq!(policy, PolicyConfig::default());
    }

    #[tokio::test]
    async fn load_policy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "[[blacklist]]\naddr = \"192.0.2.1/32\"\n").unwrap();

        let policy = FilterConfig::load_policy(&path).await.unwrap();
        assert_eq!(policy.blacklist.len(), 1);
    }

    #[tokio::test]
    async fn load_policy_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "[[blacklist]]\naddr = \"not-an-ip\"\n").unwrap();

        let err = FilterConfig::load_policy(&path).await.unwrap_err();
        assert!(matches!(err, FilterError::PolicyLoad { .. }));
    }

    #[tokio::test]
    async fn resolve_reads_policy_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "signatures = []\n").unwrap();

        let mut section = EngineSection::default();
        section.policy_path = path.display().to_string();
        let config = FilterConfig::resolve(&section).await.unwrap();
        assert_eq!(config.policy.signatures, Some(Vec::new()));
    }
}
