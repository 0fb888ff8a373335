//! 페이로드 검사: 고정 시그니처 스캔
//!
//! TCP 페이로드를 순서가 있는 `(패턴, 동작)` 목록과 차례로 비교합니다.
//! 처음 일치한 시그니처가 결과를 정하고, 아무것도 일치하지 않으면 통과입니다.
//! 목록은 [`ArcSwap`] 스냅샷으로 보관되어 실행 중 교체할 수 있습니다.
//!
//! 기본 시그니처:
//! - `sql-select-prefix`: 페이로드가 ASCII `SELECT`로 시작 (거친 SQL 인젝션 휴리스틱)
//! - `nop-sled`: `0x90` 네 바이트 연속 (x86 NOP 슬레드)

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// 패턴 비교 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// 페이로드 첫 바이트부터 일치
    Prefix(Vec<u8>),
    /// 페이로드 어디든 포함
    Contains(Vec<u8>),
}

impl Pattern {
    /// 페이로드가 패턴과 일치하는지 확인합니다. 빈 패턴은 일치하지 않습니다.
    pub fn matches(&self, payload: &[u8]) -> bool {
        match self {
            Self::Prefix(needle) => !needle.is_empty() && payload.starts_with(needle),
            Self::Contains(needle) => {
                !needle.is_empty()
                    && payload.len() >= needle.len()
                    && payload.windows(needle.len()).any(|w| w == needle.as_slice())
            }
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Prefix(b) | Self::Contains(b) => b,
        }
    }
}

/// 일치 시 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAction {
    Drop,
    Allow,
}

/// 시그니처
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: Arc<str>,
    pub pattern: Pattern,
    pub action: SignatureAction,
}

impl Signature {
    pub fn new(name: &str, pattern: Pattern, action: SignatureAction) -> Self {
        Self {
            name: Arc::from(name),
            pattern,
            action,
        }
    }

    /// 기본 시그니처 목록
    pub fn defaults() -> Vec<Signature> {
        vec![
            Self::new(
                "sql-select-prefix",
                Pattern::Prefix(b"SELECT".to_vec()),
                SignatureAction::Drop,
            ),
            Self::new(
                "nop-sled",
                Pattern::Contains(vec![0x90; 4]),
                SignatureAction::Drop,
            ),
        ]
    }
}

/// 검사 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// 검사 대상 아님 (너무 짧음)
    Skipped,
    /// 일치 없음
    Clean,
    /// 시그니처 일치
    Matched {
        signature: Arc<str>,
        action: SignatureAction,
    },
}

impl Inspection {
    /// 차단해야 하는 결과인지
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            Self::Matched {
                action: SignatureAction::Drop,
                ..
            }
        )
    }
}

/// 페이로드 검사기
pub struct PayloadInspector {
    signatures: ArcSwap<Vec<Signature>>,
    min_payload: usize,
}

impl PayloadInspector {
    /// `min_payload`보다 짧은 페이로드는 검사하지 않습니다.
    pub fn new(signatures: Vec<Signature>, min_payload: usize) -> Self {
        Self {
            signatures: ArcSwap::from_pointee(signatures),
            min_payload,
        }
    }

    pub fn inspect(&self, payload: &[u8]) -> Inspection {
        if payload.len() < self.min_payload {
            return Inspection::Skipped;
        }
        let signatures = self.signatures.load();
        signatures
            .iter()
            .find(|sig| sig.pattern.matches(payload))
            .map_or(Inspection::Clean, |sig| Inspection::Matched {
                signature: Arc::clone(&sig.name),
                action: sig.action,
            })
    }

    /// 시그니처 목록 전체를 교체합니다.
    pub fn replace(&self, signatures: Vec<Signature>) {
        self.signatures.store(Arc::new(signatures));
    }

    pub fn signatures(&self) -> Arc<Vec<Signature>> {
        self.signatures.load_full()
    }

    pub fn min_payload(&self) -> usize {
        self.min_payload
    }
}

impl Default for PayloadInspector {
    fn default() -> Self {
        Self::new(Signature::defaults(), 11)
    }
}
