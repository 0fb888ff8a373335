//! 대역 기반 지역 정책
//!
//! 실제 지리 DB 대신 IPv4 대역 규칙으로 허용/거부를 정합니다. 가장 긴
//! 접두사가 일치하는 규칙이 이기고, 아무 규칙도 일치하지 않으면 기본 동작을
//! 따릅니다. 규칙 교체는 [`ArcSwap`] 스냅샷 교체로 이뤄집니다.

use std::net::Ipv4Addr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// 지역 정책 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoAction {
    Allow,
    Deny,
}

/// 대역 규칙
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRule {
    pub net: Ipv4Net,
    pub action: GeoAction,
}

impl GeoRule {
    pub fn allow(net: Ipv4Net) -> Self {
        Self {
            net: net.trunc(),
            action: GeoAction::Allow,
        }
    }

    pub fn deny(net: Ipv4Net) -> Self {
        Self {
            net: net.trunc(),
            action: GeoAction::Deny,
        }
    }
}

/// 규칙 집합 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoTable {
    /// 접두사 길이 내림차순으로 정렬된 규칙
    rules: Vec<GeoRule>,
    default_action: GeoAction,
}

impl GeoTable {
    /// 규칙을 접두사 길이 내림차순으로 정렬해 만듭니다.
    ///
    /// 같은 접두사 길이에서는 입력 순서를 유지하므로 먼저 적힌 규칙이 이깁니다.
    pub fn new(rules: Vec<GeoRule>, default_action: GeoAction) -> Self {
        let mut rules: Vec<GeoRule> = rules
            .into_iter()
            .map(|r| GeoRule {
                net: r.net.trunc(),
                action: r.action,
            })
            .collect();
        rules.sort_by(|a, b| b.net.prefix_len().cmp(&a.net.prefix_len()));
        Self {
            rules,
            default_action,
        }
    }

    /// 사설 대역 192.168.0.0/16 허용, 1.0.0.0/8 거부, 나머지 허용
    pub fn legacy() -> Self {
        Self::new(
            vec![
                GeoRule::allow(range(Ipv4Addr::new(192, 168, 0, 0), 16)),
                GeoRule::deny(range(Ipv4Addr::new(1, 0, 0, 0), 8)),
            ],
            GeoAction::Allow,
        )
    }

    /// 주소에 적용될 동작을 반환합니다.
    pub fn lookup(&self, addr: Ipv4Addr) -> GeoAction {
        self.rules
            .iter()
            .find(|rule| rule.net.contains(&addr))
            .map_or(self.default_action, |rule| rule.action)
    }

    pub fn rules(&self) -> &[GeoRule] {
        &self.rules
    }

    pub fn default_action(&self) -> GeoAction {
        self.default_action
    }
}

/// 접두사 길이가 32 이하이므로 실패하지 않음
fn range(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Net {
    Ipv4Net::new(addr, prefix_len).unwrap_or_else(|_| Ipv4Net::from(addr))
}

impl Default for GeoTable {
    fn default() -> Self {
        Self::legacy()
    }
}

/// 교체 가능한 지역 정책
pub struct GeoFilter {
    table: ArcSwap<GeoTable>,
}

impl GeoFilter {
    pub fn new(table: GeoTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// 출발지 주소의 정책 판정
    #[inline]
    pub fn policy(&self, addr: Ipv4Addr) -> GeoAction {
        self.table.load().lookup(addr)
    }

    /// 규칙 전체를 교체합니다.
    pub fn replace(&self, table: GeoTable) {
        self.table.store(Arc::new(table));
    }

    pub fn snapshot(&self) -> Arc<GeoTable> {
        self.table.load_full()
    }
}

impl Default for GeoFilter {
    fn default() -> Self {
        Self::new(GeoTable::legacy())
    }
}
