#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ironwall_filter_engine::{FilterConfig, FilterEngine, Timestamp};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 작은 임계값으로 속도 제한 경로까지 도달시킴
    rate_threshold: u8,
    closing_policy: u8,
    frames: Vec<FuzzFrame>,
}

#[derive(Arbitrary, Debug)]
struct FuzzFrame {
    /// 이전 프레임과의 간격 (마이크로초)
    gap_us: u16,
    bytes: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let mut config = FilterConfig::default();
    config.base.rate_threshold = u64::from(input.rate_threshold).max(1);
    config.base.max_connections = 64;
    config.base.max_rate_entries = 64;
    config.base.max_syn_entries = 64;
    config.base.closing_syn_policy = match input.closing_policy % 3 {
        0 => "ignore",
        1 => "restart",
        _ => "reject",
    }
    .to_owned();

    let Ok(engine) = FilterEngine::builder().config(config).build() else {
        return;
    };

    let frames = &input.frames[..input.frames.len().min(256)];
    let mut now = 0u64;
    for frame in frames {
        now += u64::from(frame.gap_us) * 1_000;
        engine.classify(&frame.bytes, Timestamp::from_nanos(now));
    }
    engine.evict_idle(Timestamp::from_nanos(now));

    let stats = engine.get_stats();
    assert_eq!(stats.total, frames.len() as u64);
    assert_eq!(stats.allowed + stats.dropped + stats.rate_limited, stats.total);
    assert!(engine.connection_count() <= 64);
});
