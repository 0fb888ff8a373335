#![no_main]

use libfuzzer_sys::fuzz_target;
use ironwall_filter_engine::PolicyConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(policy) = PolicyConfig::parse(content) {
            // 검증을 통과한 정책은 항상 컴파일되어야 함
            if policy.validate().is_ok() {
                assert!(policy.compile_signatures().is_ok());
                let _ = policy.geo.to_table();
            }
        }
    }
});
