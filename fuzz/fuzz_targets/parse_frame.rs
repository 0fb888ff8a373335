#![no_main]

use libfuzzer_sys::fuzz_target;
use ironwall_filter_engine::{Frame, parse_frame};

fuzz_target!(|data: &[u8]| {
    if let Ok(Frame::Ipv4(packet)) = parse_frame(data) {
        // 페이로드는 항상 입력 버퍼 안에 있어야 함
        let payload = packet.payload();
        assert!(payload.len() <= data.len());
        assert!(packet.header_len >= 20);
    }
});
