#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(info) = citadel_mail::inspect(data) {
        let walked: usize = info.chunks.iter().map(|chunk| chunk.total_bytes).sum();
        assert_eq!(walked + 6, data.len());
        let _ = info.to_string();
    }
});
