#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

use citadel_mail::{open_naked, MessageEnvelope, OrgKey, UserKey};

static KEYS: Lazy<(OrgKey, UserKey)> = Lazy::new(|| (OrgKey::generate(), UserKey::generate()));

static SEED: Lazy<Vec<u8>> = Lazy::new(|| {
    let (org, user) = &*KEYS;
    MessageEnvelope::seal_naked(b"Subject: seed\r\n\r\nbody\r\n", org, &user.signet())
        .map(MessageEnvelope::into_bytes)
        .unwrap_or_default()
});

fuzz_target!(|data: &[u8]| {
    let (org, user) = &*KEYS;

    // Raw input.
    let _ = open_naked(data, &org.signet(), user);

    // Input overlaid on a valid message, so mutations reach the later stages.
    let mut overlay = SEED.clone();
    if data.len() >= 3 && !overlay.is_empty() {
        let at = u16::from_be_bytes([data[0], data[1]]) as usize % overlay.len();
        for (dst, src) in overlay[at..].iter_mut().zip(&data[2..]) {
            *dst ^= *src;
        }
        let changed = data[2..].iter().take(overlay.len() - at).any(|&b| b != 0);
        let result = open_naked(&overlay, &org.signet(), user);
        assert!(!changed || result.is_err());
    }
});
