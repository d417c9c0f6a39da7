#![no_main]

use libfuzzer_sys::fuzz_target;
use std::panic::AssertUnwindSafe;
use varlens_lsp::scanner;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| scanner::find_all(content)));

        if let Ok(matches) = result {
            for m in &matches {
                assert!(m.from <= m.to, "inverted span");
                assert!(m.to <= content.len(), "span out of bounds");
                assert!(content.is_char_boundary(m.from), "from not a char boundary");
                assert!(content.is_char_boundary(m.to), "to not a char boundary");
                assert!(scanner::is_valid_key(&m.key), "invalid key reported");
            }
            for pair in matches.windows(2) {
                assert!(pair[0].to <= pair[1].from, "matches overlap");
            }

            // Any position inside a reported span must be found by match_at.
            if let Some(first) = matches.first() {
                assert!(scanner::match_at(content, first.from).is_some());
                assert!(scanner::match_at(content, first.to).is_some());
            }
        }
    }
});
