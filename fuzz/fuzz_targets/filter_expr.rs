#![no_main]

use libfuzzer_sys::fuzz_target;
use std::collections::BTreeSet;
use stepwatch::filter::parse_filter_expr;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing must never panic; a parsed filter must evaluate any name.
        if let Ok(filter) = parse_filter_expr(input) {
            let tags: BTreeSet<String> = input.split(',').map(str::to_string).collect();
            let _ = filter.excludes(input, &tags);
        }
    }
});
