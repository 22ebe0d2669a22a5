#![no_main]

use keymerge::CompositeKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<String>, String)| {
    let (parts, separator) = input;
    if parts.is_empty() || separator.is_empty() || separator.starts_with('\\') {
        return;
    }
    let key = CompositeKey::new(parts);
    let decoded = CompositeKey::decode(&key.encode(&separator), &separator).expect("decode");
    assert_eq!(decoded, key);
});
