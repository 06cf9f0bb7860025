#![no_main]

use libfuzzer_sys::fuzz_target;
use reqparser::{qs, QueryOptions};

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let fields = qs::decode(&input, &QueryOptions::new().max_params(64));
    assert!(fields.len() <= 64);

    let _ = qs::decode(&qs::encode(&fields), &QueryOptions::new());
});
