#![no_main]

use libfuzzer_sys::fuzz_target;
use logharvest_log_pipeline::decoder::{JsonMessageDecoder, MessageDecoder};

fuzz_target!(|data: &[u8]| {
    let decoder = JsonMessageDecoder::default();
    let _ = decoder.decode(data);
});
