#![no_main]
use apkdock::parser::{parse, DialectKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let _ = parse(&raw, DialectKind::Narrative);
});
