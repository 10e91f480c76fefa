#![no_main]

use libfuzzer_sys::fuzz_target;
use xtrust_lib::Pkcs12;

fuzz_target!(|data: &[u8]| {
    let mut archive = Pkcs12::new();
    if archive.import(data, "").is_ok() {
        if let Ok(count) = archive.count() {
            for i in 0..count {
                let _ = archive.certificate(i);
            }
        }
        if let Ok(key) = archive.private_key() {
            let _ = key.bytes(true);
        }
    }
});
