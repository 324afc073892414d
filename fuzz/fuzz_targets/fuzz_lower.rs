#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = itpmc_dsl::parse(s, "fuzz.imc") {
            if let Ok(cfa) = itpmc_ir::lowering::lower(&program) {
                // Loop heads must only ever name existing locations.
                assert!(cfa.loop_heads.iter().all(|&l| l < cfa.locations.len()));
            }
        }
    }
});
