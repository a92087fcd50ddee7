#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    if let Ok(cfg) = sorter_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let (outlets, _) = sorter_config::resolve_outlets(&cfg, None);
            assert!(!outlets.is_empty());
        }
    }
});
