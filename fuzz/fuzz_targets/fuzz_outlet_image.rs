#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any accepted image must re-encode to the bytes it was decoded from.
    if let Some(table) = sorter_config::decode_outlet_image(data) {
        assert!(!table.is_empty() && table.len() <= 16);
        let again = sorter_config::encode_outlet_image(&table);
        assert_eq!(&again[..], &data[..again.len()]);
    }
});
