#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_intercept::core::buffer::ByteBuf;
use packet_intercept::core::varint::{read_var_int, read_var_long, write_var_int, write_var_long};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic; on success the value has to
    // re-encode and decode back to itself
    let buffer = ByteBuf::from_slice(data);
    if let Ok(value) = read_var_int(&buffer) {
        let out = ByteBuf::new();
        write_var_int(&out, value).unwrap();
        assert_eq!(read_var_int(&out).unwrap(), value);
    }

    let buffer = ByteBuf::from_slice(data);
    if let Ok(value) = read_var_long(&buffer) {
        let out = ByteBuf::new();
        write_var_long(&out, value).unwrap();
        assert_eq!(read_var_long(&out).unwrap(), value);
    }
});
