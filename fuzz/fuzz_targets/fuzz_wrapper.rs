#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_intercept::core::buffer::ByteBuf;
use packet_intercept::core::wrapper::PacketWrapper;
use packet_intercept::protocol::version::{ClientVersion, ProtocolVersion};

fuzz_target!(|data: &[u8]| {
    // Exercise every field reader against arbitrary bytes; none may panic or
    // allocate based on an unvalidated length prefix
    let mut wrapper = PacketWrapper::for_decode(
        ByteBuf::from_slice(data),
        ProtocolVersion::latest(),
        ClientVersion::UNKNOWN,
        0,
    );

    let _ = wrapper.read_var_int();
    let _ = wrapper.read_var_long();
    let _ = wrapper.read_string(32767);
    let _ = wrapper.read_byte_array(65536);
    let _ = wrapper.read_uuid();
    let _ = wrapper.read_list(|w| w.read_var_int());
    let _ = wrapper.read_real_optional(|w| w.read_i64());
});
