#![no_main]

use dot1x_net::eap::EapPacket;
use dot1x_net::eapol::EapolPacket;
use dot1x_net::key::KeyDescriptor;
use dot1x_net::link::parse_ethernet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Only panics matter here; every parser must reject garbage cleanly.
    let _ = parse_ethernet(data);
    if let Some(frame) = EapolPacket::from_bytes(data) {
        let _ = EapPacket::from_bytes(frame.body);
        let _ = KeyDescriptor::from_bytes(frame.body);
    }
});
