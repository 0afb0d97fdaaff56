pub mod eap;
pub mod eapol;
pub mod key;
pub mod link;

pub use eap::{EapCode, EapPacket, EapType};
pub use eapol::{EapolPacket, EapolType};
pub use key::{KeyDescriptor, KeyDescriptorType};
pub use link::LinkEvent;
