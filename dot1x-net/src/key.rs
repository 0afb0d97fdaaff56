// EAPOL-Key descriptor definitions
// Legacy layout from IEEE 802.1X-2001, section 7.6

use std::ops::Range;

pub const KEY_DESCRIPTOR_HDR_LEN: usize = 44;

pub const KEY_TYPE_OFFSET: usize = 0;
pub const KEY_LENGTH_OFFSET: usize = 1;
pub const KEY_REPLAY_OFFSET: usize = 3;
pub const KEY_IV_OFFSET: usize = 11;
pub const KEY_INDEX_OFFSET: usize = 27;
pub const KEY_SIGNATURE_OFFSET: usize = 28;
pub const KEY_DATA_OFFSET: usize = 44;

pub const KEY_REPLAY_LEN: usize = 8;
pub const KEY_IV_LEN: usize = 16;
pub const KEY_SIGNATURE_LEN: usize = 16;

pub const KEY_INDEX_UNICAST_FLAG: u8 = 0x80;
pub const KEY_INDEX_MASK: u8 = 0x7f;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum KeyDescriptorType {
    /// Legacy RC4 descriptor, processed by the supplicant.
    Rc4 = 1,
    /// IEEE 802.11 RSN descriptor, owned by the wireless driver.
    Rsn = 2,
    /// Pre-standard WPA descriptor, owned by the wireless driver.
    Wpa = 254,
}

impl KeyDescriptorType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(KeyDescriptorType::Rc4),
            2 => Some(KeyDescriptorType::Rsn),
            254 => Some(KeyDescriptorType::Wpa),
            _ => None,
        }
    }

    /// Peeks the descriptor type of an EAPOL-Key body.
    pub fn of(body: &[u8]) -> Option<Self> {
        body.first().copied().and_then(Self::from_u8)
    }
}

/// A view over a legacy RC4 key descriptor (the body of an EAPOL-Key frame).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct KeyDescriptor<'a> {
    pub key_length: u16,
    pub replay_counter: [u8; KEY_REPLAY_LEN],
    pub key_iv: [u8; KEY_IV_LEN],
    pub key_index: u8,
    pub key_signature: [u8; KEY_SIGNATURE_LEN],
    /// Encrypted key material; empty when the session key is to be used as-is.
    pub key: &'a [u8],
}

impl<'a> KeyDescriptor<'a> {
    pub fn from_bytes(body: &'a [u8]) -> Option<Self> {
        if body.len() < KEY_DESCRIPTOR_HDR_LEN {
            return None;
        }
        if KeyDescriptorType::of(body) != Some(KeyDescriptorType::Rc4) {
            return None;
        }
        let key_length = u16::from_be_bytes([body[KEY_LENGTH_OFFSET], body[KEY_LENGTH_OFFSET + 1]]);
        let mut replay_counter = [0u8; KEY_REPLAY_LEN];
        replay_counter.copy_from_slice(&body[KEY_REPLAY_OFFSET..KEY_REPLAY_OFFSET + KEY_REPLAY_LEN]);
        let mut key_iv = [0u8; KEY_IV_LEN];
        key_iv.copy_from_slice(&body[KEY_IV_OFFSET..KEY_IV_OFFSET + KEY_IV_LEN]);
        let mut key_signature = [0u8; KEY_SIGNATURE_LEN];
        key_signature.copy_from_slice(&body[signature_range()]);
        Some(KeyDescriptor {
            key_length,
            replay_counter,
            key_iv,
            key_index: body[KEY_INDEX_OFFSET],
            key_signature,
            key: &body[KEY_DATA_OFFSET..],
        })
    }

    pub fn is_unicast(&self) -> bool {
        self.key_index & KEY_INDEX_UNICAST_FLAG != 0
    }

    pub fn index(&self) -> u8 {
        self.key_index & KEY_INDEX_MASK
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(KEY_DESCRIPTOR_HDR_LEN + self.key.len());
        body.push(KeyDescriptorType::Rc4 as u8);
        body.extend_from_slice(&self.key_length.to_be_bytes());
        body.extend_from_slice(&self.replay_counter);
        body.extend_from_slice(&self.key_iv);
        body.push(self.key_index);
        body.extend_from_slice(&self.key_signature);
        body.extend_from_slice(self.key);
        body
    }
}

/// Location of the signature field within a key descriptor body.
pub fn signature_range() -> Range<usize> {
    KEY_SIGNATURE_OFFSET..KEY_SIGNATURE_OFFSET + KEY_SIGNATURE_LEN
}
