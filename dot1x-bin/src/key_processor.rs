//! Verification and decryption of legacy EAPOL-Key frames, and hand-off of
//! method-derived key material to the wireless driver.

use crate::wireless::Wireless;
use dot1x_net::eapol::{EapolPacket, EAPOL_HDR_LEN};
use dot1x_net::key::{signature_range, KeyDescriptor, KeyDescriptorType, KEY_IV_LEN};
use hmac::{Hmac, Mac};
use md5::Md5;
use rc4::consts::{U21, U29, U32, U48, U80};
use rc4::{KeyInit, Rc4, StreamCipher};
use thiserror::Error;

type HmacMd5 = Hmac<Md5>;

pub const PMK_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key descriptor is truncated")]
    Truncated,
    #[error("descriptor type {0} is not a legacy RC4 descriptor")]
    NotLegacy(u8),
    #[error("key signature does not match")]
    BadSignature,
    #[error("no session key is available")]
    MissingSessionKey,
    #[error("unsupported RC4 key length {0}")]
    UnsupportedKeyLength(usize),
    #[error("key material too short: {0} bytes")]
    KeyTooShort(usize),
}

/// A key ready to be installed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInstall {
    pub index: u8,
    pub unicast: bool,
    pub key: Vec<u8>,
}

impl KeyInstall {
    pub fn apply(&self, wireless: &mut dyn Wireless) -> anyhow::Result<()> {
        wireless.set_key(self)
    }
}

/// HMAC-MD5 over the whole EAPOL frame (header included) with the
/// descriptor's signature field zeroed.
fn signature_mac(frame: &[u8], server_key: &[u8]) -> Result<HmacMd5, KeyError> {
    let range = signature_range();
    let sig = EAPOL_HDR_LEN + range.start..EAPOL_HDR_LEN + range.end;
    if frame.len() < sig.end {
        return Err(KeyError::Truncated);
    }
    let mut signed = frame.to_vec();
    signed[sig].fill(0);

    let mut mac = <HmacMd5 as Mac>::new_from_slice(server_key).map_err(|_| KeyError::MissingSessionKey)?;
    mac.update(&signed);
    Ok(mac)
}

pub fn compute_signature(frame: &[u8], server_key: &[u8]) -> Result<[u8; 16], KeyError> {
    let mac = signature_mac(frame, server_key)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

macro_rules! rc4_apply {
    ($size:ty, $key:expr, $data:expr) => {{
        let mut cipher = <Rc4<$size> as KeyInit>::new_from_slice($key)
            .map_err(|_| KeyError::UnsupportedKeyLength($key.len()))?;
        cipher.apply_keystream($data);
        Ok(())
    }};
}

/// RC4 keyed by `iv || session_key`. Symmetric, so it both encrypts and decrypts.
///
/// With the 16-byte descriptor IV this covers 5 and 13 byte (WEP sized) and
/// 16, 32 and 64 byte session keys.
pub fn rc4_crypt(iv: &[u8], session_key: &[u8], data: &mut [u8]) -> Result<(), KeyError> {
    let mut key = Vec::with_capacity(iv.len() + session_key.len());
    key.extend_from_slice(iv);
    key.extend_from_slice(session_key);
    match key.len() {
        21 => rc4_apply!(U21, &key, data),
        29 => rc4_apply!(U29, &key, data),
        32 => rc4_apply!(U32, &key, data),
        48 => rc4_apply!(U48, &key, data),
        80 => rc4_apply!(U80, &key, data),
        n => Err(KeyError::UnsupportedKeyLength(n)),
    }
}

/// Checks the signature of a legacy key frame and recovers the key it carries.
pub fn verify_and_decrypt(
    frame: &EapolPacket<'_>,
    session_key: Option<&[u8]>,
    server_key: Option<&[u8]>,
) -> Result<KeyInstall, KeyError> {
    match KeyDescriptorType::of(frame.body) {
        Some(KeyDescriptorType::Rc4) => {}
        _ => return Err(match frame.body.first() {
            Some(t) => KeyError::NotLegacy(*t),
            None => KeyError::Truncated,
        }),
    }
    let descriptor = KeyDescriptor::from_bytes(frame.body).ok_or(KeyError::Truncated)?;
    let server_key = server_key.ok_or(KeyError::MissingSessionKey)?;
    let session_key = session_key.ok_or(KeyError::MissingSessionKey)?;

    signature_mac(&frame.to_bytes(), server_key)?
        .verify_slice(&descriptor.key_signature)
        .map_err(|_| KeyError::BadSignature)?;

    let key_length = descriptor.key_length as usize;
    let key = if descriptor.key.is_empty() {
        if session_key.len() < key_length {
            return Err(KeyError::KeyTooShort(session_key.len()));
        }
        session_key[..key_length].to_vec()
    } else {
        let mut key = descriptor.key.to_vec();
        rc4_crypt(&descriptor.key_iv[..KEY_IV_LEN], session_key, &mut key)?;
        if key_length > 0 && key_length < key.len() {
            key.truncate(key_length);
        }
        key
    };

    Ok(KeyInstall {
        index: descriptor.index(),
        unicast: descriptor.is_unicast(),
        key,
    })
}

/// The pairwise master key derived from a method's master session key.
pub fn master_key(material: &[u8]) -> Result<Vec<u8>, KeyError> {
    if material.len() < PMK_LEN {
        return Err(KeyError::KeyTooShort(material.len()));
    }
    Ok(material[..PMK_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot1x_net::eapol::{self, EapolType};
    use dot1x_net::key::{KEY_DESCRIPTOR_HDR_LEN, KEY_INDEX_OFFSET, KEY_IV_OFFSET};

    const SESSION_KEY: [u8; 16] = [0x11; 16];
    const SERVER_KEY: [u8; 16] = [0x22; 16];

    fn key_frame(index: u8, key_length: u16, key: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; KEY_DESCRIPTOR_HDR_LEN];
        body[0] = 1;
        body[1..3].copy_from_slice(&key_length.to_be_bytes());
        body[KEY_IV_OFFSET..KEY_IV_OFFSET + 16].copy_from_slice(&[0x33; 16]);
        body[KEY_INDEX_OFFSET] = index;
        body.extend_from_slice(key);
        let mut frame = eapol::build(1, EapolType::Key, &body);
        let sig = compute_signature(&frame, &SERVER_KEY).unwrap();
        let start = EAPOL_HDR_LEN + signature_range().start;
        frame[start..start + 16].copy_from_slice(&sig);
        frame
    }

    #[test]
    fn test_decrypts_encrypted_key() {
        let plain = [0xab; 13];
        let mut encrypted = plain.to_vec();
        rc4_crypt(&[0x33; 16], &SESSION_KEY, &mut encrypted).unwrap();
        assert_ne!(encrypted, plain.to_vec());

        let frame = key_frame(0x81, 13, &encrypted);
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        let install = verify_and_decrypt(&packet, Some(&SESSION_KEY), Some(&SERVER_KEY)).unwrap();
        assert_eq!(install.key, plain.to_vec());
        assert!(install.unicast);
        assert_eq!(install.index, 1);
    }

    #[test]
    fn test_rc4_session_key_lengths() {
        for len in [5usize, 13, 16, 32, 64] {
            let session_key = vec![0x44; len];
            let mut data = [0x5a; 8];
            rc4_crypt(&[0x33; 16], &session_key, &mut data).unwrap();
            assert_ne!(data, [0x5a; 8], "{}-byte key left data unchanged", len);
            rc4_crypt(&[0x33; 16], &session_key, &mut data).unwrap();
            assert_eq!(data, [0x5a; 8]);
        }
        assert_eq!(
            rc4_crypt(&[0x33; 16], &[0x44; 7], &mut [0u8; 4]),
            Err(KeyError::UnsupportedKeyLength(23))
        );
    }

    #[test]
    fn test_session_key_used_when_no_key_bytes() {
        let frame = key_frame(0x02, 5, &[]);
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        let install = verify_and_decrypt(&packet, Some(&SESSION_KEY), Some(&SERVER_KEY)).unwrap();
        assert_eq!(install.key, vec![0x11; 5]);
        assert!(!install.unicast);
        assert_eq!(install.index, 2);
    }

    #[test]
    fn test_bad_signature() {
        let mut frame = key_frame(0x81, 5, &[1, 2, 3, 4, 5]);
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        assert_eq!(
            verify_and_decrypt(&packet, Some(&SESSION_KEY), Some(&SERVER_KEY)),
            Err(KeyError::BadSignature)
        );
    }

    #[test]
    fn test_missing_keys_and_foreign_descriptor() {
        let frame = key_frame(0x81, 5, &[]);
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        assert_eq!(
            verify_and_decrypt(&packet, None, Some(&SERVER_KEY)),
            Err(KeyError::MissingSessionKey)
        );

        let rsn = eapol::build(2, EapolType::Key, &[2; 95]);
        let packet = EapolPacket::from_bytes(&rsn).unwrap();
        assert_eq!(
            verify_and_decrypt(&packet, Some(&SESSION_KEY), Some(&SERVER_KEY)),
            Err(KeyError::NotLegacy(2))
        );
    }

    #[test]
    fn test_unsupported_rc4_key_length() {
        let mut data = [0u8; 4];
        assert_eq!(
            rc4_crypt(&[0; 16], &[0; 5], &mut data),
            Err(KeyError::UnsupportedKeyLength(21))
        );
    }

    #[test]
    fn test_master_key_length() {
        assert_eq!(master_key(&[7; 64]).unwrap(), vec![7; 32]);
        assert_eq!(master_key(&[7; 16]), Err(KeyError::KeyTooShort(16)));
    }
}
