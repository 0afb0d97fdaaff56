// EAPOL Packet Definitions
// Based on IEEE 802.1X

/// Ethertype of the main 802.1X exchange.
pub const EAPOL_ETHERTYPE: u16 = 0x888e;
/// Ethertype of RSN pre-authentication frames.
pub const PREAUTH_ETHERTYPE: u16 = 0x88c7;
/// Port Access Entity group address, used for untargeted wired frames.
pub const PAE_GROUP_ADDR: [u8; 6] = [0x01, 0x80, 0xc2, 0x00, 0x00, 0x03];

pub const EAPOL_HDR_LEN: usize = 4;

pub const EAPOL_VERSION_2001: u8 = 1;
pub const EAPOL_VERSION_2004: u8 = 2;
pub const EAPOL_VERSION_2010: u8 = 3;

// EAPOL Packet Type
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EapolType {
    Eap = 0,
    Start = 1,
    Logoff = 2,
    Key = 3,
    EncapsulatedAsfAlert = 4,
}

impl EapolType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EapolType::Eap),
            1 => Some(EapolType::Start),
            2 => Some(EapolType::Logoff),
            3 => Some(EapolType::Key),
            4 => Some(EapolType::EncapsulatedAsfAlert),
            _ => None,
        }
    }
}

/// A view over an EAPOL frame held in someone else's buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct EapolPacket<'a> {
    pub version: u8,
    pub packet_type: EapolType,
    pub length: u16,
    pub body: &'a [u8],
}

impl<'a> EapolPacket<'a> {
    /// Parses an EAPOL header and borrows its body.
    ///
    /// Returns `None` for unknown protocol versions or packet types, for
    /// buffers shorter than the header, and for a declared body length that
    /// exceeds the bytes actually present. Trailing bytes past the declared
    /// length (Ethernet padding) are ignored.
    pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
        if data.len() < EAPOL_HDR_LEN {
            return None;
        }
        let version = data[0];
        if !(EAPOL_VERSION_2001..=EAPOL_VERSION_2010).contains(&version) {
            return None;
        }
        let packet_type = EapolType::from_u8(data[1])?;
        let length = u16::from_be_bytes([data[2], data[3]]);
        let end = EAPOL_HDR_LEN + length as usize;
        if data.len() < end {
            return None;
        }

        Some(EapolPacket {
            version,
            packet_type,
            length,
            body: &data[EAPOL_HDR_LEN..end],
        })
    }

    /// The header plus body, without any padding that followed it on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        build(self.version, self.packet_type, self.body)
    }
}

/// Builds an EAPOL frame around `body`.
pub fn build(version: u8, packet_type: EapolType, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(EAPOL_HDR_LEN + body.len());
    frame.push(version);
    frame.push(packet_type as u8);
    frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        let frame = [1, 1, 0, 0];
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        assert_eq!(packet.version, 1);
        assert_eq!(packet.packet_type, EapolType::Start);
        assert!(packet.body.is_empty());
    }

    #[test]
    fn test_padding_is_ignored() {
        let mut frame = build(2, EapolType::Eap, &[3, 7, 0, 4]);
        frame.extend_from_slice(&[0u8; 38]);
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        assert_eq!(packet.body, &[3, 7, 0, 4]);
        assert_eq!(packet.to_bytes(), build(2, EapolType::Eap, &[3, 7, 0, 4]));
    }

    #[test]
    fn test_rejects_short_body() {
        // Declares 10 body bytes but carries 2.
        let frame = [1, 0, 0, 10, 1, 2];
        assert!(EapolPacket::from_bytes(&frame).is_none());
    }

    #[test]
    fn test_rejects_truncated_header() {
        assert!(EapolPacket::from_bytes(&[1, 0, 0]).is_none());
    }

    #[test]
    fn test_rejects_unknown_version_and_type() {
        assert!(EapolPacket::from_bytes(&[0, 1, 0, 0]).is_none());
        assert!(EapolPacket::from_bytes(&[4, 1, 0, 0]).is_none());
        assert!(EapolPacket::from_bytes(&[1, 9, 0, 0]).is_none());
    }
}
