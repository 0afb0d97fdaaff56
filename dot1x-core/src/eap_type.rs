use serde::{Deserialize, Serialize};
use std::fmt;

/// An EAP method type code. Unknown codes are carried through as-is.
#[derive(PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EapType(pub u8);

impl EapType {
    /// Sentinel placed in a Nak when no acceptable type remains.
    pub const NONE: EapType = EapType(0);
    pub const IDENTITY: EapType = EapType(1);
    pub const NOTIFICATION: EapType = EapType(2);
    pub const NAK: EapType = EapType(3); // Response only
    pub const MD5_CHALLENGE: EapType = EapType(4);
    pub const OTP: EapType = EapType(5);
    pub const GTC: EapType = EapType(6);
    pub const TLS: EapType = EapType(13);
    pub const LEAP: EapType = EapType(17);
    pub const SIM: EapType = EapType(18);
    pub const TTLS: EapType = EapType(21);
    pub const AKA: EapType = EapType(23);
    pub const PEAP: EapType = EapType(25);
    pub const MSCHAPV2: EapType = EapType(26);
    pub const FAST: EapType = EapType(43);
    pub const AKA_PRIME: EapType = EapType(50);

    pub fn name(self) -> &'static str {
        match self {
            EapType::NONE => "None",
            EapType::IDENTITY => "Identity",
            EapType::NOTIFICATION => "Notification",
            EapType::NAK => "Nak",
            EapType::MD5_CHALLENGE => "MD5",
            EapType::OTP => "OTP",
            EapType::GTC => "GTC",
            EapType::TLS => "TLS",
            EapType::LEAP => "LEAP",
            EapType::SIM => "EAP-SIM",
            EapType::TTLS => "TTLS",
            EapType::AKA => "EAP-AKA",
            EapType::PEAP => "PEAP",
            EapType::MSCHAPV2 => "MSCHAPv2",
            EapType::FAST => "EAP-FAST",
            EapType::AKA_PRIME => "EAP-AKA'",
            _ => "Unknown",
        }
    }

    /// Methods that carry an inner authentication inside a TLS tunnel and
    /// therefore only need an anonymous outer identity.
    pub fn is_tunnel(self) -> bool {
        matches!(self, EapType::TTLS | EapType::PEAP | EapType::FAST)
    }

    /// Types handled by the supplicant itself rather than a method engine.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            EapType::NONE | EapType::IDENTITY | EapType::NOTIFICATION | EapType::NAK
        )
    }
}

impl fmt::Debug for EapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl fmt::Display for EapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
