// EAP Packet Definitions
// Based on RFC 3748

pub use dot1x_core::EapType;

pub const EAP_HDR_LEN: usize = 4;
/// Header of a Request/Response, including the type byte.
pub const EAP_REQUEST_HDR_LEN: usize = 5;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }
}

/// A view over an EAP packet held in someone else's buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct EapPacket<'a> {
    pub code: EapCode,
    pub identifier: u8,
    pub length: u16,
    /// Present for Request and Response only.
    pub eap_type: Option<EapType>,
    pub type_data: &'a [u8],
}

impl<'a> EapPacket<'a> {
    pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
        if data.len() < EAP_HDR_LEN {
            return None;
        }
        let code = EapCode::from_u8(data[0])?;
        let identifier = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]);
        let len = length as usize;
        if len < EAP_HDR_LEN || data.len() < len {
            return None;
        }
        let (eap_type, type_data) = match code {
            EapCode::Request | EapCode::Response => {
                if len < EAP_REQUEST_HDR_LEN {
                    return None;
                }
                (Some(EapType(data[4])), &data[EAP_REQUEST_HDR_LEN..len])
            }
            EapCode::Success | EapCode::Failure => (None, &data[EAP_HDR_LEN..len]),
        };
        Some(EapPacket {
            code,
            identifier,
            length,
            eap_type,
            type_data,
        })
    }

    pub fn is_request(&self, eap_type: EapType) -> bool {
        self.code == EapCode::Request && self.eap_type == Some(eap_type)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        build(self.code, self.identifier, self.eap_type, self.type_data)
    }
}

/// Builds an EAP packet. `eap_type` is only written for Request/Response.
pub fn build(code: EapCode, identifier: u8, eap_type: Option<EapType>, type_data: &[u8]) -> Vec<u8> {
    let type_len = match (code, eap_type) {
        (EapCode::Request | EapCode::Response, Some(_)) => 1,
        _ => 0,
    };
    let length = (EAP_HDR_LEN + type_len + type_data.len()) as u16;
    let mut bytes = Vec::with_capacity(length as usize);
    bytes.push(code as u8);
    bytes.push(identifier);
    bytes.extend_from_slice(&length.to_be_bytes());
    if type_len == 1 {
        if let Some(t) = eap_type {
            bytes.push(t.0);
        }
    }
    bytes.extend_from_slice(type_data);
    bytes
}

pub fn identity_response(identifier: u8, identity: &str) -> Vec<u8> {
    build(
        EapCode::Response,
        identifier,
        Some(EapType::IDENTITY),
        identity.as_bytes(),
    )
}

pub fn notification_response(identifier: u8) -> Vec<u8> {
    build(EapCode::Response, identifier, Some(EapType::NOTIFICATION), &[])
}

/// A legacy Nak naming `types`, or the "no type" sentinel when empty.
pub fn nak_response(identifier: u8, types: &[EapType]) -> Vec<u8> {
    let data: Vec<u8> = if types.is_empty() {
        vec![EapType::NONE.0]
    } else {
        types.iter().map(|t| t.0).collect()
    };
    build(EapCode::Response, identifier, Some(EapType::NAK), &data)
}
