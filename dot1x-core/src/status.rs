use crate::eap_type::EapType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplicantState {
    Inactive,
    Disconnected,
    Connecting,
    Acquired,
    Authenticating,
    Authenticated,
    Held,
    Logoff,
    NoAuthenticator,
}

impl fmt::Display for SupplicantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sub-codes of a failure reported by a method's security layer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityCode {
    /// The server rejected the presented credentials.
    AuthenticationFailed,
    BadCertificate,
    HandshakeFailed,
    Other(i32),
}

/// Outcome of the latest attempt, as shown to the user and the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientStatus {
    #[default]
    Ok,
    /// A generic method failure.
    Failed,
    InternalError,
    ConfigurationInvalid,
    UserInputRequired,
    UserInputNotPossible,
    AuthenticationStalled,
    ProtocolNotSupported,
    CertificateExpired,
    ServerCertificateNotTrusted,
    SecurityError(SecurityCode),
}

impl ClientStatus {
    /// Whether the failure means the credentials themselves are wrong.
    pub fn is_bad_credentials(&self) -> bool {
        matches!(
            self,
            ClientStatus::Failed | ClientStatus::SecurityError(SecurityCode::AuthenticationFailed)
        )
    }
}

/// Snapshot of a supplicant published to the control plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: SupplicantState,
    pub status: ClientStatus,
    pub eap_type: Option<EapType>,
    pub eap_type_name: Option<String>,
    /// Properties still needed before the exchange can continue.
    #[serde(default)]
    pub missing_properties: Vec<String>,
    /// Extra properties published by the method, e.g. a server name.
    #[serde(default)]
    pub method_properties: BTreeMap<String, String>,
    pub authenticator: Option<[u8; 6]>,
    pub generation: u64,
    #[serde(default)]
    pub last_notification: Option<String>,
}

impl StatusReport {
    pub fn new(state: SupplicantState) -> Self {
        StatusReport {
            state,
            status: ClientStatus::Ok,
            eap_type: None,
            eap_type_name: None,
            missing_properties: Vec::new(),
            method_properties: BTreeMap::new(),
            authenticator: None,
            generation: 0,
            last_notification: None,
        }
    }
}
