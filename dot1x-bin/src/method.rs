//! EAP method engines and the registry that instantiates them.

use dot1x_core::{ClientStatus, EapType};
use dot1x_net::eap::{self, EapCode, EapPacket};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Credentials a method may draw on while processing a packet.
#[derive(Debug, Clone, Default)]
pub struct MethodCredentials {
    pub identity: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub tls_identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodStatus {
    /// More round trips are expected.
    Continue,
    Success,
    Failure(ClientStatus),
    /// The named properties must be supplied before the packet can be answered.
    NeedInput(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodOutput {
    pub status: MethodStatus,
    /// Complete EAP packet to send back, if any.
    pub response: Option<Vec<u8>>,
}

impl MethodOutput {
    pub fn status(status: MethodStatus) -> Self {
        MethodOutput { status, response: None }
    }
}

/// One running instance of an EAP method. Dropping it frees its state.
pub trait EapMethod: Send {
    fn eap_type(&self) -> EapType;

    fn process(&mut self, packet: &EapPacket<'_>, credentials: &MethodCredentials) -> MethodOutput;

    /// Properties the method needs before it can make progress.
    fn require_properties(&self, credentials: &MethodCredentials) -> Vec<String> {
        let _ = credentials;
        Vec::new()
    }

    fn publish_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Key used to decrypt legacy key descriptors. Only 5, 13, 16, 32 and
    /// 64 byte keys can be used; other lengths cause key frames to be dropped.
    fn session_key(&self) -> Option<&[u8]> {
        None
    }

    fn server_key(&self) -> Option<&[u8]> {
        None
    }

    fn master_session_key(&self) -> Option<&[u8]> {
        None
    }

    /// An identity the method can produce without asking anyone (e.g. from a SIM).
    fn derive_identity(&self) -> Option<String> {
        None
    }
}

pub type MethodFactory = Arc<dyn Fn() -> Box<dyn EapMethod> + Send + Sync>;

/// The EAP methods this process can run, in preference order.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    factories: Vec<(EapType, MethodFactory)>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        MethodRegistry::default()
    }

    /// The methods built into the daemon.
    pub fn with_builtin() -> Self {
        let mut registry = MethodRegistry::new();
        registry.register(
            EapType::MD5_CHALLENGE,
            Arc::new(|| Box::new(Md5Challenge::default()) as Box<dyn EapMethod>),
        );
        registry
    }

    /// Adds or replaces the factory for `eap_type`.
    pub fn register(&mut self, eap_type: EapType, factory: MethodFactory) {
        if let Some(entry) = self.factories.iter_mut().find(|(t, _)| *t == eap_type) {
            entry.1 = factory;
        } else {
            self.factories.push((eap_type, factory));
        }
    }

    pub fn available(&self) -> Vec<EapType> {
        self.factories.iter().map(|(t, _)| *t).collect()
    }

    pub fn create(&self, eap_type: EapType) -> Option<Box<dyn EapMethod>> {
        self.factories
            .iter()
            .find(|(t, _)| *t == eap_type)
            .map(|(_, factory)| factory())
    }

    /// The first identity any of `types` can derive on its own.
    pub fn derive_identity(&self, types: &[EapType]) -> Option<String> {
        types
            .iter()
            .filter_map(|t| self.create(*t))
            .find_map(|method| method.derive_identity())
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.available()).finish()
    }
}

const MD5_VALUE_SIZE: u8 = 16;

/// EAP-MD5-Challenge (RFC 3748, section 5.4).
#[derive(Debug, Default)]
pub struct Md5Challenge {
    answered: bool,
}

/// The challenge value from an MD5-Challenge request.
pub fn parse_md5_challenge<'a>(packet: &EapPacket<'a>) -> Option<&'a [u8]> {
    let data = packet.type_data;
    let value_size = *data.first()? as usize;
    if value_size == 0 {
        return None;
    }
    data.get(1..1 + value_size)
}

/// MD5(identifier || password || challenge).
pub fn md5_challenge_response(identifier: u8, password: &[u8], challenge: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update([identifier]);
    hasher.update(password);
    hasher.update(challenge);
    let mut value = [0u8; 16];
    value.copy_from_slice(&hasher.finalize());
    value
}

impl EapMethod for Md5Challenge {
    fn eap_type(&self) -> EapType {
        EapType::MD5_CHALLENGE
    }

    fn require_properties(&self, credentials: &MethodCredentials) -> Vec<String> {
        if credentials.password.is_none() {
            vec![dot1x_core::profile::PROPERTY_USER_PASSWORD.to_string()]
        } else {
            Vec::new()
        }
    }

    fn process(&mut self, packet: &EapPacket<'_>, credentials: &MethodCredentials) -> MethodOutput {
        match packet.code {
            EapCode::Success => MethodOutput::status(MethodStatus::Success),
            EapCode::Failure => MethodOutput::status(MethodStatus::Failure(ClientStatus::Failed)),
            EapCode::Response => MethodOutput::status(MethodStatus::Continue),
            EapCode::Request => {
                let Some(challenge) = parse_md5_challenge(packet) else {
                    warn!("Malformed MD5-Challenge request id={}", packet.identifier);
                    return MethodOutput::status(MethodStatus::Continue);
                };
                let missing = self.require_properties(credentials);
                let Some(password) = credentials.password.as_deref() else {
                    return MethodOutput::status(MethodStatus::NeedInput(missing));
                };
                let value = md5_challenge_response(packet.identifier, password.as_bytes(), challenge);
                let mut data = Vec::with_capacity(1 + value.len());
                data.push(MD5_VALUE_SIZE);
                data.extend_from_slice(&value);
                if let Some(name) = credentials.user_name.as_deref() {
                    data.extend_from_slice(name.as_bytes());
                }
                debug!("Answering MD5-Challenge id={}", packet.identifier);
                self.answered = true;
                MethodOutput {
                    status: MethodStatus::Continue,
                    response: Some(eap::build(
                        EapCode::Response,
                        packet.identifier,
                        Some(EapType::MD5_CHALLENGE),
                        &data,
                    )),
                }
            }
        }
    }

    fn publish_properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("ChallengeAnswered".to_string(), self.answered.to_string());
        props
    }
}
