#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use pnet::datalink::{self, MacAddr, NetworkInterface};

use dot1x_bin::key_processor::KeyInstall;
use dot1x_bin::method::{EapMethod, MethodCredentials, MethodOutput, MethodRegistry, MethodStatus};
use dot1x_bin::port::Port;
use dot1x_bin::wireless::{Alerts, CredentialStore, StoredCredentials, Wireless};
use dot1x_core::{ClientStatus, Config, EapType, Profile};
use dot1x_net::eap::{self, EapCode, EapPacket};
use dot1x_net::eapol::{self, EapolPacket, EapolType};
use dot1x_net::link;

pub const SESSION_KEY: [u8; 16] = [0x11; 16];
pub const SERVER_KEY: [u8; 16] = [0x22; 16];
pub const MASTER_SESSION_KEY: [u8; 64] = [0x44; 64];

pub fn local_mac() -> MacAddr {
    MacAddr::new(0x02, 0x00, 0x00, 0x00, 0x00, 0x01)
}

pub fn authenticator_mac() -> MacAddr {
    MacAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55)
}

pub fn ap(n: u8) -> MacAddr {
    MacAddr::new(0x00, 0xaa, 0xbb, 0xcc, 0xdd, n)
}

// A mock sender that captures packets instead of sending them to a real network interface.
pub struct MockDataLinkSender {
    pub packets: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl datalink::DataLinkSender for MockDataLinkSender {
    fn send_to(
        &mut self,
        packet: &[u8],
        _dst_iface: Option<NetworkInterface>,
    ) -> Option<std::io::Result<()>> {
        self.packets.lock().unwrap().push(packet.to_vec());
        Some(Ok(()))
    }

    fn build_and_send(
        &mut self,
        _num_packets: usize,
        _packet_size: usize,
        _func: &mut dyn FnMut(&mut [u8]),
    ) -> Option<std::io::Result<()>> {
        None
    }
}

#[derive(Debug, Default)]
pub struct DriverLog {
    pub keys: Vec<KeyInstall>,
    pub pmks: Vec<(Option<MacAddr>, Vec<u8>)>,
    pub reassociations: usize,
}

pub struct MockWireless {
    pub bssid: Option<MacAddr>,
    pub log: Arc<Mutex<DriverLog>>,
}

impl Wireless for MockWireless {
    fn bssid(&self) -> Option<MacAddr> {
        self.bssid
    }

    fn ssid(&self) -> Option<String> {
        Some("corp".to_string())
    }

    fn set_key(&mut self, key: &KeyInstall) -> Result<()> {
        self.log.lock().unwrap().keys.push(key.clone());
        Ok(())
    }

    fn set_pmk(&mut self, bssid: Option<MacAddr>, pmk: &[u8]) -> Result<()> {
        self.log.lock().unwrap().pmks.push((bssid, pmk.to_vec()));
        Ok(())
    }

    fn reassociate(&mut self) -> Result<()> {
        self.log.lock().unwrap().reassociations += 1;
        Ok(())
    }
}

pub struct MockAlerts {
    pub shown: Arc<Mutex<Vec<ClientStatus>>>,
}

impl Alerts for MockAlerts {
    fn show(&mut self, status: &ClientStatus) {
        self.shown.lock().unwrap().push(status.clone());
    }

    fn dismiss(&mut self) {}
}

pub struct MemoryStore {
    pub saved: Arc<Mutex<Vec<StoredCredentials>>>,
    pub initial: Option<StoredCredentials>,
}

impl CredentialStore for MemoryStore {
    fn save(&mut self, credentials: &StoredCredentials) -> Result<()> {
        self.saved.lock().unwrap().push(credentials.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredCredentials>> {
        Ok(self.initial.clone())
    }
}

/// Answers each request with an empty response of its own type and exposes
/// fixed key material.
pub struct ScriptedMethod {
    eap_type: EapType,
}

impl EapMethod for ScriptedMethod {
    fn eap_type(&self) -> EapType {
        self.eap_type
    }

    fn process(&mut self, packet: &EapPacket<'_>, _credentials: &MethodCredentials) -> MethodOutput {
        match packet.code {
            EapCode::Request => MethodOutput {
                status: MethodStatus::Continue,
                response: Some(eap::build(
                    EapCode::Response,
                    packet.identifier,
                    Some(self.eap_type),
                    &[],
                )),
            },
            EapCode::Success => MethodOutput::status(MethodStatus::Success),
            EapCode::Failure => MethodOutput::status(MethodStatus::Failure(ClientStatus::Failed)),
            EapCode::Response => MethodOutput::status(MethodStatus::Continue),
        }
    }

    fn session_key(&self) -> Option<&[u8]> {
        Some(&SESSION_KEY)
    }

    fn server_key(&self) -> Option<&[u8]> {
        Some(&SERVER_KEY)
    }

    fn master_session_key(&self) -> Option<&[u8]> {
        Some(&MASTER_SESSION_KEY)
    }
}

/// The built-in methods plus a scripted engine for each of `types`.
pub fn registry_with(types: &[EapType]) -> Arc<MethodRegistry> {
    let mut registry = MethodRegistry::with_builtin();
    for eap_type in types {
        let eap_type = *eap_type;
        registry.register(
            eap_type,
            Arc::new(move || Box::new(ScriptedMethod { eap_type }) as Box<dyn EapMethod>),
        );
    }
    Arc::new(registry)
}

pub fn config_with(profile: Profile) -> Config {
    let mut config: Config = toml::from_str("").unwrap();
    config.profile = profile;
    config
}

pub fn alice() -> Profile {
    Profile {
        user_name: Some("alice".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub destination: MacAddr,
    pub ethertype: u16,
    pub version: u8,
    pub packet_type: EapolType,
    pub body: Vec<u8>,
}

pub struct Harness {
    pub port: Port,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
    pub driver: Arc<Mutex<DriverLog>>,
    pub alerts: Arc<Mutex<Vec<ClientStatus>>>,
    pub saved: Arc<Mutex<Vec<StoredCredentials>>>,
}

impl Harness {
    pub fn new(config: Config, wireless: bool, registry: Arc<MethodRegistry>) -> Self {
        Harness::with_bssid(config, wireless, registry, None, None)
    }

    pub fn with_bssid(
        config: Config,
        wireless: bool,
        registry: Arc<MethodRegistry>,
        bssid: Option<MacAddr>,
        stored: Option<StoredCredentials>,
    ) -> Self {
        tracing_subscriber::fmt::try_init().ok();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let driver = Arc::new(Mutex::new(DriverLog::default()));
        let alerts = Arc::new(Mutex::new(Vec::new()));
        let saved = Arc::new(Mutex::new(Vec::new()));

        let tx = Box::new(MockDataLinkSender { packets: sent.clone() });
        let port = Port::new("test0", local_mac(), wireless, tx, &config, registry)
            .with_driver(Box::new(MockWireless { bssid, log: driver.clone() }))
            .with_alerts(Box::new(MockAlerts { shown: alerts.clone() }))
            .with_store(Box::new(MemoryStore { saved: saved.clone(), initial: stored }));

        Harness { port, sent, driver, alerts, saved }
    }

    /// Everything transmitted since the last call, decoded.
    pub fn take_sent(&self) -> Vec<SentFrame> {
        let frames: Vec<Vec<u8>> = self.sent.lock().unwrap().drain(..).collect();
        frames
            .iter()
            .map(|frame| {
                let ethernet = link::parse_ethernet(frame).unwrap();
                let packet = EapolPacket::from_bytes(ethernet.payload).unwrap();
                SentFrame {
                    destination: ethernet.destination,
                    ethertype: ethernet.ethertype,
                    version: packet.version,
                    packet_type: packet.packet_type,
                    body: packet.body.to_vec(),
                }
            })
            .collect()
    }

    pub fn take_raw(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().drain(..).collect()
    }

    pub fn receive_from(&mut self, source: MacAddr, ethertype: u16, version: u8, packet_type: EapolType, body: &[u8]) {
        let payload = eapol::build(version, packet_type, body);
        let frame = link::build_ethernet(local_mac(), source, ethertype, &payload);
        self.port.handle_frame(&frame);
    }

    /// An EAP packet from the wired authenticator on the main ethertype.
    pub fn receive_eap(&mut self, eap: &[u8]) {
        self.receive_from(
            authenticator_mac(),
            eapol::EAPOL_ETHERTYPE,
            eapol::EAPOL_VERSION_2004,
            EapolType::Eap,
            eap,
        );
    }

    pub fn fire_next_timer(&mut self) {
        let deadline = self.port.next_deadline().unwrap();
        self.port.fire_timers(deadline);
    }
}

pub fn identity_request(id: u8) -> Vec<u8> {
    eap::build(EapCode::Request, id, Some(EapType::IDENTITY), &[])
}

pub fn request(id: u8, eap_type: EapType, data: &[u8]) -> Vec<u8> {
    eap::build(EapCode::Request, id, Some(eap_type), data)
}

pub fn success(id: u8) -> Vec<u8> {
    eap::build(EapCode::Success, id, None, &[])
}

pub fn failure(id: u8) -> Vec<u8> {
    eap::build(EapCode::Failure, id, None, &[])
}
