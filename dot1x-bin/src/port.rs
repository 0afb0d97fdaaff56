//! One network interface: the datalink sender, the main supplicant and any
//! pre-authentication sessions toward candidate access points.

use crate::method::MethodRegistry;
use crate::supplicant::{Effect, Event, Supplicant};
use crate::wireless::{Alerts, CredentialStore, FileCredentialStore, LogAlerts, NoDriver, Wireless};
use dot1x_core::{Config, StatusReport, Tunables};
use dot1x_ipc::{Command, Response};
use dot1x_net::eap::{EapCode, EapPacket};
use dot1x_net::eapol::{
    self, EapolPacket, EapolType, EAPOL_ETHERTYPE, EAPOL_VERSION_2001, EAPOL_VERSION_2004,
    PAE_GROUP_ADDR, PREAUTH_ETHERTYPE,
};
use dot1x_net::link::{self, LinkEvent};
use pnet::datalink::{DataLinkSender, MacAddr};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("no destination address known")]
    NoDestination,
    #[error("dropped by simulated loss")]
    Dropped,
    #[error("short write on the datalink channel")]
    ShortWrite,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Which supplicant on the port a frame or effect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Main,
    Preauth(MacAddr),
}

pub struct PreauthSession {
    pub bssid: MacAddr,
    pub supplicant: Supplicant,
    remove: bool,
}

impl PreauthSession {
    pub fn marked_for_removal(&self) -> bool {
        self.remove
    }
}

fn pae_group_addr() -> MacAddr {
    let [a, b, c, d, e, f] = PAE_GROUP_ADDR;
    MacAddr::new(a, b, c, d, e, f)
}

pub struct Port {
    name: String,
    mac: MacAddr,
    wireless: bool,
    link_active: bool,
    tx: Box<dyn DataLinkSender>,
    driver: Box<dyn Wireless>,
    alerts: Box<dyn Alerts>,
    store: Box<dyn CredentialStore>,
    tunables: Arc<Tunables>,
    main: Supplicant,
    preauth: Vec<PreauthSession>,
    authenticator: Option<MacAddr>,
    authenticator_version: u8,
    bssid: Option<MacAddr>,
    ssid: Option<String>,
    stopped: bool,
}

impl Port {
    pub fn new(
        name: &str,
        mac: MacAddr,
        wireless: bool,
        tx: Box<dyn DataLinkSender>,
        config: &Config,
        registry: Arc<MethodRegistry>,
    ) -> Self {
        let tunables = Arc::new(config.tunables.clone());
        let main = Supplicant::new(
            tunables.clone(),
            registry,
            config.mode,
            wireless,
            config.profile.clone(),
        );
        info!(
            "Port {} ({}) is {}",
            name,
            mac,
            if wireless { "wireless" } else { "wired" }
        );
        Port {
            name: name.to_string(),
            mac,
            wireless,
            link_active: false,
            tx,
            driver: Box::new(NoDriver),
            alerts: Box::<LogAlerts>::default(),
            store: Box::new(FileCredentialStore::new(&config.statedir, name)),
            tunables,
            main,
            preauth: Vec::new(),
            authenticator: None,
            authenticator_version: EAPOL_VERSION_2001,
            bssid: None,
            ssid: None,
            stopped: false,
        }
    }

    pub fn with_driver(mut self, driver: Box<dyn Wireless>) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_alerts(mut self, alerts: Box<dyn Alerts>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_store(mut self, store: Box<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn is_wireless(&self) -> bool {
        self.wireless
    }

    pub fn main(&self) -> &Supplicant {
        &self.main
    }

    pub fn preauth_sessions(&self) -> &[PreauthSession] {
        &self.preauth
    }

    pub fn authenticator(&self) -> Option<MacAddr> {
        self.authenticator
    }

    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Seeds the main supplicant from the credential store.
    pub fn restore_credentials(&mut self) {
        match self.store.load() {
            Ok(Some(stored)) => {
                info!("Restored saved credentials for {}", stored.user_name);
                self.main.restore_credentials(stored);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load saved credentials: {}", e),
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let mut report = self.main.status_report();
        report.authenticator = self.authenticator.map(|mac| mac.octets());
        report
    }

    fn supplicant(&self, target: Target) -> Option<&Supplicant> {
        match target {
            Target::Main => Some(&self.main),
            Target::Preauth(bssid) => self
                .preauth
                .iter()
                .find(|p| p.bssid == bssid && !p.remove)
                .map(|p| &p.supplicant),
        }
    }

    fn supplicant_mut(&mut self, target: Target) -> Option<&mut Supplicant> {
        match target {
            Target::Main => Some(&mut self.main),
            Target::Preauth(bssid) => self
                .preauth
                .iter_mut()
                .find(|p| p.bssid == bssid && !p.remove)
                .map(|p| &mut p.supplicant),
        }
    }

    fn dispatch(&mut self, target: Target, event: Event<'_>) {
        let Some(supplicant) = self.supplicant_mut(target) else {
            return;
        };
        let effects = supplicant.handle(event);
        self.apply_effects(target, effects);
    }

    /// Handles one raw frame from the datalink channel.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        if self.stopped {
            return;
        }
        let Some(ethernet) = link::parse_ethernet(frame) else {
            debug!("Dropping runt frame ({} bytes)", frame.len());
            return;
        };
        let target = match ethernet.ethertype {
            EAPOL_ETHERTYPE => Target::Main,
            PREAUTH_ETHERTYPE => Target::Preauth(ethernet.source),
            other => {
                debug!("Dropping frame with ethertype {:#06x}", other);
                return;
            }
        };
        if ethernet.source == self.mac {
            return;
        }
        let Some(packet) = EapolPacket::from_bytes(ethernet.payload) else {
            debug!("Dropping malformed EAPOL frame from {}", ethernet.source);
            return;
        };
        if self.simulated_loss(self.tunables.receive_loss_percent) {
            debug!("Simulated loss of {:?} frame from {}", packet.packet_type, ethernet.source);
            return;
        }
        if target == Target::Main {
            self.learn_authenticator(ethernet.source, packet.version);
        }

        let Some(supplicant) = self.supplicant(target) else {
            debug!("No pre-authentication session for {}", ethernet.source);
            return;
        };
        if let Some(cached) = retransmitted(supplicant, &packet) {
            debug!("Request id={} repeated, resending cached response", cached.0);
            self.send(target, EapolType::Eap, &cached.1);
            return;
        }
        self.dispatch(target, Event::Frame(&packet));
    }

    fn learn_authenticator(&mut self, source: MacAddr, version: u8) {
        if self.authenticator != Some(source) {
            info!("Authenticator on {} is {}", self.name, source);
            self.authenticator = Some(source);
            if self.wireless {
                self.bssid = Some(source);
            }
        }
        self.authenticator_version = version;
    }

    fn outgoing_version(&self) -> u8 {
        if self.authenticator_version >= EAPOL_VERSION_2004 {
            EAPOL_VERSION_2004
        } else {
            EAPOL_VERSION_2001
        }
    }

    fn simulated_loss(&self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        let mut byte = [0u8; 1];
        if getrandom::getrandom(&mut byte).is_err() {
            return false;
        }
        u32::from(byte[0]) * 100 / 256 < u32::from(percent)
    }

    /// Frames `body` for `target` and writes it to the datalink channel.
    pub fn transmit(&mut self, target: Target, packet_type: EapolType, body: &[u8]) -> Result<(), TransmitError> {
        let (destination, ethertype) = match target {
            Target::Main if !self.wireless => (pae_group_addr(), EAPOL_ETHERTYPE),
            Target::Main => {
                let bssid = self
                    .bssid
                    .or_else(|| self.driver.bssid())
                    .ok_or(TransmitError::NoDestination)?;
                self.bssid = Some(bssid);
                (bssid, EAPOL_ETHERTYPE)
            }
            Target::Preauth(bssid) => (bssid, PREAUTH_ETHERTYPE),
        };
        if self.simulated_loss(self.tunables.transmit_loss_percent) {
            return Err(TransmitError::Dropped);
        }

        let payload = eapol::build(self.outgoing_version(), packet_type, body);
        let frame = link::build_ethernet(destination, self.mac, ethertype, &payload);
        debug!("Sending {:?} to {}: {}", packet_type, destination, hex::encode(&payload));
        match self.tx.send_to(&frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) if e.kind() == io::ErrorKind::WriteZero => Err(TransmitError::ShortWrite),
            Some(Err(e)) => Err(TransmitError::Io(e)),
            None => Err(TransmitError::ShortWrite),
        }
    }

    fn send(&mut self, target: Target, packet_type: EapolType, body: &[u8]) {
        match self.transmit(target, packet_type, body) {
            Ok(()) => {}
            Err(TransmitError::Dropped) => debug!("Simulated loss of outgoing {:?}", packet_type),
            Err(TransmitError::NoDestination) => {
                warn!("Not sending {:?} on {}: no BSSID", packet_type, self.name)
            }
            Err(e) => error!("Failed to send {:?} on {}: {}", packet_type, self.name, e),
        }
    }

    fn apply_effects(&mut self, target: Target, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Transmit { packet_type, body } => self.send(target, packet_type, &body),
                Effect::ReportStatus => {
                    if target == Target::Main {
                        let report = self.status_report();
                        match serde_json::to_string(&report) {
                            Ok(json) => debug!("Status: {}", json),
                            Err(e) => warn!("Failed to encode status: {}", e),
                        }
                    }
                }
                Effect::Alert(status) => {
                    if target == Target::Main {
                        self.alerts.show(&status);
                    }
                }
                Effect::DismissAlert => {
                    if target == Target::Main {
                        self.alerts.dismiss();
                    }
                }
                Effect::InstallKey(install) => {
                    if let Err(e) = install.apply(self.driver.as_mut()) {
                        warn!("Failed to install key at index {}: {}", install.index, e);
                    }
                }
                Effect::SetPmk(pmk) => {
                    let bssid = match target {
                        Target::Main => None,
                        Target::Preauth(bssid) => Some(bssid),
                    };
                    if let Err(e) = self.driver.set_pmk(bssid, &pmk) {
                        warn!("Failed to set PMK: {}", e);
                    }
                }
                Effect::Reassociate => {
                    if let Err(e) = self.driver.reassociate() {
                        warn!("Failed to reassociate: {}", e);
                    }
                }
                Effect::SaveCredentials(credentials) => {
                    if let Err(e) = self.store.save(&credentials) {
                        warn!("Failed to save credentials: {}", e);
                    }
                }
            }
        }
    }

    pub fn handle_link_event(&mut self, event: LinkEvent) {
        if self.stopped {
            return;
        }
        match event {
            LinkEvent::Up => {
                if !self.link_active {
                    info!("Link on {} is up", self.name);
                    self.link_active = true;
                    self.dispatch(Target::Main, Event::LinkUp);
                }
            }
            LinkEvent::Down => {
                if self.link_active {
                    info!("Link on {} is down", self.name);
                    self.link_active = false;
                    self.mark_preauth_for_removal();
                    self.dispatch(Target::Main, Event::LinkDown);
                }
            }
            LinkEvent::Associated { bssid, ssid } => {
                let roamed = self.bssid != Some(bssid);
                info!("Associated with {} ({})", bssid, ssid.as_deref().unwrap_or("hidden"));
                self.bssid = Some(bssid);
                self.authenticator = Some(bssid);
                self.ssid = ssid.or_else(|| self.driver.ssid());
                if roamed {
                    self.mark_preauth_for_removal();
                    if self.link_active {
                        self.dispatch(Target::Main, Event::Start);
                    }
                }
            }
            LinkEvent::Disassociated => {
                info!("Disassociated on {}", self.name);
                self.bssid = None;
                self.authenticator = None;
                self.mark_preauth_for_removal();
            }
            LinkEvent::ScanComplete(bssids) => self.start_preauth(bssids),
            LinkEvent::HandshakeComplete => self.main.handshake_complete(),
        }
    }

    fn mark_preauth_for_removal(&mut self) {
        for session in &mut self.preauth {
            session.remove = true;
        }
    }

    fn start_preauth(&mut self, bssids: Vec<MacAddr>) {
        if !self.wireless || !self.link_active {
            return;
        }
        for bssid in bssids {
            if self.bssid == Some(bssid) || self.preauth.iter().any(|p| p.bssid == bssid) {
                continue;
            }
            info!("Starting pre-authentication with {}", bssid);
            self.preauth.push(PreauthSession {
                bssid,
                supplicant: self.main.clone_for_preauth(),
                remove: false,
            });
            self.dispatch(Target::Preauth(bssid), Event::LinkUp);
        }
    }

    /// Drops pre-auth sessions that were marked, succeeded or gave up.
    pub fn sweep(&mut self) {
        self.preauth.retain(|session| {
            let keep = !session.remove && !session.supplicant.is_finished();
            if !keep {
                debug!(
                    "Removing pre-authentication session {} in state {}",
                    session.bssid,
                    session.supplicant.state()
                );
            }
            keep
        });
    }

    /// The earliest armed timer among all supplicants on the port.
    pub fn next_deadline(&self) -> Option<Instant> {
        std::iter::once(self.main.deadline())
            .chain(self.preauth.iter().filter(|p| !p.remove).map(|p| p.supplicant.deadline()))
            .flatten()
            .min()
    }

    /// Delivers a timeout to every supplicant whose deadline is at or before `now`.
    pub fn fire_timers(&mut self, now: Instant) {
        let mut due = Vec::new();
        if self.main.deadline().is_some_and(|d| d <= now) {
            due.push(Target::Main);
        }
        for session in &self.preauth {
            if !session.remove && session.supplicant.deadline().is_some_and(|d| d <= now) {
                due.push(Target::Preauth(session.bssid));
            }
        }
        for target in due {
            self.dispatch(target, Event::Timeout);
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Response {
        match command {
            Command::Status => Response::Status(self.status_report()),
            Command::Run { profile } => {
                info!("Applying new profile");
                let effects = self.main.apply_profile(profile);
                self.apply_effects(Target::Main, effects);
                Response::Success
            }
            Command::Retry => {
                info!("Retry requested");
                let effects = self.main.retry();
                self.apply_effects(Target::Main, effects);
                Response::Success
            }
            Command::TakeUserInput { answers } => {
                info!("User input delivered");
                let effects = self.main.take_user_input(answers);
                self.apply_effects(Target::Main, effects);
                Response::Success
            }
            Command::Stop => {
                info!("Stopping supplicant on {}", self.name);
                self.dispatch(Target::Main, Event::Logoff);
                self.dispatch(Target::Main, Event::LinkDown);
                self.mark_preauth_for_removal();
                self.stopped = true;
                Response::Success
            }
        }
    }
}

/// The cached response to resend when `packet` repeats the last request.
fn retransmitted(supplicant: &Supplicant, packet: &EapolPacket<'_>) -> Option<(u8, Vec<u8>)> {
    if packet.packet_type != EapolType::Eap || !supplicant.receive_enabled() {
        return None;
    }
    let eap = EapPacket::from_bytes(packet.body)?;
    if eap.code != EapCode::Request {
        return None;
    }
    let cached = supplicant.last_response()?;
    (cached.identifier == eap.identifier).then(|| (cached.identifier, cached.packet.clone()))
}
