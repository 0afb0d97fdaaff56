//! The 802.1X supplicant state machine.
//!
//! A [`Supplicant`] is a plain value driven through [`Supplicant::handle`].
//! It never touches the network itself: every outward action is returned as
//! an [`Effect`] for the port to carry out, and its single timer is exposed
//! as a deadline the event loop waits on before feeding back
//! [`Event::Timeout`].

use crate::key_processor::{self, KeyInstall};
use crate::method::{EapMethod, MethodCredentials, MethodRegistry, MethodStatus};
use crate::wireless::StoredCredentials;
use dot1x_core::{
    ClientStatus, EapType, PortMode, Profile, StatusReport, SupplicantState, Tunables,
    UserAnswers, WorkingProfile,
};
use dot1x_net::eap::{self, EapCode, EapPacket};
use dot1x_net::eapol::{EapolPacket, EapolType};
use dot1x_net::key::KeyDescriptorType;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    LinkUp,
    LinkDown,
    Start,
    Frame(&'a EapolPacket<'a>),
    Timeout,
    /// Input that was missing earlier may now be available.
    MoreDataAvailable,
    Logoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Transmit { packet_type: EapolType, body: Vec<u8> },
    ReportStatus,
    Alert(ClientStatus),
    DismissAlert,
    InstallKey(KeyInstall),
    SetPmk(Vec<u8>),
    Reassociate,
    SaveCredentials(StoredCredentials),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Start,
    Auth,
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub period: Duration,
    pub deadline: Instant,
}

/// The most recent EAP Response, kept to answer retransmitted Requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub identifier: u8,
    pub packet: Vec<u8>,
}

pub struct Supplicant {
    state: SupplicantState,
    timer: Option<Timer>,
    receive_enabled: bool,

    tunables: Arc<Tunables>,
    registry: Arc<MethodRegistry>,
    mode: PortMode,
    wireless: bool,
    preauth: bool,

    profile: Profile,
    answers: UserAnswers,
    working: WorkingProfile,
    generation: u64,

    method: Option<Box<dyn EapMethod>>,
    last_response: Option<CachedResponse>,
    /// Frame to replay once missing input arrives.
    last_frame: Option<Vec<u8>>,

    status: ClientStatus,
    missing: Vec<String>,
    last_notification: Option<String>,

    start_count: u32,
    auth_count: u32,
    failure_count: u32,
    identity_sent: bool,
    pmk_set: bool,
    handshake_pending: bool,
    /// Set while a frame is processed as part of entering `Connecting`.
    in_start: bool,

    effects: Vec<Effect>,
}

impl Supplicant {
    pub fn new(
        tunables: Arc<Tunables>,
        registry: Arc<MethodRegistry>,
        mode: PortMode,
        wireless: bool,
        profile: Profile,
    ) -> Self {
        let mut supplicant = Supplicant {
            state: SupplicantState::Inactive,
            timer: None,
            receive_enabled: false,
            tunables,
            registry,
            mode,
            wireless,
            preauth: false,
            profile,
            answers: UserAnswers::default(),
            working: WorkingProfile::default(),
            generation: 0,
            method: None,
            last_response: None,
            last_frame: None,
            status: ClientStatus::Ok,
            missing: Vec::new(),
            last_notification: None,
            start_count: 0,
            auth_count: 0,
            failure_count: 0,
            identity_sent: false,
            pmk_set: false,
            handshake_pending: false,
            in_start: false,
            effects: Vec::new(),
        };
        supplicant.refresh();
        supplicant
    }

    /// A pre-authentication supplicant sharing this one's configuration.
    /// Pre-auth sessions never prompt.
    pub fn clone_for_preauth(&self) -> Self {
        Supplicant {
            state: SupplicantState::Inactive,
            timer: None,
            receive_enabled: false,
            tunables: self.tunables.clone(),
            registry: self.registry.clone(),
            mode: PortMode::System,
            wireless: true,
            preauth: true,
            profile: self.profile.clone(),
            answers: self.answers.clone(),
            working: self.working.clone(),
            generation: self.generation,
            method: None,
            last_response: None,
            last_frame: None,
            status: ClientStatus::Ok,
            missing: Vec::new(),
            last_notification: None,
            start_count: 0,
            auth_count: 0,
            failure_count: 0,
            identity_sent: false,
            pmk_set: false,
            handshake_pending: false,
            in_start: false,
            effects: Vec::new(),
        }
    }

    pub fn state(&self) -> SupplicantState {
        self.state
    }

    pub fn timer(&self) -> Option<&Timer> {
        self.timer.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.map(|t| t.deadline)
    }

    pub fn receive_enabled(&self) -> bool {
        self.receive_enabled
    }

    pub fn last_response(&self) -> Option<&CachedResponse> {
        self.last_response.as_ref()
    }

    pub fn status(&self) -> &ClientStatus {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn identity_sent(&self) -> bool {
        self.identity_sent
    }

    pub fn handshake_pending(&self) -> bool {
        self.handshake_pending
    }

    pub fn is_preauth(&self) -> bool {
        self.preauth
    }

    pub fn working_profile(&self) -> &WorkingProfile {
        &self.working
    }

    /// A pre-auth session is done once it succeeded or gave up.
    pub fn is_finished(&self) -> bool {
        self.preauth
            && matches!(
                self.state,
                SupplicantState::Authenticated | SupplicantState::Held
            )
    }

    pub fn handshake_complete(&mut self) {
        if self.handshake_pending {
            info!("4-way handshake complete");
            self.handshake_pending = false;
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let mut report = StatusReport::new(self.state);
        report.status = self.status.clone();
        if let Some(method) = &self.method {
            let eap_type = method.eap_type();
            report.eap_type = Some(eap_type);
            report.eap_type_name = Some(eap_type.name().to_string());
            report.method_properties = method.publish_properties();
        }
        report.missing_properties = self.missing.clone();
        report.generation = self.generation;
        report.last_notification = self.last_notification.clone();
        report
    }

    pub fn handle(&mut self, event: Event<'_>) -> Vec<Effect> {
        match event {
            Event::LinkUp => {
                if self.state == SupplicantState::Inactive {
                    self.enter_disconnected();
                }
            }
            Event::LinkDown => {
                if self.state != SupplicantState::Inactive {
                    self.enter_inactive();
                }
            }
            Event::Start => {
                if self.state == SupplicantState::Inactive {
                    debug!("Start ignored while the link is down");
                } else {
                    self.enter_disconnected();
                }
            }
            Event::Frame(frame) => self.receive(frame),
            Event::Timeout => self.timeout(),
            Event::MoreDataAvailable => self.more_data_available(),
            Event::Logoff => {
                if self.state == SupplicantState::Authenticated {
                    self.enter_logoff();
                } else {
                    debug!("Logoff ignored in state {}", self.state);
                }
            }
        }
        std::mem::take(&mut self.effects)
    }

    /// Replaces the configured profile. The exchange restarts when the
    /// working identity changed or the previous attempt is over.
    pub fn apply_profile(&mut self, profile: Profile) -> Vec<Effect> {
        self.profile = profile;
        let changed = self.refresh();
        let idle = matches!(
            self.state,
            SupplicantState::Held | SupplicantState::NoAuthenticator | SupplicantState::Logoff
        );
        if self.state != SupplicantState::Inactive && (changed || idle) {
            self.enter_disconnected();
        }
        std::mem::take(&mut self.effects)
    }

    pub fn take_user_input(&mut self, answers: UserAnswers) -> Vec<Effect> {
        self.answers = answers;
        let changed = self.refresh();
        if self.last_frame.is_some() {
            self.more_data_available();
        } else if changed
            && matches!(
                self.state,
                SupplicantState::Held | SupplicantState::NoAuthenticator | SupplicantState::Logoff
            )
        {
            self.enter_disconnected();
        }
        std::mem::take(&mut self.effects)
    }

    pub fn retry(&mut self) -> Vec<Effect> {
        self.failure_count = 0;
        self.status = ClientStatus::Ok;
        self.handle(Event::Start)
    }

    /// Seeds answers from a credential store.
    pub fn restore_credentials(&mut self, stored: StoredCredentials) {
        self.answers = UserAnswers {
            user_name: Some(stored.user_name),
            password: stored.password,
        };
        self.refresh();
    }

    fn refresh(&mut self) -> bool {
        let available = self.registry.available();
        let candidates = if self.profile.accept_eap_types.is_empty() {
            available.clone()
        } else {
            self.profile.accept_eap_types.clone()
        };
        let derived = self.registry.derive_identity(&candidates);
        let changed = self.working.update(&self.profile, &self.answers, &available, derived);
        if changed {
            self.generation += 1;
            debug!("Configuration generation {}", self.generation);
        }
        changed
    }

    fn set_state(&mut self, state: SupplicantState) {
        if self.state != state {
            info!(
                "{}{} -> {}",
                if self.preauth { "pre-auth " } else { "" },
                self.state,
                state
            );
        }
        self.state = state;
    }

    fn cancel(&mut self) {
        self.timer = None;
        self.receive_enabled = false;
    }

    fn arm(&mut self, kind: TimerKind) {
        let period = match kind {
            TimerKind::Start => self.tunables.start_period(),
            TimerKind::Auth => self.tunables.auth_period(),
            TimerKind::Held => self.tunables.held_period(),
        };
        self.timer = Some(Timer {
            kind,
            period,
            deadline: Instant::now() + period,
        });
    }

    fn transmit(&mut self, packet_type: EapolType, body: Vec<u8>) {
        self.effects.push(Effect::Transmit { packet_type, body });
    }

    fn send_eap_response(&mut self, identifier: u8, packet: Vec<u8>) {
        self.last_response = Some(CachedResponse {
            identifier,
            packet: packet.clone(),
        });
        self.transmit(EapolType::Eap, packet);
    }

    fn method_credentials(&self) -> MethodCredentials {
        MethodCredentials {
            identity: self.working.identity(),
            user_name: self.working.user_name.get().map(str::to_string),
            password: self.working.password.get().map(str::to_string),
            tls_identity: self.working.tls_identity.get().map(str::to_string),
        }
    }

    fn enter_inactive(&mut self) {
        self.cancel();
        self.set_state(SupplicantState::Inactive);
        self.method = None;
        self.last_response = None;
        self.last_frame = None;
        self.identity_sent = false;
        self.effects.push(Effect::ReportStatus);
    }

    fn enter_disconnected(&mut self) {
        self.cancel();
        self.set_state(SupplicantState::Disconnected);
        self.enter_connecting(None);
    }

    fn enter_connecting(&mut self, frame: Option<&EapolPacket<'_>>) {
        self.cancel();
        self.set_state(SupplicantState::Connecting);
        self.method = None;
        self.last_response = None;
        self.last_frame = None;
        self.start_count = 0;
        self.receive_enabled = true;
        self.effects.push(Effect::ReportStatus);

        if let Some(frame) = frame {
            if frame.packet_type == EapolType::Eap {
                if let Some(packet) = EapPacket::from_bytes(frame.body) {
                    self.in_start = true;
                    self.dispatch_eap(frame, &packet);
                    self.in_start = false;
                }
            }
            if self.state != SupplicantState::Connecting {
                return;
            }
        }
        self.send_start();
    }

    fn send_start(&mut self) {
        self.start_count += 1;
        debug!("Sending EAPOL-Start ({}/{})", self.start_count, self.tunables.max_start);
        self.transmit(EapolType::Start, Vec::new());
        self.arm(TimerKind::Start);
    }

    fn enter_no_authenticator(&mut self) {
        self.cancel();
        self.set_state(SupplicantState::NoAuthenticator);
        // Any later frame reactivates Connecting.
        self.receive_enabled = true;
        self.effects.push(Effect::ReportStatus);
    }

    fn enter_acquired(&mut self, frame: Option<&EapolPacket<'_>>) {
        self.cancel();
        self.set_state(SupplicantState::Acquired);
        self.working.accept_types.reset_cursor();
        self.identity_sent = false;
        self.pmk_set = false;
        self.method = None;
        self.last_response = None;
        self.receive_enabled = true;
        self.arm(TimerKind::Auth);
        self.effects.push(Effect::ReportStatus);

        if let Some(frame) = frame {
            if let Some(packet) = EapPacket::from_bytes(frame.body) {
                self.respond_identity(frame, &packet);
            }
        }
    }

    fn respond_identity(&mut self, frame: &EapolPacket<'_>, packet: &EapPacket<'_>) {
        match self.working.identity() {
            Some(identity) => {
                info!("Sending EAP-Response/Identity id={}", packet.identifier);
                let response = eap::identity_response(packet.identifier, &identity);
                self.send_eap_response(packet.identifier, response);
                self.identity_sent = true;
                self.last_frame = None;
                self.missing.clear();
                self.arm(TimerKind::Auth);
            }
            None => {
                let missing = self.working.missing_properties.clone();
                self.need_input(frame, missing);
            }
        }
    }

    fn need_input(&mut self, frame: &EapolPacket<'_>, missing: Vec<String>) {
        if !self.mode.allows_user_input() {
            warn!("Input {:?} required but cannot be requested", missing);
            self.enter_held(ClientStatus::UserInputNotPossible);
            return;
        }
        info!("Waiting for user input {:?}", missing);
        self.last_frame = Some(frame.to_bytes());
        self.status = ClientStatus::UserInputRequired;
        self.missing = missing;
        self.effects.push(Effect::ReportStatus);
    }

    fn enter_authenticating(&mut self, frame: Option<&EapolPacket<'_>>) {
        self.cancel();
        self.set_state(SupplicantState::Authenticating);
        self.method = None;
        self.receive_enabled = true;
        self.arm(TimerKind::Auth);
        self.effects.push(Effect::ReportStatus);

        if let Some(frame) = frame {
            if let Some(packet) = EapPacket::from_bytes(frame.body) {
                self.process_eap(frame, &packet);
            }
        }
    }

    fn enter_authenticated(&mut self) {
        self.cancel();
        self.set_state(SupplicantState::Authenticated);
        self.auth_count = 0;
        self.start_count = 0;
        self.failure_count = 0;
        self.last_frame = None;
        self.status = ClientStatus::Ok;
        self.missing.clear();

        if self.working.remember_credentials && self.mode != PortMode::LoginWindow && !self.preauth {
            if let Some(user_name) = self.working.user_name.get() {
                let password = if self.working.one_time_password {
                    None
                } else {
                    self.working.password.get().map(str::to_string)
                };
                self.effects.push(Effect::SaveCredentials(StoredCredentials {
                    user_name: user_name.to_string(),
                    password,
                }));
            }
        }
        self.working.consume_one_time_password();
        self.install_master_key();

        self.effects.push(Effect::DismissAlert);
        self.effects.push(Effect::ReportStatus);
        self.receive_enabled = true;
    }

    fn install_master_key(&mut self) {
        if !self.wireless || self.pmk_set {
            return;
        }
        let Some(material) = self.method.as_ref().and_then(|m| m.master_session_key()) else {
            return;
        };
        match key_processor::master_key(material) {
            Ok(pmk) => {
                self.effects.push(Effect::SetPmk(pmk));
                self.pmk_set = true;
                self.handshake_pending = true;
            }
            Err(e) => warn!("Master key not installed: {}", e),
        }
    }

    fn enter_held(&mut self, status: ClientStatus) {
        self.cancel();
        self.set_state(SupplicantState::Held);
        info!("Authentication held: {:?}", status);
        self.auth_count = 0;
        if status.is_bad_credentials() && self.mode.allows_user_input() {
            info!("Clearing cached credentials");
            self.working.forget_credentials();
            if self.wireless {
                self.effects.push(Effect::Reassociate);
            }
        } else {
            self.failure_count += 1;
        }
        self.method = None;
        self.last_response = None;
        self.last_frame = None;
        self.status = status.clone();
        self.effects.push(Effect::Alert(status));
        self.arm(TimerKind::Held);
        self.receive_enabled = true;
        self.effects.push(Effect::ReportStatus);
    }

    fn enter_logoff(&mut self) {
        self.cancel();
        self.set_state(SupplicantState::Logoff);
        self.method = None;
        self.last_response = None;
        self.transmit(EapolType::Logoff, Vec::new());
        self.effects.push(Effect::ReportStatus);
    }

    fn timeout(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        match (self.state, timer.kind) {
            (SupplicantState::Connecting, TimerKind::Start) => {
                if self.start_count >= self.tunables.max_start {
                    info!("No authenticator after {} EAPOL-Start frames", self.start_count);
                    self.enter_no_authenticator();
                } else {
                    self.send_start();
                }
            }
            (SupplicantState::Acquired, TimerKind::Auth) => {
                self.auth_count += 1;
                if self.auth_count >= self.tunables.max_auth_attempts {
                    self.enter_held(ClientStatus::AuthenticationStalled);
                } else {
                    self.enter_connecting(None);
                }
            }
            (SupplicantState::Authenticating, TimerKind::Auth)
            | (SupplicantState::Held, TimerKind::Held) => self.enter_connecting(None),
            (state, kind) => debug!("Stale {:?} timer in state {}", kind, state),
        }
    }

    fn receive(&mut self, frame: &EapolPacket<'_>) {
        if !self.receive_enabled {
            debug!("Frame ignored in state {}", self.state);
            return;
        }
        if self.state == SupplicantState::NoAuthenticator {
            self.enter_connecting(Some(frame));
            return;
        }
        match frame.packet_type {
            EapolType::Eap => {}
            EapolType::Key => {
                self.process_key(frame);
                return;
            }
            other => {
                debug!("Ignoring EAPOL {:?} frame", other);
                return;
            }
        }
        let Some(packet) = EapPacket::from_bytes(frame.body) else {
            debug!("Dropping malformed EAP packet");
            return;
        };
        self.dispatch_eap(frame, &packet);
    }

    fn dispatch_eap(&mut self, frame: &EapolPacket<'_>, packet: &EapPacket<'_>) {
        if packet.is_request(EapType::NOTIFICATION) {
            self.answer_notification(packet);
            return;
        }
        let is_identity = packet.is_request(EapType::IDENTITY);
        match self.state {
            SupplicantState::Connecting => {
                if packet.code != EapCode::Request {
                    return;
                }
                if is_identity {
                    self.enter_acquired(Some(frame));
                } else if self.in_start {
                    warn!(
                        "Dropping {:?} request id={} while starting (recursion avoided)",
                        packet.eap_type, packet.identifier
                    );
                } else {
                    self.enter_authenticating(Some(frame));
                }
            }
            SupplicantState::Acquired => match packet.code {
                EapCode::Request if is_identity => self.respond_identity(frame, packet),
                EapCode::Response => {}
                _ => self.enter_authenticating(Some(frame)),
            },
            SupplicantState::Authenticating => {
                if is_identity {
                    self.enter_acquired(Some(frame));
                } else {
                    self.process_eap(frame, packet);
                }
            }
            SupplicantState::Authenticated | SupplicantState::Held => {
                if packet.code != EapCode::Request {
                    return;
                }
                if is_identity {
                    self.enter_acquired(Some(frame));
                } else {
                    self.enter_authenticating(Some(frame));
                }
            }
            _ => debug!("EAP packet ignored in state {}", self.state),
        }
    }

    fn answer_notification(&mut self, packet: &EapPacket<'_>) {
        let text = String::from_utf8_lossy(packet.type_data).into_owned();
        info!("EAP notification: {}", text);
        self.last_notification = Some(text);
        let response = eap::notification_response(packet.identifier);
        self.send_eap_response(packet.identifier, response);
    }

    fn process_eap(&mut self, frame: &EapolPacket<'_>, packet: &EapPacket<'_>) {
        match packet.code {
            EapCode::Response => return,
            EapCode::Request => {
                let Some(requested) = packet.eap_type else {
                    return;
                };
                let current = self.method.as_ref().map(|m| m.eap_type());
                if current != Some(requested) {
                    if !self.working.accept_types.contains(requested) {
                        self.send_nak(packet);
                        return;
                    }
                    match self.registry.create(requested) {
                        Some(method) => {
                            info!("Negotiated EAP method {}", requested);
                            self.method = Some(method);
                        }
                        None => {
                            self.send_nak(packet);
                            return;
                        }
                    }
                }
            }
            EapCode::Success | EapCode::Failure => {
                if self.method.is_none() {
                    if packet.code == EapCode::Success {
                        self.enter_authenticated();
                    } else {
                        self.enter_held(ClientStatus::Failed);
                    }
                    return;
                }
            }
        }

        let credentials = self.method_credentials();
        let Some(method) = self.method.as_mut() else {
            return;
        };
        let output = method.process(packet, &credentials);
        if let Some(response) = output.response {
            self.send_eap_response(packet.identifier, response);
        }
        match output.status {
            MethodStatus::Continue => {
                self.last_frame = None;
                self.arm(TimerKind::Auth);
            }
            MethodStatus::Success => self.enter_authenticated(),
            MethodStatus::Failure(status) => self.enter_held(status),
            MethodStatus::NeedInput(missing) => self.need_input(frame, missing),
        }
    }

    fn send_nak(&mut self, packet: &EapPacket<'_>) {
        let exhausted = !self.working.accept_types.advance();
        let types: Vec<EapType> = if exhausted {
            Vec::new()
        } else {
            self.working.accept_types.types().to_vec()
        };
        warn!(
            "Authenticator requested {:?} id={}, sending Nak {:?}",
            packet.eap_type, packet.identifier, types
        );
        let nak = eap::nak_response(packet.identifier, &types);
        self.send_eap_response(packet.identifier, nak);
        if exhausted {
            self.enter_held(ClientStatus::ProtocolNotSupported);
        } else {
            self.arm(TimerKind::Auth);
        }
    }

    fn process_key(&mut self, frame: &EapolPacket<'_>) {
        if self.state != SupplicantState::Authenticated {
            debug!("EAPOL-Key ignored in state {}", self.state);
            return;
        }
        match KeyDescriptorType::of(frame.body) {
            Some(KeyDescriptorType::Rc4) => {}
            Some(kind) => {
                debug!("{:?} key descriptor left to the wireless driver", kind);
                return;
            }
            None => {
                debug!("Unknown key descriptor type");
                return;
            }
        }
        let result = {
            let (session_key, server_key) = match &self.method {
                Some(method) => (method.session_key(), method.server_key()),
                None => (None, None),
            };
            key_processor::verify_and_decrypt(frame, session_key, server_key)
        };
        match result {
            Ok(install) => {
                info!(
                    "Installing {} key at index {}",
                    if install.unicast { "unicast" } else { "broadcast" },
                    install.index
                );
                self.effects.push(Effect::InstallKey(install));
            }
            Err(e) => warn!("Discarding EAPOL-Key frame: {}", e),
        }
    }

    fn more_data_available(&mut self) {
        let Some(bytes) = self.last_frame.take() else {
            debug!("No cached frame to replay");
            return;
        };
        let Some(frame) = EapolPacket::from_bytes(&bytes) else {
            return;
        };
        let Some(packet) = EapPacket::from_bytes(frame.body) else {
            return;
        };
        match self.state {
            SupplicantState::Acquired => self.respond_identity(&frame, &packet),
            SupplicantState::Authenticating => self.process_eap(&frame, &packet),
            state => debug!("Cached frame discarded in state {}", state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dot1x_net::eapol;

    fn supplicant(mode: PortMode, profile: Profile) -> Supplicant {
        Supplicant::new(
            Arc::new(Tunables::default()),
            Arc::new(MethodRegistry::with_builtin()),
            mode,
            false,
            profile,
        )
    }

    fn alice() -> Profile {
        Profile {
            user_name: Some("alice".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    fn feed(supplicant: &mut Supplicant, eap: &[u8]) -> Vec<Effect> {
        let frame = eapol::build(1, EapolType::Eap, eap);
        let packet = EapolPacket::from_bytes(&frame).unwrap();
        supplicant.handle(Event::Frame(&packet))
    }

    fn transmitted(effects: &[Effect]) -> Vec<(EapolType, Vec<u8>)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Transmit { packet_type, body } => Some((*packet_type, body.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_link_up_sends_start() {
        let mut s = supplicant(PortMode::System, alice());
        assert_eq!(s.state(), SupplicantState::Inactive);
        let effects = s.handle(Event::LinkUp);
        assert_eq!(s.state(), SupplicantState::Connecting);
        assert_eq!(transmitted(&effects), vec![(EapolType::Start, vec![])]);
        assert_eq!(s.timer().unwrap().kind, TimerKind::Start);
        assert!(s.receive_enabled());
    }

    #[test]
    fn test_start_retries_then_no_authenticator() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        for _ in 0..2 {
            let effects = s.handle(Event::Timeout);
            assert_eq!(transmitted(&effects).len(), 1);
            assert_eq!(s.state(), SupplicantState::Connecting);
        }
        let effects = s.handle(Event::Timeout);
        assert!(transmitted(&effects).is_empty());
        assert_eq!(s.state(), SupplicantState::NoAuthenticator);
        assert!(s.timer().is_none());
        assert!(s.receive_enabled());
    }

    #[test]
    fn test_frame_reactivates_from_no_authenticator() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        for _ in 0..3 {
            s.handle(Event::Timeout);
        }
        assert_eq!(s.state(), SupplicantState::NoAuthenticator);

        // Non-identity request: dropped, but Start still goes out.
        let effects = feed(&mut s, &[1, 9, 0, 6, 4, 0]);
        assert_eq!(s.state(), SupplicantState::Connecting);
        assert_eq!(transmitted(&effects), vec![(EapolType::Start, vec![])]);
        assert_eq!(s.timer().unwrap().kind, TimerKind::Start);

        for _ in 0..3 {
            s.handle(Event::Timeout);
        }
        let effects = feed(&mut s, &[1, 1, 0, 5, 1]);
        assert_eq!(s.state(), SupplicantState::Acquired);
        assert_eq!(transmitted(&effects), vec![(EapolType::Eap, eap::identity_response(1, "alice"))]);
    }

    #[test]
    fn test_identity_then_md5_then_success() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);

        let effects = feed(&mut s, &[1, 1, 0, 5, 1]);
        assert_eq!(s.state(), SupplicantState::Acquired);
        assert!(s.identity_sent());
        assert_eq!(transmitted(&effects)[0].1, eap::identity_response(1, "alice"));
        assert_eq!(s.last_response().unwrap().identifier, 1);

        let effects = feed(&mut s, &[1, 2, 0, 7, 4, 1, 0x42]);
        assert_eq!(s.state(), SupplicantState::Authenticating);
        let sent = transmitted(&effects);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1[0], EapCode::Response as u8);
        assert_eq!(sent[0].1[4], EapType::MD5_CHALLENGE.0);
        assert_eq!(s.status_report().eap_type, Some(EapType::MD5_CHALLENGE));

        let effects = feed(&mut s, &[3, 2, 0, 4]);
        assert_eq!(s.state(), SupplicantState::Authenticated);
        assert_eq!(s.status(), &ClientStatus::Ok);
        assert!(effects.contains(&Effect::DismissAlert));
        assert!(s.timer().is_none());
    }

    #[test]
    fn test_bare_success_and_failure() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        feed(&mut s, &[3, 1, 0, 4]);
        assert_eq!(s.state(), SupplicantState::Authenticated);

        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        let effects = feed(&mut s, &[4, 1, 0, 4]);
        assert_eq!(s.state(), SupplicantState::Held);
        assert!(effects.contains(&Effect::Alert(ClientStatus::Failed)));
        assert_eq!(s.timer().unwrap().kind, TimerKind::Held);
        assert_eq!(s.failure_count(), 1);
    }

    #[test]
    fn test_nak_exhausted_goes_held() {
        let profile = Profile {
            accept_eap_types: vec![EapType::TLS],
            ..alice()
        };
        // TLS is not runnable here, so nothing is acceptable.
        let mut s = supplicant(PortMode::System, profile);
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        let effects = feed(&mut s, &[1, 5, 0, 6, 4, 0]);
        assert_eq!(transmitted(&effects), vec![(EapolType::Eap, vec![2, 5, 0, 6, 3, 0])]);
        assert_eq!(s.state(), SupplicantState::Held);
        assert_eq!(s.status(), &ClientStatus::ProtocolNotSupported);
    }

    #[test]
    fn test_notification_answered_without_state_change() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        let effects = feed(&mut s, &[1, 4, 0, 9, 2, b'h', b'e', b'y', b'!']);
        assert_eq!(s.state(), SupplicantState::Connecting);
        assert_eq!(transmitted(&effects), vec![(EapolType::Eap, vec![2, 4, 0, 5, 2])]);
        assert_eq!(s.status_report().last_notification.as_deref(), Some("hey!"));
    }

    #[test]
    fn test_user_input_not_possible_in_system_mode() {
        let mut s = supplicant(PortMode::System, Profile::default());
        s.handle(Event::LinkUp);
        let effects = feed(&mut s, &[1, 1, 0, 5, 1]);
        assert_eq!(s.state(), SupplicantState::Held);
        assert!(effects.contains(&Effect::Alert(ClientStatus::UserInputNotPossible)));
    }

    #[test]
    fn test_user_input_replays_identity() {
        let mut s = supplicant(PortMode::User, Profile::default());
        s.handle(Event::LinkUp);
        let effects = feed(&mut s, &[1, 1, 0, 5, 1]);
        assert_eq!(s.state(), SupplicantState::Acquired);
        assert!(transmitted(&effects).is_empty());
        assert_eq!(s.status(), &ClientStatus::UserInputRequired);
        assert_eq!(
            s.status_report().missing_properties,
            vec!["UserName".to_string(), "UserPassword".to_string()]
        );

        let generation = s.generation();
        let effects = s.take_user_input(UserAnswers {
            user_name: Some("bob".to_string()),
            password: Some("pw".to_string()),
        });
        assert!(s.generation() > generation);
        assert_eq!(transmitted(&effects), vec![(EapolType::Eap, eap::identity_response(1, "bob"))]);
        assert_eq!(s.state(), SupplicantState::Acquired);
    }

    #[test]
    fn test_method_input_replays_challenge() {
        let profile = Profile {
            user_name: Some("bob".to_string()),
            ..Default::default()
        };
        let mut s = supplicant(PortMode::User, profile);
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        let effects = feed(&mut s, &[1, 2, 0, 7, 4, 1, 0x42]);
        assert!(transmitted(&effects).is_empty());
        assert_eq!(s.status(), &ClientStatus::UserInputRequired);
        assert_eq!(s.status_report().missing_properties, vec!["UserPassword".to_string()]);

        let effects = s.take_user_input(UserAnswers {
            user_name: None,
            password: Some("pw".to_string()),
        });
        let sent = transmitted(&effects);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1[1], 2);
        assert_eq!(s.state(), SupplicantState::Authenticating);
    }

    #[test]
    fn test_held_expires_to_connecting() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        feed(&mut s, &[4, 1, 0, 4]);
        assert_eq!(s.timer().unwrap().period, Duration::from_secs(60));
        let effects = s.handle(Event::Timeout);
        assert_eq!(s.state(), SupplicantState::Connecting);
        assert_eq!(transmitted(&effects), vec![(EapolType::Start, vec![])]);
    }

    #[test]
    fn test_bad_credentials_forgotten_when_prompting() {
        let mut s = supplicant(PortMode::User, alice());
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        feed(&mut s, &[4, 1, 0, 4]);
        assert_eq!(s.failure_count(), 0);
        assert_eq!(s.working_profile().identity(), None);
    }

    #[test]
    fn test_logoff_only_from_authenticated() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        assert!(transmitted(&s.handle(Event::Logoff)).is_empty());
        assert_eq!(s.state(), SupplicantState::Connecting);

        feed(&mut s, &[1, 1, 0, 5, 1]);
        feed(&mut s, &[3, 1, 0, 4]);
        let effects = s.handle(Event::Logoff);
        assert_eq!(s.state(), SupplicantState::Logoff);
        assert_eq!(transmitted(&effects), vec![(EapolType::Logoff, vec![])]);
    }

    #[test]
    fn test_link_down_resets() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        s.handle(Event::LinkDown);
        assert_eq!(s.state(), SupplicantState::Inactive);
        assert!(s.timer().is_none());
        assert!(!s.receive_enabled());
        assert!(s.last_response().is_none());
        assert!(feed(&mut s, &[1, 2, 0, 5, 1]).is_empty());
    }

    #[test]
    fn test_remember_credentials() {
        let profile = Profile {
            remember_credentials: true,
            ..alice()
        };
        let mut s = supplicant(PortMode::User, profile);
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        let effects = feed(&mut s, &[3, 1, 0, 4]);
        assert!(effects.contains(&Effect::SaveCredentials(StoredCredentials {
            user_name: "alice".to_string(),
            password: Some("secret".to_string()),
        })));
    }

    #[test]
    fn test_apply_profile_restarts_on_change() {
        let mut s = supplicant(PortMode::System, alice());
        s.handle(Event::LinkUp);
        feed(&mut s, &[1, 1, 0, 5, 1]);
        feed(&mut s, &[3, 1, 0, 4]);
        assert!(transmitted(&s.apply_profile(alice())).is_empty());
        assert_eq!(s.state(), SupplicantState::Authenticated);

        let other = Profile {
            user_name: Some("carol".to_string()),
            ..alice()
        };
        let effects = s.apply_profile(other);
        assert_eq!(s.state(), SupplicantState::Connecting);
        assert_eq!(transmitted(&effects), vec![(EapolType::Start, vec![])]);
    }

    #[test]
    fn test_preauth_clone() {
        let mut main = supplicant(PortMode::User, alice());
        main.handle(Event::LinkUp);
        let mut pre = main.clone_for_preauth();
        assert!(pre.is_preauth());
        assert_eq!(pre.state(), SupplicantState::Inactive);
        assert_eq!(pre.generation(), main.generation());
        pre.handle(Event::LinkUp);
        feed(&mut pre, &[1, 1, 0, 5, 1]);
        assert!(!pre.is_finished());
        feed(&mut pre, &[3, 1, 0, 4]);
        assert!(pre.is_finished());
    }
}
