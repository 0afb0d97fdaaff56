//! Turns a configured [`Profile`] plus interactively collected answers into
//! the working identity of a supplicant.

use crate::accept_types::AcceptTypes;
use crate::config::Profile;
use crate::eap_type::EapType;
use serde::{Deserialize, Serialize};

pub const PROPERTY_USER_NAME: &str = "UserName";
pub const PROPERTY_USER_PASSWORD: &str = "UserPassword";

const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Answers collected by a prompt and delivered with `TakeUserInput`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct UserAnswers {
    pub user_name: Option<String>,
    pub password: Option<String>,
}

/// A credential field. A value marked `ignored` is kept but never presented.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credential {
    pub value: Option<String>,
    pub ignored: bool,
}

impl Credential {
    pub fn new(value: Option<String>) -> Self {
        Credential { value, ignored: false }
    }

    pub fn get(&self) -> Option<&str> {
        if self.ignored {
            None
        } else {
            self.value.as_deref()
        }
    }

    pub fn ignore(&mut self) {
        self.ignored = true;
    }
}

/// The identity and method policy a supplicant currently works with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkingProfile {
    pub accept_types: AcceptTypes,
    pub user_name: Credential,
    pub password: Credential,
    pub outer_identity: Credential,
    pub tls_identity: Credential,
    pub require_privacy: bool,
    pub remember_credentials: bool,
    pub one_time_password: bool,
    /// Set when a method produced the identity on its own.
    pub derived_identity: Option<String>,
    pub missing_properties: Vec<String>,
}

impl WorkingProfile {
    /// Recomputes the working set from `profile` merged with `answers`.
    ///
    /// `available` lists the EAP types that can actually be run and
    /// `derived_identity` is an identity a method can supply without asking.
    /// Returns whether anything that affects the exchange changed.
    pub fn update(
        &mut self,
        profile: &Profile,
        answers: &UserAnswers,
        available: &[EapType],
        derived_identity: Option<String>,
    ) -> bool {
        let previous = self.clone();

        let user_name = answers.user_name.clone().or_else(|| profile.user_name.clone());
        let password = answers.password.clone().or_else(|| profile.password.clone());
        self.user_name = carry_ignore(&previous.user_name, user_name, answers.user_name.is_some());
        self.password = carry_ignore(&previous.password, password, answers.password.is_some());
        self.outer_identity = Credential::new(profile.outer_identity.clone());
        self.tls_identity = carry_ignore(&previous.tls_identity, profile.tls_identity.clone(), false);
        self.require_privacy = profile.require_privacy;
        self.remember_credentials = profile.remember_credentials;
        self.one_time_password = profile.one_time_password;
        self.derived_identity = derived_identity;

        let requested: Vec<EapType> = if profile.accept_eap_types.is_empty() {
            available.to_vec()
        } else {
            profile.accept_eap_types.clone()
        };
        let mut accept = AcceptTypes::new(requested);
        accept.retain(|t| available.contains(&t));

        let has_cert = self.tls_identity.get().is_some();
        let has_password = self.password.get().is_some();
        if has_cert && !has_password {
            accept.retain(|t| t == EapType::TLS);
        } else if has_password && !has_cert {
            accept.retain(|t| t != EapType::TLS);
        }
        self.accept_types = accept;

        self.missing_properties = self.compute_missing();

        self.accept_types != previous.accept_types
            || self.user_name != previous.user_name
            || self.password != previous.password
            || self.outer_identity != previous.outer_identity
            || self.tls_identity != previous.tls_identity
            || self.require_privacy != previous.require_privacy
            || self.derived_identity != previous.derived_identity
    }

    fn compute_missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.user_name.get().is_none() && self.derived_identity.is_none() {
            missing.push(PROPERTY_USER_NAME.to_string());
        }
        let needs_password = self.accept_types.types().iter().any(|t| *t != EapType::TLS);
        if needs_password && self.password.get().is_none() && self.derived_identity.is_none() {
            missing.push(PROPERTY_USER_PASSWORD.to_string());
        }
        missing
    }

    /// The identity to put in an EAP-Response/Identity, if any.
    pub fn identity(&self) -> Option<String> {
        if self.require_privacy && self.accept_types.use_outer_identity() {
            if let Some(outer) = self.outer_identity.get() {
                return Some(outer.to_string());
            }
            // Keep the realm so the server can still route the request.
            let realm = self.user_name.get().and_then(|u| u.split_once('@')).map(|(_, r)| r);
            return Some(match realm {
                Some(realm) => format!("{}@{}", ANONYMOUS_IDENTITY, realm),
                None => ANONYMOUS_IDENTITY.to_string(),
            });
        }
        self.user_name
            .get()
            .map(str::to_string)
            .or_else(|| self.derived_identity.clone())
    }

    /// Forgets cached credentials so the next attempt prompts again.
    pub fn forget_credentials(&mut self) {
        self.user_name.ignore();
        self.password.ignore();
        self.tls_identity.ignore();
        self.missing_properties = self.compute_missing();
    }

    /// Called after a successful authentication with a one-time password.
    pub fn consume_one_time_password(&mut self) {
        if self.one_time_password {
            self.password.ignore();
            self.missing_properties = self.compute_missing();
        }
    }
}

// A fresh interactive answer clears a previous ignore mark; re-reading the
// same configured value keeps it.
fn carry_ignore(previous: &Credential, value: Option<String>, fresh: bool) -> Credential {
    let ignored = !fresh && previous.ignored && previous.value == value;
    Credential { value, ignored }
}
