pub mod accept_types;
pub mod config;
pub mod eap_type;
pub mod profile;
pub mod status;

pub use accept_types::AcceptTypes;
pub use config::{Config, LogLevel, PortMode, Profile, Tunables};
pub use eap_type::EapType;
pub use profile::{Credential, UserAnswers, WorkingProfile};
pub use status::{ClientStatus, SecurityCode, StatusReport, SupplicantState};
