//! ACME DNS-01 authenticator for domains spread across multiple DNS
//! providers.
//!
//! Given a domain under challenge, the [`Authenticator`] inspects the
//! domain's effective nameservers (or an explicit per-zone configuration),
//! matches them against known provider signatures, and creates the TXT
//! validation record through every matched provider's API.
//!
//! Cleanup is a no-op: validation records are never removed. See
//! [`Authenticator::cleanup`].

pub mod authenticator;
pub mod config;
pub mod detect;
pub mod dns;
pub mod error;

pub use authenticator::{Authenticator, RECORD_TTL};
pub use config::CredentialStore;
pub use error::{MixedDnsError, MixedDnsResult};
