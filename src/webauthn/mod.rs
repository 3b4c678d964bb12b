//! # Ceremony Orchestrator
//!
//! The FIDO2 ceremony state machine, on top of the credential store, the
//! challenge caches and the [`Fido2`](crate::fido2::Fido2) seam.
//!
//! ## Submodules
//! - `types`: form bodies of the options requests
//! - `registration`: creating new passkey credentials
//! - `authentication`: signing in with existing passkeys
//!
//! ## Ceremony States
//! `Requested → Pending → Verified | Rejected | Expired`
//!
//! A ceremony is Pending while its options sit in a challenge cache. The
//! response submission takes them out again before anything is verified, so
//! every submission ends the ceremony whatever its outcome. Expired is what a
//! submission finds once the cache TTL has passed.

pub mod authentication;
pub mod registration;
pub mod types;
