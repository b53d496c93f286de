//! Copyright 2024 Cosmian Tech SAS
//!
//! Client for PKCS#11 cryptographic tokens: loads a vendor module,
//! walks its slots, opens sessions and drives a signing operation.
//! Everything above the raw dispatch goes through the [`Pkcs11Api`]
//! seam so a scripted module can stand in for real hardware.

mod api;
mod attribute;
mod error;
mod module;
mod rv;
mod session;
mod slots;
mod workflow;

pub use api::Pkcs11Api;
pub use attribute::Attribute;
pub use error::{TResult, TokenError};
pub use module::{ModuleInfo, Pkcs11Module};
pub use rv::rv_description;
pub use session::{SIGNATURE_CAPACITY, Session};
pub use slots::list_slots;
pub use workflow::{DEMO_PAYLOAD, Outcome, SigningWorkflow};

#[cfg(test)]
mod tests;
