//! Credential and session lifecycle core.
//!
//! The pieces, leaves first:
//!
//! - [`password`]: credential verifier (Argon2id, fails closed)
//! - [`verifier`]: access verifier run on every protected request
//! - [`issuer`]: mints token pairs and writes the one session per identity
//! - [`revoker`]: deletes the session and blocks the presented access token
//! - [`store`]: unit of work over identities and sessions
//!
//! [`service::SessionService`] wires them into the public operations.

pub mod config;
pub mod error;
pub mod issuer;
pub mod models;
pub mod password;
pub mod revocation;
pub mod revoker;
pub mod service;
pub mod store;
pub mod token;
pub mod validate;
pub mod verifier;

pub use config::SessionConfig;
pub use error::AuthError;
pub use models::{Identity, IdentityId, Principal, Session, TokenPair};
pub use service::SessionService;
