//! # Gatekeep (Credential & Session Lifecycle Manager)
//!
//! `gatekeep` authenticates end users by password or through a federated
//! provider (Google, GitHub, Facebook), issues signed access/refresh token
//! pairs and enforces their validity on every protected request.
//!
//! ## Sessions
//!
//! Each identity owns at most one session row. Login, refresh and federated
//! login all rotate that row with a single upsert guarded by a unique
//! constraint, so a new login invalidates the previous refresh token.
//! Only the SHA-256 fingerprint of a refresh token is persisted.
//!
//! ## Revocation
//!
//! Logout deletes the session and marks the presented access token as revoked
//! for exactly its remaining lifetime. The access verifier checks signature,
//! then expiry, then the revocation cache, in that order.
//!
//! ## Units of work
//!
//! Every mutating operation runs inside a [`session::store::UnitOfWork`]. Writes
//! become visible only on `commit`; dropping the handle on any other exit path
//! rolls them back.

pub mod api;
pub mod cli;
pub mod oauth;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
