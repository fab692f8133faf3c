//! Federated login: provider registry, HTTP plumbing and account reconciliation.

pub mod client;
pub mod config;
pub mod profile;
pub mod reconciler;

pub use client::{HttpOAuthClient, OAuthClient};
pub use config::{ProviderConfig, ProviderKind, Providers};
pub use profile::ProviderProfile;
pub use reconciler::FederatedReconciler;
