pub mod auth;
pub mod health;
pub mod oauth;
pub mod user;
