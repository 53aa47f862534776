//! Storefront login core.
//!
//! Authenticates storefront users against an OpenID identity provider
//! extended with macaroon-based API credentials, and acts on their behalf
//! against the backend dashboard API. The web framework, CSRF wiring and
//! session storage are external collaborators: handlers in [`login`]
//! take an explicit [`session::Session`] and return [`login::LoginAction`]
//! values for the web layer to execute.

pub mod config;
pub mod credential;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod http_client;
pub mod login;
pub mod provider;
pub mod session;
