//! Service layer: the OAuth proxy state machine and its helpers.

pub mod oauth_service;
pub mod pkce;
pub mod secrets;
pub mod upstream;

pub use oauth_service::OAuthProxyService;
