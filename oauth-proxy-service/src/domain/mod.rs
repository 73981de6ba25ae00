//! Domain model for the OAuth proxy: the three record types that flow
//! through the persistence layer.

pub mod entities;

pub use entities::{AuthorizationCode, AuthorizationTransaction, RegisteredClient};
