pub mod auth;

pub use auth::{extract_credential, IdentityVerifier, JwtIdentityVerifier, User};
