//! Auth Module
//!
//! Credential lifecycle: bearer tokens, remember-me pairings, signed reset
//! links and the encryption used to carry an email through the reset form.

pub mod crypto;
pub mod remember;
pub mod service;
pub mod signer;
pub mod store;
pub mod token;
pub mod user;

pub use crypto::Encryption;
pub use remember::RememberMe;
pub use service::TokenService;
pub use signer::{UrlSigner, RESET_LINK_MINUTES};
pub use store::{MemoryStore, RememberToken, RememberTokenStore, RowId, TokenStore, UserStore};
pub use token::{generate_token, hash_token, Token, TOKEN_LENGTH};
pub use user::User;
