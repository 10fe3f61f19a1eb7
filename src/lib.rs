//! webcore - cache engine and credential lifecycle for web applications
//!
//! A unified cache over an embedded LMDB store or Redis, plus bearer tokens,
//! remember-me cookies and signed password reset links.

pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod session;
pub mod tasks;

pub use api::AppState;
pub use app::App;
pub use config::Config;
