//! API Module
//!
//! HTTP surface over the cache engine and the credential lifecycle.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `POST /api/save-in-cache`, `/api/get-from-cache`, `/api/delete-from-cache`,
//!   `/api/empty-cache`, `/api/empty-cache-by-match` - Cache demo API
//! - `POST /api/tokens`, `GET /api/me`, `POST /api/validate-token` - Bearer tokens
//! - `POST /api/create-user`, `GET /api/get-all-users`, `GET /api/get-user/:id`,
//!   `POST /api/update-user/:id`, `POST /api/delete-user/:id` - User accounts
//! - `POST /users/login`, `GET /users/logout`, `GET /users/flash` - Cookie sessions
//! - `POST /users/forgot-password`, `GET|POST /users/reset-password` - Password reset

pub mod accounts;
pub mod handlers;
pub mod middleware;
pub mod routes;
mod state;
pub mod users;

pub use middleware::{BearerUser, CurrentSession};
pub use routes::create_router;
pub use state::AppState;
