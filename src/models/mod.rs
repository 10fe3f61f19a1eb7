//! Request and Response models for the HTTP API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    CacheKeyRequest, CreateUserRequest, ForgotPasswordForm, LoginForm, PatternRequest,
    ResetPasswordForm, ResetQuery, SaveInCacheRequest, TokenRequest, UpdateUserRequest,
    UserFields, ValidateTokenRequest,
};
pub use responses::{
    CacheValueResponse, CreatedUserResponse, FlashResponse, HealthResponse, LoginResponse,
    MessageResponse, ResetFormResponse, TokenResponse, ValidTokenResponse,
};
