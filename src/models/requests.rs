//! Request DTOs for the HTTP API
//!
//! JSON bodies for the cache and token endpoints, form bodies for the
//! cookie-based user flows.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cache::MAX_KEY_LENGTH;

/// Body of `POST /api/save-in-cache`
#[derive(Debug, Clone, Deserialize)]
pub struct SaveInCacheRequest {
    pub name: String,
    /// Any JSON value, stored with its full shape
    pub value: serde_json::Value,
    /// Seconds until expiry, 0 or absent for none
    #[serde(default)]
    pub expires_in: u64,
}

impl SaveInCacheRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some("Name cannot be empty".to_string());
        }
        if self.name.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Name exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}

/// Body of the get/delete cache endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct CacheKeyRequest {
    pub name: String,
}

/// Body of `POST /api/empty-cache-by-match`
#[derive(Debug, Clone, Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
}

/// Body of `POST /api/tokens`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/validate-token`
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

/// Form posted to `/users/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    /// `"remember"` when the box is ticked
    #[serde(default)]
    pub remember: Option<String>,
}

impl LoginForm {
    pub fn wants_remember(&self) -> bool {
        self.remember.as_deref() == Some("remember")
    }
}

/// Form posted to `/users/forgot-password`
#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

/// Query of the signed `GET /users/reset-password` link
#[derive(Debug, Clone, Deserialize)]
pub struct ResetQuery {
    pub email: String,
}

/// Form posted to `/users/reset-password`
#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordForm {
    /// Encrypted email handed out by the reset form
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/create-user`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl CreateUserRequest {
    /// Every failing field with its message, empty when valid.
    pub fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        check_names(&self.first_name, &self.last_name, &mut errors);
        check_email(&self.email, &mut errors);
        if self.password.is_empty() {
            errors.insert("password".to_string(), "Password cannot be empty".to_string());
        }
        errors
    }
}

/// Body of `POST /api/update-user/:id`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

/// Record fields as they would read after an update.
#[derive(Debug, Clone)]
pub struct UserFields {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl UserFields {
    pub fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        check_names(&self.first_name, &self.last_name, &mut errors);
        check_email(&self.email, &mut errors);
        errors
    }
}

fn check_names(first_name: &str, last_name: &str, errors: &mut BTreeMap<String, String>) {
    if first_name.trim().is_empty() {
        errors.insert("first_name".to_string(), "First name must be provided".to_string());
    }
    if last_name.trim().is_empty() {
        errors.insert("last_name".to_string(), "Last name must be provided".to_string());
    }
}

fn check_email(email: &str, errors: &mut BTreeMap<String, String>) {
    if !is_email(email) {
        errors.insert("email".to_string(), "Invalid email address".to_string());
    }
}

/// `local@domain.tld` with no whitespace.
pub fn is_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_deserialize() {
        let json = r#"{"name": "person", "value": {"id": 1, "hobbies": ["hiking"]}}"#;
        let req: SaveInCacheRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.name, "person");
        assert_eq!(req.value["hobbies"][0], "hiking");
        assert_eq!(req.expires_in, 0);
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_name() {
        let req = SaveInCacheRequest {
            name: String::new(),
            value: serde_json::Value::Null,
            expires_in: 0,
        };
        assert!(req.validate().is_some());

        let req = SaveInCacheRequest {
            name: "n".repeat(MAX_KEY_LENGTH + 1),
            ..req
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_login_remember_flag() {
        let form = LoginForm {
            email: "a@example.com".to_string(),
            password: "pw".to_string(),
            remember: Some("remember".to_string()),
        };
        assert!(form.wants_remember());

        let form = LoginForm {
            remember: None,
            ..form
        };
        assert!(!form.wants_remember());
    }

    #[test]
    fn test_create_user_validation() {
        let req = CreateUserRequest {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john.doe@here.com".to_string(),
            password: "password".to_string(),
        };
        assert!(req.validate().is_empty());

        let req = CreateUserRequest {
            last_name: " ".to_string(),
            email: "john.doe".to_string(),
            password: String::new(),
            ..req
        };
        let errors = req.validate();
        assert_eq!(
            errors.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["email", "last_name", "password"]
        );
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_email("a@example.com"));
        assert!(is_email("first.last@mail.example.org"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("a@example"));
        assert!(!is_email("a@b@example.com"));
        assert!(!is_email("a b@example.com"));
        assert!(!is_email("a@.com"));
    }
}
