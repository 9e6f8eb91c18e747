use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Login form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Account creation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Returned by login and signup. Every part is optional on the wire; the session
/// stores whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub jwt: Option<String>,
}

/// The body of the email verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCode {
    pub verification_code: String,
}

/// Request a password reset code for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCodeRequest {
    pub email: String,
}

/// Complete a password reset using an emailed code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub email: String,
    pub verification_code: String,
    pub new_password: String,
}

/// Change the password of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

/// The common `{message}` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn partial_auth_response() {
        let auth: AuthResponse = serde_json::from_value(json!({ "jwt": "a.b.c" })).unwrap();
        assert_eq!(auth.jwt.as_deref(), Some("a.b.c"));
        assert_eq!(auth.refresh_token, None);
        assert_eq!(auth.user_info, None);
    }

    #[test]
    fn signup_wire_names() {
        let signup = SignupRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.org".into(),
            password: "hunter22".into(),
        };
        assert_eq!(
            serde_json::to_value(signup).unwrap(),
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.org",
                "password": "hunter22",
            })
        );
    }
}
