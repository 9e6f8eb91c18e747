use serde_json::Value;

use crate::error::Result;
use crate::model::auth::{
    ApiMessage, AuthResponse, Credentials, PasswordChange, PasswordReset, ResetCodeRequest,
    SignupRequest, VerificationCode,
};
use crate::session::StoreKey;
use crate::transport::ApiRequest;

use super::Client;

impl Client {
    /// Log in and start a session.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        // A 401 here means bad credentials, not an expired token.
        let request = ApiRequest::post("/api/v1/auth/login")
            .public()
            .json(credentials)?;
        let auth: AuthResponse = self.call(request).await?;
        self.session.begin(&auth)?;
        info!("Logged in as {}", credentials.email);
        Ok(auth)
    }

    /// Create an account and start a session with whatever the backend returns.
    pub async fn signup(&self, signup: &SignupRequest) -> Result<AuthResponse> {
        let request = ApiRequest::post("/api/v1/auth/signup")
            .public()
            .json(signup)?;
        let auth: AuthResponse = self.call(request).await?;
        self.session.begin(&auth)?;
        info!("Signed up as {}", signup.email);
        Ok(auth)
    }

    /// End the session locally. The backend keeps no session to close.
    pub fn logout(&self) -> Result<()> {
        self.session.logout()
    }

    pub async fn send_email_verification(&self) -> Result<ApiMessage> {
        self.call(ApiRequest::post("/api/v1/auth/email-verification/code"))
            .await
    }

    pub async fn verify_email(&self, code: &str) -> Result<ApiMessage> {
        let request = ApiRequest::post("/api/v1/auth/email-verification/verify").json(
            &VerificationCode {
                verification_code: code.to_string(),
            },
        )?;
        self.call(request).await
    }

    pub async fn send_reset_code(&self, email: &str) -> Result<ApiMessage> {
        let request = ApiRequest::post("/api/v1/auth/password-reset/code")
            .public()
            .json(&ResetCodeRequest {
                email: email.to_string(),
            })?;
        self.call(request).await
    }

    pub async fn verify_and_reset(&self, reset: &PasswordReset) -> Result<ApiMessage> {
        let request = ApiRequest::post("/api/v1/auth/password-reset/verify-and-reset")
            .public()
            .json(reset)?;
        self.call(request).await
    }

    /// Profile of the logged-in user. Refreshes the cached copy.
    pub async fn user(&self) -> Result<Value> {
        let mut response: Value = self.call(ApiRequest::get("/api/v1/user")).await?;
        let user = if response.get("userInfo").is_some() {
            response["userInfo"].take()
        } else {
            response
        };
        self.session.set(StoreKey::User, user.to_string())?;
        Ok(user)
    }

    /// Delete the account, then end the session.
    pub async fn delete_user(&self) -> Result<ApiMessage> {
        let message = self.call(ApiRequest::delete("/api/v1/user/delete")).await?;
        self.session.logout()?;
        Ok(message)
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<ApiMessage> {
        let request = ApiRequest::put("/api/v1/user/password-reset").json(change)?;
        self.call(request).await
    }

    pub async fn settings(&self) -> Result<Value> {
        let mut response: Value = self.call(ApiRequest::get("/api/v1/user/settings")).await?;
        Ok(response
            .get_mut("userSettings")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Save settings, returning what the backend stored.
    pub async fn update_settings(&self, settings: &Value) -> Result<Value> {
        let request = ApiRequest::put("/api/v1/user/settings").json(settings)?;
        let mut response: Value = self.call(request).await?;
        Ok(match response.get_mut("userSettings") {
            Some(saved) if !saved.is_null() => saved.take(),
            _ => settings.clone(),
        })
    }

    pub fn theme(&self) -> Option<String> {
        self.session.get(StoreKey::Theme)
    }

    pub fn set_theme(&self, theme: &str) -> Result<()> {
        self.session.set(StoreKey::Theme, theme.to_string())
    }
}
