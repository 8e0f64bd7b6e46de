//! SMS delivery collaborator
//!
//! Challenges are persisted before delivery is attempted, so a delivery
//! failure is surfaced to the caller without rolling the challenge back.

use async_trait::async_trait;
use thiserror::Error;

/// SMS delivery errors
#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS provider request failed: {0}")]
    Request(String),

    #[error("SMS provider rejected the message: {0}")]
    Rejected(String),
}

/// Outbound SMS sender
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone: &str, code: &str) -> Result<(), SmsError>;
}

/// Development sender: logs the code instead of sending it.
///
/// Never use outside development; the plaintext code must not reach logs in
/// a production deployment.
pub struct DevSmsSender;

#[async_trait]
impl SmsSender for DevSmsSender {
    async fn send(&self, phone: &str, code: &str) -> Result<(), SmsError> {
        tracing::info!(phone = %phone, code = %code, "DEV_SMS_SEND");
        Ok(())
    }
}

/// Twilio-backed sender using the Messages API
pub struct TwilioSmsSender {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSmsSender {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from_number,
        }
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, phone: &str, code: &str) -> Result<(), SmsError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let body = format!("Your verification code is {}", code);
        let params = [("To", phone), ("From", &self.from_number), ("Body", &body)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| SmsError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(phone = %phone, status = %status, "SMS delivery rejected");
            return Err(SmsError::Rejected(format!("{}: {}", status, detail)));
        }

        tracing::info!(phone = %phone, "SMS sent");
        Ok(())
    }
}
