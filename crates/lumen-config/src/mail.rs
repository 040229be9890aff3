//! Outbound mail interface.

use crate::error::MailError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use zeroize::Zeroize;

/// Connection settings resolved from an SMTP record, password decrypted
#[derive(Clone, PartialEq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub ssl: bool,
    pub username: String,
    pub password: Option<String>,
    pub additional_properties: BTreeMap<String, String>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("additional_properties", &self.additional_properties)
            .finish()
    }
}

impl Drop for SmtpSettings {
    fn drop(&mut self) {
        if let Some(password) = self.password.as_mut() {
            password.zeroize();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from_address: String,
    pub from_display_name: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, settings: &SmtpSettings, message: &MailMessage) -> Result<(), MailError>;
}
