use async_trait::async_trait;
use lumen_config::mail::{MailMessage, MailTransport, SmtpSettings};
use lumen_config::MailError;

/// Transport that records outgoing messages in the log instead of
/// delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, settings: &SmtpSettings, message: &MailMessage) -> Result<(), MailError> {
        if settings.host.trim().is_empty() {
            return Err(MailError::NotConfigured("SMTP host is empty".to_string()));
        }
        tracing::info!(
            host = %settings.host,
            port = ?settings.port,
            ssl = settings.ssl,
            authenticated = settings.password.is_some(),
            from = %message.from_address,
            to = %message.to,
            subject = %message.subject,
            "mail message recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn settings(host: &str) -> SmtpSettings {
        SmtpSettings {
            host: host.to_string(),
            port: Some(25),
            ssl: false,
            username: String::new(),
            password: None,
            additional_properties: BTreeMap::new(),
        }
    }

    fn message() -> MailMessage {
        MailMessage {
            from_address: "lumen@apm01".to_string(),
            from_display_name: "Lumen".to_string(),
            to: "ops@example.com".to_string(),
            subject: "hello".to_string(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_send_with_host_succeeds() {
        assert!(LogMailTransport.send(&settings("mail.example.com"), &message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_without_host_is_not_configured() {
        let err = LogMailTransport.send(&settings(" "), &message()).await.unwrap_err();
        assert!(matches!(err, MailError::NotConfigured(_)));
    }
}
