use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{EmailCredentials, EmailSettings};
use crate::error::{NotifierError, Result};
use crate::notifier::{compose_body, NotificationProvider};
use crate::parser::MatchRecord;

/// Looks up one environment-style variable by name.
pub type CredentialLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Sends the match summary as one plain-text mail over STARTTLS SMTP.
pub struct EmailNotifier {
    settings: EmailSettings,
    lookup: CredentialLookup,
}

impl EmailNotifier {
    /// Credentials are read from `EMAIL_ADDRESS`/`EMAIL_PASSWORD` at send time.
    pub fn new(settings: EmailSettings) -> Self {
        Self::with_lookup(settings, |key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(settings: EmailSettings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            settings,
            lookup: Box::new(lookup),
        }
    }

    fn resolve_credentials(&self) -> Result<EmailCredentials> {
        EmailCredentials::from_lookup(|key| (self.lookup)(key))
    }

    pub(crate) fn build_message(&self, sender: &str, matches: &[MatchRecord]) -> Result<Message> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| NotifierError::EmailError(format!("Invalid sender address '{}': {}", sender, e)))?;
        let to: Mailbox = self
            .settings
            .recipient
            .parse()
            .map_err(|e| NotifierError::EmailError(format!("Invalid recipient address '{}': {}", self.settings.recipient, e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(self.settings.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(compose_body(matches))
            .map_err(|e| NotifierError::EmailError(format!("Failed to build email: {}", e)))?;

        Ok(message)
    }
}

#[async_trait::async_trait]
impl NotificationProvider for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send_matches(&self, matches: &[MatchRecord]) -> Result<()> {
        let credentials = self.resolve_credentials()?;
        let message = self.build_message(&credentials.address, matches)?;

        debug!("Connecting to {}:{}", self.settings.smtp_host, self.settings.smtp_port);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_host)
            .map_err(NotifierError::from)?
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(credentials.address, credentials.password))
            .build();

        mailer.send(message).await.map_err(NotifierError::from)?;

        info!("Email sent to {}", self.settings.recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EMAIL_ADDRESS_ENV, EMAIL_PASSWORD_ENV};
    use crate::parser::ListingRecord;

    fn notifier() -> EmailNotifier {
        EmailNotifier::with_lookup(Config::default().email, |key| match key {
            EMAIL_ADDRESS_ENV => Some("bot@example.org".to_string()),
            EMAIL_PASSWORD_ENV => Some("secret".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_build_message_headers() {
        let matches = vec![MatchRecord::from(&ListingRecord::new("Verpflegung Los 1", "http://x/1"))];
        let message = notifier().build_message("bot@example.org", &matches).unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: bot@example.org"));
        assert!(raw.contains("To: ausschreibungen@example.org"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("Subject:"));
    }

    #[test]
    fn test_invalid_recipient_is_email_error() {
        let mut settings = Config::default().email;
        settings.recipient = "not an address".to_string();
        let notifier = EmailNotifier::new(settings);

        let err = notifier.build_message("bot@example.org", &[]).unwrap_err();
        let err = err.downcast::<NotifierError>().unwrap();
        assert!(matches!(*err, NotifierError::EmailError(_)));
    }

    #[test]
    fn test_credentials_come_from_lookup() {
        let creds = notifier().resolve_credentials().unwrap();
        assert_eq!(creds.address, "bot@example.org");
        assert_eq!(creds.password, "secret");
    }

    #[tokio::test]
    async fn test_send_without_credentials_is_config_error() {
        let notifier = EmailNotifier::with_lookup(Config::default().email, |_| None);
        let matches = vec![MatchRecord::from(&ListingRecord::new("Hotel", "http://x/2"))];

        // fails before any SMTP connection is attempted
        let err = notifier.send_matches(&matches).await.unwrap_err();
        let err = err.downcast::<NotifierError>().unwrap();
        assert!(matches!(*err, NotifierError::ConfigError(ref m) if m.contains("EMAIL_ADDRESS")));
    }

    #[tokio::test]
    async fn test_send_without_password_names_it() {
        let notifier = EmailNotifier::with_lookup(Config::default().email, |key| {
            (key == EMAIL_ADDRESS_ENV).then(|| "bot@example.org".to_string())
        });

        let err = notifier.send_matches(&[]).await.unwrap_err();
        assert!(err.to_string().contains("EMAIL_PASSWORD"));
    }
}
