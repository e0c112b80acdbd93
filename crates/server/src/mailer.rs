//! Outbound mail via an HTTP relay. One message per accepted submission goes
//! to the claims team; when mail is disabled the message is logged and
//! dropped so the submission path never depends on the relay.

use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use aquaclaim_core::config::MailConfig;
use aquaclaim_core::domain::observation::{PwsId, SourceName};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay is misconfigured: {0}")]
    Configuration(String),
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay rejected the message ({status}): {body}")]
    Relay { status: StatusCode, body: String },
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

pub struct Mailer {
    config: MailConfig,
    client: Client,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config, client: Client::new() }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Notifies the claims team that a provider submitted an update. Callers
    /// fire this after the submission is already persisted; failures are
    /// logged by the caller and never unwind the submission.
    pub async fn send_submission_notice(
        &self,
        pwsid: &PwsId,
        source_name: &SourceName,
        update_kind: &str,
    ) -> Result<(), MailError> {
        let subject = format!("Portal update received for {} / {}", pwsid.0, source_name.0);
        let body = format!(
            "A water provider submitted a {update_kind} update for system {} source {}.\n\
             The source metrics have been re-derived.",
            pwsid.0, source_name.0
        );

        let Some(to) = self.config.claims_team_address.as_deref() else {
            return Err(MailError::Configuration("mail.claims_team_address is not set".into()));
        };
        self.send(to, &subject, &body).await
    }

    /// Relays a provider's contact-form message to the claims team. The reply
    /// address goes in the body since the relay sends from a fixed address.
    pub async fn send_contact_message(
        &self,
        pwsid: &PwsId,
        from_name: &str,
        reply_to: &str,
        message: &str,
    ) -> Result<(), MailError> {
        let subject = format!("Portal contact from {from_name} ({})", pwsid.0);
        let body = format!("From: {from_name} <{reply_to}>\nWater system: {}\n\n{message}", pwsid.0);

        let Some(to) = self.config.claims_team_address.as_deref() else {
            return Err(MailError::Configuration("mail.claims_team_address is not set".into()));
        };
        self.send(to, &subject, &body).await
    }

    pub async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), MailError> {
        if !self.config.enabled {
            info!(
                event_name = "mail.skipped",
                to,
                subject,
                "mail relay disabled, dropping message"
            );
            return Ok(());
        }

        let relay_url = self
            .config
            .relay_url
            .as_deref()
            .ok_or_else(|| MailError::Configuration("mail.relay_url is not set".into()))?;

        let mut request = self.client.post(relay_url).json(&RelayMessage {
            from: &self.config.from_address,
            to,
            subject,
            text,
        });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "mail.relay_rejected",
                status = %status,
                to,
                "mail relay rejected the message"
            );
            return Err(MailError::Relay { status, body });
        }

        info!(event_name = "mail.sent", to, subject, "notification delivered to relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aquaclaim_core::config::MailConfig;
    use aquaclaim_core::domain::observation::{PwsId, SourceName};

    use super::{MailError, Mailer};

    #[tokio::test]
    async fn disabled_mailer_drops_the_message_without_error() {
        let mailer = Mailer::new(MailConfig {
            enabled: false,
            relay_url: None,
            api_key: None,
            from_address: "portal@example.org".to_owned(),
            claims_team_address: Some("claims@example.org".to_owned()),
        });

        mailer
            .send_submission_notice(
                &PwsId("CA0000001".to_owned()),
                &SourceName("Well 01".to_owned()),
                "pfas result",
            )
            .await
            .expect("disabled mailer is a no-op");
    }

    #[tokio::test]
    async fn missing_claims_team_address_is_a_configuration_error() {
        let mailer = Mailer::new(MailConfig {
            enabled: false,
            relay_url: None,
            api_key: None,
            from_address: "portal@example.org".to_owned(),
            claims_team_address: None,
        });

        let error = mailer
            .send_submission_notice(
                &PwsId("CA0000001".to_owned()),
                &SourceName("Well 01".to_owned()),
                "max flow",
            )
            .await
            .expect_err("missing address");
        assert!(matches!(error, MailError::Configuration(_)));
    }
}
