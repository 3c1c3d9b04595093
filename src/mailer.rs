use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

/// Outbound transactional messages. Fire-and-forget from the caller's
/// perspective, but a transport failure is reported synchronously.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        data: serde_json::Value,
    ) -> anyhow::Result<()>;
}

fn render(template: &str, data: &serde_json::Value) -> String {
    let name = data["name"].as_str().unwrap_or("there");
    match template {
        "recovery-request" => {
            let url = data["url"].as_str().unwrap_or_default();
            format!(
                "<p>Hi <strong>{name}</strong>,</p>\
                 <p>We received a request to reset your password. The link below \
                 is valid for 30 minutes and can be used once:</p>\
                 <p><a href=\"{url}\">Reset password</a></p>\
                 <p>If you did not request this, you can ignore this message.</p>"
            )
        }
        "password-changed" => format!(
            "<p>Hi <strong>{name}</strong>,</p>\
             <p>Your password was changed. If this was not you, reset it \
             immediately and contact support.</p>"
        ),
        _ => format!("<p>Hi <strong>{name}</strong>,</p>"),
    }
}

/// SMTP-backed notifier.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    pub fn from_config(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("smtp transport")?
            .port(cfg.port)
            .credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        data: serde_json::Value,
    ) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("parse from address")?)
            .to(to.parse().context("parse to address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(render(template, &data))
            .context("build message")?;

        self.transport.send(message).await.context("smtp send")?;
        info!(%to, template, "mail sent");
        Ok(())
    }
}
