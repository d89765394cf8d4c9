use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;

/// Outbound mail seam. Callers fire-and-forget; no delivery confirmation is
/// surfaced past this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| anyhow::anyhow!("invalid SMTP from address: {e}"))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .port(config.port)
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body_html: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse::<Mailbox>()
                .map_err(|e| anyhow::anyhow!("invalid recipient address: {e}"))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body_html.to_string())?;
        self.transport.send(email).await?;
        info!(%to, %subject, "email sent");
        Ok(())
    }
}

/// Stand-in used when SMTP is not configured: the send is logged and dropped.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body_html: &str) -> anyhow::Result<()> {
        info!(%to, %subject, "SMTP not configured, dropping outbound email");
        Ok(())
    }
}

/// Verification email sent after registration. The code travels as a link
/// back into the verify endpoint.
pub fn verification_email(base_url: &str, code: &str) -> (String, String) {
    let verification_url = format!("{base_url}/account/verify?code={code}");
    let body = format!(
        "<h1>Verify your account</h1>\n\
         <p>Please click the following link to verify your account</p>\n\
         <a href=\"{verification_url}\">Verify Account</a>\n\
         <p>If you can't click the link above, please copy and paste the following link into your browser</p>\n\
         <p>{verification_url}</p>"
    );
    ("Verify your email address".to_string(), body)
}

/// Password reset email carrying the reset code.
pub fn password_reset_email(code: &str) -> (String, String) {
    let body = format!(
        "<h1>Reset your password</h1>\n\
         <p>A password reset was requested for your account. Use the following code to choose a new password:</p>\n\
         <p>{code}</p>\n\
         <p>If you did not request this reset, please ignore this email.</p>"
    );
    ("Password reset request".to_string(), body)
}
