//! SMTP email sender built on lettre

use lettre::{
    Message, SmtpTransport, Transport, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};

use super::{EmailError, EmailSender};

/// SMTP connection settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// 465 for implicit TLS, 587 for STARTTLS
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: Option<String>,
}

impl SmtpConfig {
    /// Read `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM_EMAIL`
    /// and optionally `SMTP_PORT` (default: 465) and `SMTP_FROM_NAME`.
    ///
    /// Returns `None` unless all required variables are set and non-empty.
    pub fn from_env() -> Option<Self> {
        fn non_empty(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.is_empty())
        }

        Some(Self {
            host: non_empty("SMTP_HOST")?,
            username: non_empty("SMTP_USERNAME")?,
            password: non_empty("SMTP_PASSWORD")?,
            from_email: non_empty("SMTP_FROM_EMAIL")?,
            port: non_empty("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(465),
            from_name: non_empty("SMTP_FROM_NAME"),
        })
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from_email", &self.from_email)
            .finish_non_exhaustive()
    }
}

/// Submission port that upgrades a plain connection with STARTTLS
const STARTTLS_PORT: u16 = 587;

fn uses_starttls(port: u16) -> bool {
    port == STARTTLS_PORT
}

pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: String,
}

impl SmtpEmailSender {
    /// Build the transport. No connection is made until the first send.
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        let builder = if uses_starttls(config.port) {
            SmtpTransport::starttls_relay(&config.host)
        } else {
            SmtpTransport::relay(&config.host)
        };
        let transport = builder
            .map_err(|e| EmailError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        let from = match config.from_name {
            Some(name) => format!("{} <{}>", name, config.from_email),
            None => config.from_email,
        };

        log::info!("SMTP sender configured for {}:{}", config.host, config.port);

        Ok(Self { transport, from })
    }

    fn send(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?,
            )
            .to(to
                .parse()
                .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Message(e.to_string()))?;

        self.transport
            .send(&message)
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(())
    }
}

impl EmailSender for SmtpEmailSender {
    fn send_verification_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        self.send(
            email,
            "Your verification code",
            format!(
                "Your verification code is: {code}\n\n\
                 It expires soon. If you did not sign up, ignore this email."
            ),
        )
    }

    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), EmailError> {
        self.send(
            email,
            "Reset your password",
            format!(
                "Your password reset code is: {code}\n\n\
                 It expires soon. If you did not ask to reset your password, ignore this email."
            ),
        )
    }
}
