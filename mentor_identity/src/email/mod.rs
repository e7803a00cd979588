//! Outbound email for verification codes.

pub mod console;
pub mod smtp;

pub use console::ConsoleEmailSender;
pub use smtp::{SmtpConfig, SmtpEmailSender};

use thiserror::Error;

/// Email delivery failures
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Delivers code emails.
///
/// Implementations block; async callers should go through
/// `tokio::task::spawn_blocking`.
pub trait EmailSender: Send + Sync {
    /// Send a sign-up verification code
    fn send_verification_code(&self, email: &str, code: &str) -> Result<(), EmailError>;

    /// Send a password reset code
    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), EmailError>;
}
