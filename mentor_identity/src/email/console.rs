//! Email sender that writes codes to the log (development only)

use super::{EmailError, EmailSender};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    pub fn new() -> Self {
        Self
    }
}

impl EmailSender for ConsoleEmailSender {
    fn send_verification_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        log::info!("[console email] verification code for {}: {}", email, code);
        Ok(())
    }

    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), EmailError> {
        log::info!("[console email] password reset code for {}: {}", email, code);
        Ok(())
    }
}
