//! Walk an email address through code verification, registration, login
//! and refresh with every dependency in memory.
//!
//! ```text
//! cargo run -p mentor_identity --example registration_flow
//! ```

use mentor_identity::auth::{CredentialIssuer, PasswordHasher, TokenService};
use mentor_identity::db::InMemoryCredentialRepository;
use mentor_identity::email::ConsoleEmailSender;
use mentor_identity::identifier::classify;
use mentor_identity::upstream::InMemoryIdentityProvider;
use mentor_identity::verification::{
    EmailCodeProvider, InMemoryVerificationStore, VerificationBroker, VerificationConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let credentials = Arc::new(InMemoryCredentialRepository::new());
    let tokens = TokenService::new("example_secret_that_is_long_enough_123");

    let broker = VerificationBroker::new(
        Arc::new(InMemoryVerificationStore::new()),
        credentials.clone(),
        VerificationConfig::default(),
    )
    .with_provider(Arc::new(
        EmailCodeProvider::new(Arc::new(ConsoleEmailSender::new())).with_code_generator(|| "1234".into()),
    ));

    let issuer = CredentialIssuer::new(
        credentials,
        Arc::new(InMemoryIdentityProvider::new()),
        PasswordHasher::new("example-pepper"),
        tokens.clone(),
    );

    let email = classify("Mentor@Example.com")?;
    println!("Classified {:?} as {}", email.raw(), email.kind());

    let dispatch = broker.request_code(&email).await?;
    println!("Code sent, valid until {}", dispatch.expires_at);

    let verified = broker.check_code(&email, "1234").await?;
    let issued = issuer
        .register_with_password(&verified.identifier, "Password123", "Password123")
        .await?;
    println!("Registered credential {}", issued.credential.id);

    let login = issuer.login_with_password(&email, "Password123").await?;
    let claims = tokens.verify(&login.token)?;
    println!("Logged in as {} ({})", claims.sub, claims.role.as_str());

    let refreshed = issuer.refresh(&login.token)?;
    println!("Refreshed token expires {}", refreshed.expires_at);

    Ok(())
}
