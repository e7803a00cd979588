//! Assembles stores, providers and services from a [`ServerConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use mentor_identity::{
    CredentialIssuer, VerificationBroker,
    auth::{PasswordHasher, TokenService},
    db::{CredentialRepository, Database, InMemoryCredentialRepository, PgCredentialRepository},
    email::{ConsoleEmailSender, EmailSender, SmtpEmailSender},
    upstream::{FirebaseIdentityProvider, IdentityProvider, InMemoryIdentityProvider},
    verification::{
        CodeProvider, EmailCodeProvider, InMemoryVerificationStore, PgVerificationStore,
        TwilioVerifyProvider, VerificationStore,
    },
};

use crate::api::{AppState, rate_limiter::RequestThrottle};
use crate::config::{ServerConfig, StorageConfig};

/// Build the application state, connecting to and migrating the database
/// when one is configured.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let (database, credentials, store): (
        Option<Arc<Database>>,
        Arc<dyn CredentialRepository>,
        Arc<dyn VerificationStore>,
    ) = match &config.storage {
        StorageConfig::Postgres(db_config) => {
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            info!("Database connected and migrated");

            let pool = db.pool().clone();
            (
                Some(Arc::new(db)),
                Arc::new(PgCredentialRepository::new(pool.clone())),
                Arc::new(PgVerificationStore::new(pool)),
            )
        }
        StorageConfig::Memory => {
            warn!("Using in-memory stores; all data is lost on restart");
            (
                None,
                Arc::new(InMemoryCredentialRepository::new()),
                Arc::new(InMemoryVerificationStore::new()),
            )
        }
    };

    let upstream: Arc<dyn IdentityProvider> = match &config.firebase {
        Some(firebase) => Arc::new(
            FirebaseIdentityProvider::new(firebase.clone(), config.upstream_timeout)
                .context("Failed to build Firebase client")?,
        ),
        None => {
            warn!("FIREBASE_API_KEY not set; using in-memory identity provider");
            Arc::new(InMemoryIdentityProvider::new())
        }
    };

    let sender: Arc<dyn EmailSender> = match &config.smtp {
        Some(smtp) => Arc::new(
            SmtpEmailSender::new(smtp.clone()).context("Failed to build SMTP transport")?,
        ),
        None => {
            warn!("SMTP not configured; verification codes are written to the log");
            Arc::new(ConsoleEmailSender::new())
        }
    };

    let sms: Option<Arc<dyn CodeProvider>> = match &config.twilio {
        Some(twilio) => Some(Arc::new(
            TwilioVerifyProvider::new(twilio.clone(), config.upstream_timeout)
                .context("Failed to build Twilio client")?,
        )),
        None => {
            warn!("Twilio not configured; phone verification is disabled");
            None
        }
    };

    let tokens = TokenService::new(&config.security.jwt_secret).with_access_token_duration(
        chrono::Duration::seconds(config.security.access_token_ttl_secs),
    );
    let hasher = PasswordHasher::new(config.security.password_pepper.clone());

    Ok(assemble(
        Services {
            credentials,
            store,
            upstream,
            email: Arc::new(EmailCodeProvider::new(sender)),
            sms,
            tokens,
            hasher,
        },
        config,
        database,
    ))
}

/// Everything the HTTP layer needs, before it is tied together
pub struct Services {
    pub credentials: Arc<dyn CredentialRepository>,
    pub store: Arc<dyn VerificationStore>,
    pub upstream: Arc<dyn IdentityProvider>,
    pub email: Arc<dyn CodeProvider>,
    pub sms: Option<Arc<dyn CodeProvider>>,
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
}

/// Tie services into an [`AppState`]
pub fn assemble(
    services: Services,
    config: &ServerConfig,
    database: Option<Arc<Database>>,
) -> AppState {
    let mut broker = VerificationBroker::new(
        services.store,
        services.credentials.clone(),
        config.verification.clone(),
    )
    .with_provider(services.email);
    if let Some(sms) = services.sms {
        broker = broker.with_provider(sms);
    }

    let issuer = CredentialIssuer::new(
        services.credentials,
        services.upstream,
        services.hasher,
        services.tokens,
    );

    AppState {
        issuer: Arc::new(issuer),
        broker: Arc::new(broker),
        throttle: Arc::new(RequestThrottle::new(
            config.throttle.code_request_limit,
            Duration::from_secs(config.throttle.code_request_window_secs),
        )),
        database,
    }
}

/// Periodically drop expired pending verifications and idle throttle keys.
pub fn spawn_maintenance(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match state.broker.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired pending verification(s)", purged),
                Err(e) => warn!("Failed to purge expired verifications: {}", e),
            }

            let pruned = state.throttle.prune().await;
            if pruned > 0 {
                log::debug!("Dropped {} idle throttle key(s)", pruned);
            }
        }
    })
}
