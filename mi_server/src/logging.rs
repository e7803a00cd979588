//! Structured logging configuration.
//!
//! Records emitted by the identity library through the `log` facade are
//! forwarded into the same subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG`, defaulting to `info,sqlx=warn,hyper=warn`.
///
/// # Example
///
/// ```no_run
/// use mi_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // `init` also installs the `log` to `tracing` bridge.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// Identifiers are masked before they reach the log.
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `identifier` - Optional email or phone number the event concerns
/// * `request_id` - Optional request correlation id
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use mi_server::logging::log_security_event;
///
/// log_security_event(
///     "code_lockout",
///     Some("+15551234567"),
///     None,
///     "Pending verification discarded after repeated wrong codes",
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    identifier: Option<&str>,
    request_id: Option<&str>,
    message: &str,
) {
    let masked = identifier.map(mask_identifier);
    tracing::warn!(
        event_type = event_type,
        identifier = masked.as_deref(),
        request_id = request_id,
        "SECURITY: {}",
        message
    );
}

/// Keep the first character and the domain (or the last two digits).
fn mask_identifier(identifier: &str) -> String {
    match identifier.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().unwrap_or('*');
            format!("{}***@{}", first, domain)
        }
        None => {
            let tail: String = identifier
                .chars()
                .rev()
                .take(2)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("***{}", tail)
        }
    }
}
