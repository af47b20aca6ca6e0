//! Runs one agent session from a settings file.
//!
//! Usage:
//!
//! ```text
//! switchboard [settings-path]
//! ```
//!
//! Without an argument the path comes from `SWITCHBOARD_CONFIG`, else
//! `switchboard.yaml` in the working directory. When that default file does
//! not exist the session starts with no servers and the `passthrough` model.
//! Logs go to stderr and are filtered by `RUST_LOG`, falling back to the
//! configured `logger.level`.

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use std::sync::Arc;
use switchboard::SharedClock;
use switchboard::config::{CONFIG_PATH_ENV, Settings, resolve_settings_path};
use switchboard::model::adapters::backend_for;
use switchboard::session::adapters::{ConsoleInterface, cancel_on_ctrl_c};
use switchboard::session::domain::SessionFatalError;
use switchboard::session::services::Session;
use switchboard::tool_registry::adapters::DefaultConnector;
use switchboard::tool_registry::services::ConnectionPool;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let argument = std::env::args().nth(1);
    let (settings, source) = load_settings(argument.as_deref())?;
    install_logging(&settings.log_filter()?);
    source.as_ref().map_or_else(
        || warn!("no settings file found; using defaults"),
        |path| info!(%path, "settings loaded"),
    );

    let config = settings.session_config()?;
    let descriptors = settings.server_descriptors()?;
    let model = backend_for(config.model(), &settings.provider_settings())?;
    let clock: SharedClock = Arc::new(DefaultClock);

    let pool = ConnectionPool::connect(
        descriptors,
        Arc::new(DefaultConnector),
        Arc::clone(&clock),
        settings.retry_policy(),
    )
    .await
    .map_err(SessionFatalError::from)?;

    let mut session = Session::new(
        config,
        Arc::new(pool),
        model,
        Arc::new(ConsoleInterface::new()),
        clock,
    )?;
    let ctrl_c = cancel_on_ctrl_c(session.cancellation_token());
    let outcome = session.run().await;
    ctrl_c.abort();

    match outcome {
        Ok(summary) => {
            info!(
                reason = %summary.reason,
                turns = summary.turns,
                "session finished"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "session ended with a fatal error");
            Err(err.into())
        }
    }
}

/// Loads the settings, returning the file they came from.
fn load_settings(argument: Option<&str>) -> Result<(Settings, Option<Utf8PathBuf>), BoxError> {
    let path = resolve_settings_path(argument, |key| std::env::var(key).ok());
    let explicit = argument.is_some() || std::env::var_os(CONFIG_PATH_ENV).is_some();
    if !explicit && !path.exists() {
        let settings = Settings::default().with_env_overrides(|key| std::env::var(key).ok());
        return Ok((settings, None));
    }
    let settings = Settings::load(&path)?.with_env_overrides(|key| std::env::var(key).ok());
    Ok((settings, Some(path)))
}

fn install_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
