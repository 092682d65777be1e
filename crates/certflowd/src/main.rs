// # certflowd - Certificate Lifecycle Daemon
//
// ⚠️ ARCHITECTURAL CONSTRAINTS ⚠️
//
// - This is a THIN integration layer ONLY
// - DO NOT add certificate, DNS or dedup logic here
// - All lifecycle logic MUST be in certflow-core
// - Configuration is via environment variables ONLY
//
// The certflowd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the AWS adapters into the lifecycle engine
// 4. Serving Lambda invocations
//
// ## Invocations
//
// One function serves both entry points; the payload tells them apart:
//
// - A notification batch (`Records[0].EventSource == "aws:sns"`) carries
//   lifecycle events and is processed by `LifecycleEngine::handle_batch`.
//   The function returns `null`.
// - Anything else is an issuance-check step sent by the state machine. The
//   annotated event (`IsCertificateIssued`, `Round`) is returned to it.
//
// ## Configuration
//
// ### Required
// - `CERTFLOW_STATE_MACHINE_ARN`: State machine driving the issuance wait
//
// ### Optional
// - `CERTFLOW_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
// - `CERTFLOW_PARAMETER_PREFIX`: Prefix of the dedup markers (default: /certflow)
// - `CERTFLOW_PARAMETER_FILE`: Absolute path of a JSON file holding the dedup
//   markers instead of SSM (local runtime emulators, single-host runs)
// - `CERTFLOW_ISSUANCE_MAX_ROUNDS`: Rounds of the issuance wait (default: 60)
// - `CERTFLOW_PROPAGATION_MAX_ROUNDS`: Polls of a DNS change (default: 60)
// - `CERTFLOW_PROPAGATION_POLL_INTERVAL_SECS`: Seconds between those polls (default: 3)
// - `CERTFLOW_VALIDATION_MAX_ROUNDS`: Describes while waiting for validation options (default: 60)
// - `CERTFLOW_VALIDATION_POLL_INTERVAL_SECS`: Seconds between those describes (default: 3)
// - `CERTFLOW_RECORD_TTL`: TTL of published records (default: 300)
//
// AWS credentials and region come from the standard AWS environment.
//
// ## Example
//
// ```bash
// export CERTFLOW_STATE_MACHINE_ARN=arn:aws:states:eu-west-1:123456789012:stateMachine:certflow-wait
// export CERTFLOW_LOG_LEVEL=debug
//
// certflowd
// ```

use anyhow::Result;
use certflow_core::event::{is_notification_batch, parse_notification_batch};
use certflow_core::state::FileParameterStore;
use certflow_core::traits::ParameterStore;
use certflow_core::{CertflowConfig, LifecycleEngine, LifecycleEvent, NotificationRecord};
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CertflowExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CertflowExitCode> for ExitCode {
    fn from(code: CertflowExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    state_machine_arn: String,
    log_level: String,
    parameter_file: Option<PathBuf>,
    engine: CertflowConfig,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut engine = CertflowConfig::new();

        if let Some(prefix) = lookup("CERTFLOW_PARAMETER_PREFIX") {
            engine.dedup.parameter_prefix = prefix;
        }
        if let Some(rounds) = parse_var(&lookup, "CERTFLOW_ISSUANCE_MAX_ROUNDS")? {
            engine.issuance.max_rounds = rounds;
        }
        if let Some(rounds) = parse_var(&lookup, "CERTFLOW_PROPAGATION_MAX_ROUNDS")? {
            engine.propagation.max_rounds = rounds;
        }
        if let Some(secs) = parse_var(&lookup, "CERTFLOW_PROPAGATION_POLL_INTERVAL_SECS")? {
            engine.propagation.poll_interval_secs = secs;
        }
        if let Some(rounds) = parse_var(&lookup, "CERTFLOW_VALIDATION_MAX_ROUNDS")? {
            engine.validation_options.max_rounds = rounds;
        }
        if let Some(secs) = parse_var(&lookup, "CERTFLOW_VALIDATION_POLL_INTERVAL_SECS")? {
            engine.validation_options.poll_interval_secs = secs;
        }
        if let Some(ttl) = parse_var(&lookup, "CERTFLOW_RECORD_TTL")? {
            engine.records.ttl = ttl;
        }

        Ok(Self {
            state_machine_arn: lookup("CERTFLOW_STATE_MACHINE_ARN").unwrap_or_default(),
            log_level: lookup("CERTFLOW_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            parameter_file: lookup("CERTFLOW_PARAMETER_FILE")
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from),
            engine,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.state_machine_arn.is_empty() {
            anyhow::bail!(
                "CERTFLOW_STATE_MACHINE_ARN is required. \
                Set it via: export CERTFLOW_STATE_MACHINE_ARN=arn:aws:states:..."
            );
        }
        if !self.state_machine_arn.starts_with("arn:") || !self.state_machine_arn.contains(":states:") {
            anyhow::bail!(
                "CERTFLOW_STATE_MACHINE_ARN must be a Step Functions state machine ARN. Got: {}",
                self.state_machine_arn
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CERTFLOW_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if let Some(path) = &self.parameter_file {
            if !path.is_absolute() {
                anyhow::bail!(
                    "CERTFLOW_PARAMETER_FILE must be an absolute path. Got: {}",
                    path.display()
                );
            }
        }

        self.engine.validate()?;
        Ok(())
    }

    /// Local marker store replacing SSM, when one is configured
    async fn local_parameter_store(&self) -> Result<Option<Arc<dyn ParameterStore>>> {
        let Some(path) = &self.parameter_file else {
            return Ok(None);
        };
        let store = FileParameterStore::new(path).await?;
        info!(path = %path.display(), "Dedup markers kept in a local file");
        Ok(Some(Arc::new(store)))
    }

    fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Parse an optional numeric variable; a malformed value is an error
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} is not a valid number ('{}'): {}", name, raw, e))
        })
        .transpose()
}

/// What one Lambda invocation asks for
#[derive(Debug)]
enum Invocation {
    /// Lifecycle events from the notification bus
    Notifications(Vec<NotificationRecord>),
    /// One round of the issuance wait
    IssuanceCheck(Box<LifecycleEvent>),
}

impl Invocation {
    fn from_payload(payload: Value) -> Result<Self> {
        if is_notification_batch(&payload) {
            Ok(Self::Notifications(parse_notification_batch(&payload)?))
        } else {
            Ok(Self::IssuanceCheck(Box::new(serde_json::from_value(payload)?)))
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CertflowExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CertflowExitCode::ConfigError.into();
    }

    // CloudWatch does not render ANSI colors
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.tracing_level())
        .with_ansi(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CertflowExitCode::ConfigError.into();
    }

    info!("Starting certflowd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CertflowExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            CertflowExitCode::RuntimeError
        } else {
            CertflowExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let sdk_config = certflow_provider_aws::load_sdk_config().await;
    let mut collaborators =
        certflow_provider_aws::collaborators(&sdk_config, config.state_machine_arn.as_str())?;
    if let Some(store) = config.local_parameter_store().await? {
        collaborators.parameters = store;
    }

    let (engine, mut events) = LifecycleEngine::new(collaborators, config.engine)?;
    let engine = Arc::new(engine);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Engine event");
        }
    });

    info!(state_machine = %config.state_machine_arn, "Lifecycle engine ready");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let engine = Arc::clone(&engine);
        async move { handle_invocation(&engine, event.payload).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("Lambda runtime error: {}", e))
}

/// Serve one invocation
async fn handle_invocation(
    engine: &LifecycleEngine,
    payload: Value,
) -> Result<Value, lambda_runtime::Error> {
    match Invocation::from_payload(payload)? {
        Invocation::Notifications(records) => {
            debug!(records = records.len(), "Notification batch");
            engine.handle_batch(&records).await?;
            Ok(Value::Null)
        }
        Invocation::IssuanceCheck(event) => {
            let event = engine.check_issuance(*event).await?;
            Ok(serde_json::to_value(event)?)
        }
    }
}
