// # janitord - DNS Janitor Daemon
//
// Thin integration layer: reads configuration from the environment, wires
// the Google Cloud collaborators into the reconciliation engine and keeps
// zones converged until signalled.
//
// All reconciliation logic lives in janitor-core; all API logic (auth,
// retries, pagination) lives in janitor-gcp.
//
// The daemon is responsible for:
// 1. Reading and validating configuration
// 2. Initializing logging and the runtime
// 3. Building the provider, desired-state source and publisher
// 4. Enqueueing a reconcile-all message per zone at start and every interval
//    and redelivering messages left unacknowledged
// 5. Draining the engine on SIGTERM/SIGINT
//
// ## Configuration
//
// ### Required
// - `JANITOR_PROJECT`: Google Cloud project owning the managed zones
// - `JANITOR_KEYFILE`: Service-account JSON keyfile
// - `JANITOR_ZONES`: Comma-separated managed-zone names
// - `JANITOR_DESIRED_STATE_PATH`: JSON file `{ "<zone>": [record sets] }`
//
// ### Optional
// - `JANITOR_SCOPES`: Comma-separated auth scopes (default: cloud-platform)
// - `JANITOR_PUBLISHER`: `log` (default, dry run), `cloud-dns` or `pubsub`
// - `JANITOR_PUBSUB_TOPIC`: Topic for the `pubsub` publisher
// - `JANITOR_WORKERS`: Concurrent reconciliations (default: 16)
// - `JANITOR_DRAIN_TIMEOUT_SECS`: Shutdown drain budget (default: 60)
// - `JANITOR_RECONCILE_INTERVAL_SECS`: Full reconciliation period (default: 300)
// - `JANITOR_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export JANITOR_PROJECT=infra-prod
// export JANITOR_KEYFILE=/etc/janitor/service-account.json
// export JANITOR_ZONES=prod-zone,internal-zone
// export JANITOR_DESIRED_STATE_PATH=/var/lib/janitor/desired.json
// export JANITOR_PUBLISHER=cloud-dns
//
// janitord
// ```

use anyhow::Result;
use janitor_core::{
    ChangeRequest, CorrectionPublisher, DeliveryHandle, DesiredStateSource, DnsProvider,
    EngineEvent, FileDesiredStateSource, JanitorConfig, LogPublisher, MemoryTransport,
    PublisherConfig, ReconcileEngine,
};
use janitor_gcp::{CloudDnsChangePublisher, CloudDnsClient, PubsubPublisher};
use std::collections::HashSet;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default period between full reconciliations
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum JanitorExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<JanitorExitCode> for ExitCode {
    fn from(code: JanitorExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings: the library configuration plus daemon-only knobs
#[derive(Debug)]
struct Settings {
    config: JanitorConfig,
    reconcile_interval: Duration,
    log_level: String,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            var(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} is required", name))
        };

        let mut config = JanitorConfig::new(
            required("JANITOR_PROJECT")?,
            required("JANITOR_KEYFILE")?,
            required("JANITOR_DESIRED_STATE_PATH")?,
        );
        config.zones = split_list(&required("JANITOR_ZONES")?);

        if let Some(scopes) = var("JANITOR_SCOPES") {
            config.scopes = split_list(&scopes);
        }

        config.publisher = match var("JANITOR_PUBLISHER").as_deref().unwrap_or("log") {
            "log" => PublisherConfig::Log,
            "cloud-dns" => PublisherConfig::CloudDns,
            "pubsub" => PublisherConfig::Pubsub {
                topic: var("JANITOR_PUBSUB_TOPIC").unwrap_or_default(),
            },
            other => anyhow::bail!(
                "JANITOR_PUBLISHER '{}' is not supported. \
                Supported publishers: log, cloud-dns, pubsub",
                other
            ),
        };

        if let Some(workers) = parse_var(&var, "JANITOR_WORKERS")? {
            config.engine.worker_limit = workers;
        }
        if let Some(secs) = parse_var(&var, "JANITOR_DRAIN_TIMEOUT_SECS")? {
            config.engine.drain_timeout_secs = secs;
        }

        let interval_secs = parse_var(&var, "JANITOR_RECONCILE_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);

        Ok(Self {
            config,
            reconcile_interval: Duration::from_secs(interval_secs),
            log_level: var("JANITOR_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        self.config.validate()?;

        if !(10..=86_400).contains(&self.reconcile_interval.as_secs()) {
            anyhow::bail!(
                "JANITOR_RECONCILE_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                self.reconcile_interval.as_secs()
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "JANITOR_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{} '{}' is not valid: {}", name, value, e))
        })
        .transpose()
}

/// Engine collaborators built from configuration
struct Components {
    provider: Arc<dyn DnsProvider>,
    desired: Arc<dyn DesiredStateSource>,
    publisher: Arc<dyn CorrectionPublisher>,
}

fn build_components(config: &JanitorConfig) -> Result<Components> {
    let api = janitor_gcp::api_client_from_config(config)?;
    let dns = CloudDnsClient::new(api.clone(), &config.project, &config.api.dns_api_version);

    let publisher: Arc<dyn CorrectionPublisher> = match &config.publisher {
        PublisherConfig::Log => {
            warn!("Publisher is 'log': corrections are logged, not applied");
            Arc::new(LogPublisher)
        }
        PublisherConfig::CloudDns => Arc::new(CloudDnsChangePublisher::new(dns.clone())),
        PublisherConfig::Pubsub { topic } => {
            Arc::new(PubsubPublisher::new(api, &config.project, topic))
        }
    };

    Ok(Components {
        provider: Arc::new(dns),
        desired: Arc::new(FileDesiredStateSource::new(&config.desired_state_path)),
        publisher,
    })
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return JanitorExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {}", e);
        return JanitorExitCode::ConfigError.into();
    }

    let log_level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return JanitorExitCode::ConfigError.into();
    }

    info!("Starting janitord");
    info!(
        "Configuration loaded: project {}, {} zone(s), publisher {}",
        settings.config.project,
        settings.config.zones.len(),
        settings.config.publisher.type_name()
    );

    let components = match build_components(&settings.config) {
        Ok(components) => components,
        Err(e) => {
            error!("Startup error: {}", e);
            return JanitorExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return JanitorExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(settings, components).await {
            error!("Daemon error: {}", e);
            JanitorExitCode::RuntimeError
        } else {
            JanitorExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(settings: Settings, components: Components) -> Result<()> {
    let config = settings.config;

    let (engine, mut events) = ReconcileEngine::new(
        components.provider,
        components.desired,
        components.publisher,
        &config.engine,
    )?;

    let transport = MemoryTransport::new();
    let controller = engine.start(Arc::new(transport.clone()));

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(settings.reconcile_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Messages left unacknowledged by a retryable failure
    let mut failed: Vec<DeliveryHandle> = Vec::new();
    // Anything else unacknowledged for a whole interval is redelivered too,
    // covering dropped events and panicked workers
    let ack_deadline = settings.reconcile_interval;

    let signal = loop {
        tokio::select! {
            signal = &mut shutdown => break signal?,
            Some(event) = events.recv() => track_event(event, &mut failed),
            _ = ticker.tick() => {
                enqueue_reconciliation(&transport, &config.zones, &mut failed, ack_deadline)?
            }
        }
    };

    let drain_timeout = config.engine.drain_timeout();
    info!("Received {}, draining for up to {:?}", signal, drain_timeout);

    let report = controller.shutdown(drain_timeout).await?;
    transport.close();

    info!(
        "Shutdown complete: {} finished, {} cancelled, {} left unacknowledged",
        report.completed,
        report.cancelled,
        transport.unacked().len()
    );
    Ok(())
}

fn track_event(event: EngineEvent, failed: &mut Vec<DeliveryHandle>) {
    match event {
        EngineEvent::ReconcileFailed {
            handle,
            retryable: true,
            ..
        } => failed.push(handle),
        EngineEvent::CorrectionPublished {
            request,
            additions,
            deletions,
        } => info!(
            "{}: published {} addition(s), {} deletion(s)",
            request, additions, deletions
        ),
        other => debug!("Engine event: {:?}", other),
    }
}

/// Redeliver failed and expired messages, then enqueue a reconcile-all for
/// every zone without one outstanding
fn enqueue_reconciliation(
    transport: &MemoryTransport,
    zones: &[String],
    failed: &mut Vec<DeliveryHandle>,
    ack_deadline: Duration,
) -> Result<()> {
    for handle in failed.drain(..) {
        if transport.redeliver(&handle) {
            debug!("Redelivering message {}", handle);
        }
    }

    let expired = transport.redeliver_expired(ack_deadline);
    if expired > 0 {
        warn!("Redelivering {} message(s) unacknowledged past {:?}", expired, ack_deadline);
    }

    let outstanding: HashSet<String> = transport
        .unacked()
        .iter()
        .filter_map(|message| message.parse().ok())
        .map(|request| request.zone)
        .collect();

    for zone in zones {
        if outstanding.contains(zone) {
            debug!("Reconciliation of zone {} still outstanding, not enqueueing", zone);
            continue;
        }
        transport.publish(ChangeRequest::all(zone.as_str()).to_json())?;
        debug!("Enqueued reconciliation of zone {}", zone);
    }
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
