//! Discovery session: browse, probe and register until interrupted

use shelly_core::{DeviceRegistry, RegistryError};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::listener::{Announcement, DiscoveryListener};
use crate::mdns::{MdnsBrowser, SHELLY_SERVICE_TYPE};
use crate::probe::DeviceProber;

/// Default capacity of the announcement queue between browser and listener
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Lifecycle of a discovery session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet browsing
    Idle,
    /// Browsing and handling announcements
    Browsing,
    /// Stopped after an interrupt or a fatal error
    Terminated,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Registry file
    pub registry_path: PathBuf,
    /// Service type to browse
    pub service_type: String,
    /// Per-request probe timeout (`None` = no timeout)
    pub probe_timeout: Option<Duration>,
    /// Announcement queue capacity
    pub channel_capacity: usize,
}

impl SessionConfig {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            service_type: SHELLY_SERVICE_TYPE.to_string(),
            probe_timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A foreground discovery run
pub struct DiscoverySession {
    config: SessionConfig,
    state: SessionState,
}

impl DiscoverySession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run until Ctrl-C (or SIGTERM on Unix)
    pub async fn run(&mut self) -> Result<(), SessionError> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let result = self.browse(shutdown).await;
        self.transition(SessionState::Terminated);
        result
    }

    async fn browse<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        let registry = DeviceRegistry::load(&self.config.registry_path)?;
        let prober = DeviceProber::new(self.config.probe_timeout)?;
        let listener = DiscoveryListener::new(prober, registry);

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let browser = MdnsBrowser::start(&self.config.service_type, tx)?;
        self.transition(SessionState::Browsing);
        println!("Discovering... ^C to exit");

        let result = process_announcements(listener, rx, shutdown).await;

        let service_type = browser.service_type().to_string();
        if let Err(e) = browser.shutdown().await {
            warn!(service_type = %service_type, error = %e, "Failed to shut down mDNS browser");
        }

        let listener = result?;
        info!(
            devices = listener.registry().len(),
            path = %listener.registry().path().display(),
            "Discovery finished"
        );
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = ?self.state, to = ?next, "Discovery session state");
        self.state = next;
    }
}

/// Browse for Shelly devices and record them in the registry at
/// `registry_path` until interrupted
pub async fn discover(registry_path: impl Into<PathBuf>) -> Result<(), SessionError> {
    DiscoverySession::new(SessionConfig::new(registry_path))
        .run()
        .await
}

/// Feed announcements to `listener` one at a time until `shutdown` completes
/// or the channel closes
///
/// Announcements are handled strictly in order, so registration always has
/// exclusive access to the registry. A probe still in flight when `shutdown`
/// completes is abandoned; registration itself never awaits, so the registry
/// is never left half-written.
pub async fn process_announcements<F>(
    mut listener: DiscoveryListener,
    mut rx: mpsc::Receiver<Announcement>,
    shutdown: F,
) -> Result<DiscoveryListener, SessionError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            next = rx.recv() => {
                let Some(announcement) = next else {
                    warn!("Announcement channel closed");
                    break;
                };
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        info!("Shutdown requested while probing");
                        break;
                    }
                    handled = listener.on_service_announced(&announcement) => {
                        handled?;
                    }
                }
            }
        }
    }

    Ok(listener)
}

/// Wait for Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
