//! # Link Service
//!
//! [`VibraLink`] wires the engine together for one host: the state machine,
//! the reconnect supervisor, the session manager and the telemetry engine,
//! each constructed explicitly and owned here. Dropping the service stops
//! every background task.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::connection::{ConnectionState, RemoteDevice, StateMachine};
use crate::reconnect::ReconnectSupervisor;
use crate::session::SessionManager;
use crate::telemetry::{LogEntry, SensorData, StreamStats, TelemetryEngine};
use crate::transport::{LinkPermissions, Transport};

#[derive(Debug)]
pub struct VibraLink {
    config: Config,
    state: Arc<StateMachine>,
    session: Arc<SessionManager>,
    telemetry: Arc<TelemetryEngine>,
}

impl VibraLink {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        permissions: Arc<dyn LinkPermissions>,
    ) -> Self {
        let state = Arc::new(StateMachine::new());
        let supervisor = ReconnectSupervisor::new(&config.reconnect, state.clone());
        let session = SessionManager::new(
            config.link.clone(),
            transport,
            permissions,
            state.clone(),
            supervisor,
        );
        let telemetry = TelemetryEngine::new(config.telemetry.clone(), session.clone());

        Self {
            config,
            state,
            session,
            telemetry,
        }
    }

    /// Start the telemetry consumer; call once the runtime is up
    pub fn start(&self) {
        self.telemetry.start();
        info!("Link service started");
    }

    /// Stop every background task and close the session
    pub fn stop(&self) {
        self.session.disconnect();
        self.telemetry.stop();
        info!("Link service stopped");
    }

    pub fn connect(&self, device: RemoteDevice) {
        self.session.connect(device);
    }

    /// Connect to the device named in `[link]`
    pub fn connect_configured(&self) {
        self.connect(self.configured_device());
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    pub fn configured_device(&self) -> RemoteDevice {
        RemoteDevice::new(self.config.link.device.clone(), self.config.link.label.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.observe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.state.current()
    }

    pub fn snapshot(&self) -> watch::Receiver<SensorData> {
        self.telemetry.snapshot()
    }

    pub fn logs(&self) -> watch::Receiver<Vec<LogEntry>> {
        self.telemetry.logs()
    }

    pub fn raw_frames(&self) -> watch::Receiver<String> {
        self.telemetry.raw_frames()
    }

    pub fn stats(&self) -> watch::Receiver<StreamStats> {
        self.telemetry.stats()
    }

    /// Command helpers and log control
    pub fn telemetry(&self) -> &Arc<TelemetryEngine> {
        &self.telemetry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for VibraLink {
    fn drop(&mut self) {
        self.stop();
    }
}
