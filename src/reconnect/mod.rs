//! # Reconnect Supervisor
//!
//! Background loop that brings the link back after a transient drop.
//!
//! Every interval it looks at the connection state. Only when the state is
//! exactly `Disconnected` and a device has been remembered does it move to
//! `Connecting` and ask its [`Reconnector`] for a new session. `Error` states
//! are left alone: they need outside action. A revoked connect permission
//! stops the loop for good, since polling cannot bring it back.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::connection::{ConnectionState, RemoteDevice, StateMachine};

/// Whatever can open a new session for the supervisor
pub trait Reconnector: Send + Sync {
    /// Connect permission is still granted
    fn can_connect(&self) -> bool;

    /// Start a session to `device` for the loop started as `epoch`
    ///
    /// The state is already `Connecting`. The session must be dropped
    /// unless [`ReconnectSupervisor::is_live`] still holds for `epoch` when
    /// it is established.
    fn reconnect(&self, device: RemoteDevice, epoch: u64);
}

/// Outcome of one supervisor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Idle,
    Attempted,
    Stop,
    Cancelled,
}

/// Auto-reconnect loop for the single remembered device
#[derive(Debug)]
pub struct ReconnectSupervisor {
    enabled: bool,
    interval: Duration,
    state: Arc<StateMachine>,
    last_device: Mutex<Option<RemoteDevice>>,
    task: Mutex<Option<(u64, JoinHandle<()>)>>,
    epoch: AtomicU64,
}

impl ReconnectSupervisor {
    pub fn new(config: &ReconnectConfig, state: Arc<StateMachine>) -> Arc<Self> {
        Arc::new(Self {
            enabled: config.enabled,
            interval: config.interval(),
            state,
            last_device: Mutex::new(None),
            task: Mutex::new(None),
            epoch: AtomicU64::new(0),
        })
    }

    /// Remember `device` as the reconnect target, replacing any previous one
    pub fn remember(&self, device: RemoteDevice) {
        debug!("Remembering device: {}", device.address);
        *self.last_device.lock() = Some(device);
    }

    /// The remembered device, if any
    pub fn remembered(&self) -> Option<RemoteDevice> {
        self.last_device.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Start the loop; a second call while running is a no-op
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>, target: Weak<dyn Reconnector>) {
        if !self.enabled {
            debug!("Auto-reconnect disabled by configuration");
            return;
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            debug!("Reconnect supervisor already running");
            return;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let handle = tokio::spawn(supervise(Arc::downgrade(self), target, epoch));
        *task = Some((epoch, handle));
        info!("Auto-reconnect started (every {:?})", self.interval);
    }

    /// The loop started as `epoch` has not been stopped
    pub fn is_live(&self, epoch: u64) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|(current, _)| *current == epoch)
    }

    /// Cancel the loop; safe to call when not running
    pub fn stop(&self) {
        if let Some((_, handle)) = self.task.lock().take() {
            handle.abort();
            info!("Auto-reconnect stopped");
        }
    }

    fn tick(&self, target: &dyn Reconnector, epoch: u64) -> Tick {
        if self.state.current() != ConnectionState::Disconnected {
            return Tick::Idle;
        }
        let Some(device) = self.remembered() else {
            return Tick::Idle;
        };
        if !target.can_connect() {
            warn!("Connect permission revoked, stopping auto-reconnect");
            return Tick::Stop;
        }

        // A stop() that raced this tick wins; it holds the same lock
        let task = self.task.lock();
        if !task.as_ref().is_some_and(|(current, _)| *current == epoch) {
            return Tick::Cancelled;
        }
        info!("Attempting reconnect to {}", device.label());
        self.state.transition(ConnectionState::Connecting {
            device_label: device.label().to_string(),
        });
        drop(task);

        target.reconnect(device, epoch);
        Tick::Attempted
    }

    /// Forget the task handle if it still belongs to `epoch`
    fn retire(&self, epoch: u64) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|(current, _)| *current == epoch) {
            task.take();
        }
    }
}

async fn supervise(this: Weak<ReconnectSupervisor>, target: Weak<dyn Reconnector>, epoch: u64) {
    loop {
        let Some(interval) = this.upgrade().map(|supervisor| supervisor.interval) else {
            return;
        };
        tokio::time::sleep(interval).await;

        let (Some(supervisor), Some(target)) = (this.upgrade(), target.upgrade()) else {
            return;
        };
        match supervisor.tick(target.as_ref(), epoch) {
            Tick::Stop => {
                supervisor.retire(epoch);
                info!("Auto-reconnect stopped");
                return;
            }
            Tick::Cancelled => {
                debug!("Reconnect loop {} cancelled mid-tick", epoch);
                return;
            }
            Tick::Idle | Tick::Attempted => {}
        }
    }
}
