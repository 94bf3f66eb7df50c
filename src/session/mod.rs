//! # Session Module
//!
//! Owns the one live byte-stream session to the survey device.
//!
//! This module handles:
//! - Connect preconditions and the bounded channel open
//! - One read loop and one paced write loop per session
//! - Teardown on remote close, I/O failure or a local `disconnect()`
//! - Publishing every decoded frame to subscribers
//!
//! Every session carries a generation number. A connect attempt or loop that
//! finishes after a newer session (or a disconnect) took over finds its
//! generation outdated and leaves the current state alone. Attempts made by
//! the reconnect supervisor also carry the epoch of the loop that asked, and
//! are dropped once that loop has been stopped.

mod reader;
mod writer;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::LinkConfig;
use crate::connection::{ConnectionState, RemoteDevice, StateMachine};
use crate::error::{Result, VibraError};
use crate::protocol::{decode_frame, Command, Frame};
use crate::reconnect::{ReconnectSupervisor, Reconnector};
use crate::transport::{BoxedReader, BoxedWriter, Channel, LinkPermissions, Transport};

use reader::ReadEnd;

/// Smallest read buffer the read loop runs with
const MIN_READ_BUFFER: usize = 64;

pub const TRANSPORT_UNAVAILABLE: &str = "Link transport not available on this device";
pub const TRANSPORT_DISABLED: &str = "Please enable the link transport first";
pub const PERMISSIONS_REQUIRED: &str = "Link permissions required";
pub const PERMISSIONS_MISSING: &str = "Missing link permissions";
pub const PERMISSION_LOST_WHILE_SENDING: &str = "Lost link permission while sending";

/// One frame as received: the trimmed line and its decoded form
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub line: String,
    pub frame: Frame,
}

impl InboundFrame {
    pub fn decode(line: String) -> Self {
        let frame = decode_frame(&line);
        Self { line, frame }
    }
}

struct ActiveSession {
    generation: u64,
    device: RemoteDevice,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    /// Cleared by either loop once the stream is known dead
    alive: Arc<AtomicBool>,
}

impl ActiveSession {
    fn close(self) {
        self.alive.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);
        debug!("Closed session to {}", self.device.label());
    }
}

/// Connects, runs and tears down sessions
pub struct SessionManager {
    config: LinkConfig,
    transport: Arc<dyn Transport>,
    permissions: Arc<dyn LinkPermissions>,
    state: Arc<StateMachine>,
    supervisor: Arc<ReconnectSupervisor>,
    frames: broadcast::Sender<InboundFrame>,
    active: Mutex<Option<ActiveSession>>,
    connect_task: Mutex<Option<JoinHandle<()>>>,
    connecting: AtomicBool,
    connected: AtomicBool,
    generation: AtomicU64,
    this: Weak<SessionManager>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state.current())
            .field("connecting", &self.connecting.load(Ordering::Relaxed))
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        mut config: LinkConfig,
        transport: Arc<dyn Transport>,
        permissions: Arc<dyn LinkPermissions>,
        state: Arc<StateMachine>,
        supervisor: Arc<ReconnectSupervisor>,
    ) -> Arc<Self> {
        if config.frame_buffer == 0 {
            warn!("frame_buffer of 0 raised to 1");
            config.frame_buffer = 1;
        }
        if config.read_buffer_size < MIN_READ_BUFFER {
            warn!(
                "read_buffer_size of {} raised to {}",
                config.read_buffer_size, MIN_READ_BUFFER
            );
            config.read_buffer_size = MIN_READ_BUFFER;
        }

        let (frames, _) = broadcast::channel(config.frame_buffer);
        Arc::new_cyclic(|this| Self {
            config,
            transport,
            permissions,
            state,
            supervisor,
            frames,
            active: Mutex::new(None),
            connect_task: Mutex::new(None),
            connecting: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Connect to `device`
    ///
    /// Ignored while already `Connecting` or `Connected`. A missing
    /// precondition publishes `Error` and returns without touching the
    /// transport. The open itself runs in the background; its outcome is
    /// published on the state stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, device: RemoteDevice) {
        let current = self.state.current();
        if current.is_active() {
            debug!("Ignoring connect request while {}", current);
            return;
        }

        if !self.transport.is_available() {
            error!("{}", TRANSPORT_UNAVAILABLE);
            self.state.transition(ConnectionState::error(TRANSPORT_UNAVAILABLE));
            return;
        }
        if !self.transport.is_enabled() {
            warn!("{}", TRANSPORT_DISABLED);
            self.state.transition(ConnectionState::error(TRANSPORT_DISABLED));
            return;
        }
        if !self.permissions.can_connect() || !self.permissions.can_scan() {
            warn!("{}", PERMISSIONS_REQUIRED);
            self.state.transition(ConnectionState::error(PERMISSIONS_REQUIRED));
            return;
        }

        self.state.transition(ConnectionState::Connecting {
            device_label: device.label().to_string(),
        });
        self.establish(device, None);
    }

    /// Queue `command` for the write loop
    ///
    /// # Errors
    ///
    /// Returns `VibraError::NotConnected` when there is no live session. The
    /// command is dropped, never buffered for a later session.
    pub fn send_command(&self, command: Command) -> Result<()> {
        let active = self.active.lock();
        match active.as_ref() {
            Some(session)
                if self.connected.load(Ordering::Acquire)
                    && session.alive.load(Ordering::Acquire) =>
            {
                session
                    .commands
                    .send(command)
                    .map_err(|_| VibraError::NotConnected)
            }
            _ => {
                warn!("Not connected, dropping command: {}", command);
                Err(VibraError::NotConnected)
            }
        }
    }

    /// Close the session, cancel any pending connect and stop auto-reconnect
    pub fn disconnect(&self) {
        // First, so a supervisor tick already in flight cannot start a session
        self.supervisor.stop();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.connect_task.lock().take() {
            task.abort();
        }
        self.connecting.store(false, Ordering::Release);
        self.close_active();
        if self.state.transition(ConnectionState::Disconnected) {
            info!("Disconnected");
        }
    }

    /// A session exists, is flagged connected and its stream is still alive
    pub fn is_connected(&self) -> bool {
        let active = self.active.lock();
        active
            .as_ref()
            .is_some_and(|session| session.alive.load(Ordering::Acquire))
            && self.connected.load(Ordering::Acquire)
    }

    /// Device of the live session
    pub fn device(&self) -> Option<RemoteDevice> {
        self.active.lock().as_ref().map(|session| session.device.clone())
    }

    /// Receive every frame decoded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<InboundFrame> {
        self.frames.subscribe()
    }

    pub fn state(&self) -> &Arc<StateMachine> {
        &self.state
    }

    pub fn supervisor(&self) -> &Arc<ReconnectSupervisor> {
        &self.supervisor
    }

    /// Start a background open to `device`; the state is already `Connecting`
    ///
    /// `epoch` is set when the reconnect supervisor asked for the attempt.
    fn establish(&self, device: RemoteDevice, epoch: Option<u64>) {
        if epoch.is_some_and(|epoch| !self.supervisor.is_live(epoch)) {
            debug!("Reconnect loop stopped, skipping connect to {}", device.label());
            return;
        }
        if self.is_connected() {
            debug!("Already connected, skipping connect to {}", device.label());
            return;
        }
        if self.connecting.swap(true, Ordering::AcqRel) {
            debug!("Connection attempt already in progress");
            return;
        }
        let Some(this) = self.this.upgrade() else {
            self.connecting.store(false, Ordering::Release);
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let handle = tokio::spawn(async move {
            this.open_session(generation, epoch, &device).await;
            if this.generation.load(Ordering::Acquire) == generation {
                this.connecting.store(false, Ordering::Release);
            }
        });
        if let Some(previous) = self.connect_task.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn open_session(
        self: &Arc<Self>,
        generation: u64,
        epoch: Option<u64>,
        device: &RemoteDevice,
    ) {
        if !self.permissions.can_connect() {
            warn!("{}", PERMISSIONS_MISSING);
            self.settle(generation, epoch, ConnectionState::error(PERMISSIONS_MISSING));
            return;
        }
        if self.permissions.can_scan() {
            self.transport.cancel_discovery();
        }
        self.close_active();

        info!("Connecting to {}", device.label());
        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, self.transport.open(device)).await {
            Ok(Ok(channel)) => self.start_session(generation, epoch, device, channel),
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", device.label(), e);
                self.settle(generation, epoch, ConnectionState::Disconnected);
            }
            Err(_) => {
                error!("Connection to {} timed out after {:?}", device.label(), timeout);
                self.settle(
                    generation,
                    epoch,
                    ConnectionState::error(format!("Connection timeout ({}s)", timeout.as_secs())),
                );
            }
        }
    }

    /// The attempt of `generation` has not been overtaken, and the reconnect
    /// loop that asked for it (if any) is still running
    fn is_current(&self, generation: u64, epoch: Option<u64>) -> bool {
        self.generation.load(Ordering::Acquire) == generation
            && epoch.map_or(true, |epoch| self.supervisor.is_live(epoch))
    }

    /// Publish `next` unless a newer attempt or a disconnect took over
    fn settle(&self, generation: u64, epoch: Option<u64>, next: ConnectionState) {
        if self.is_current(generation, epoch) {
            self.state.transition(next);
        } else {
            debug!("Discarding outcome of stale connect attempt: {}", next);
        }
    }

    fn start_session(
        self: &Arc<Self>,
        generation: u64,
        epoch: Option<u64>,
        device: &RemoteDevice,
        channel: Channel,
    ) {
        let (source, sink) = channel.into_split();
        let (commands, queue) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));

        let mut active = self.active.lock();
        if !self.is_current(generation, epoch) {
            debug!("Discarding stale connection to {}", device.label());
            return;
        }

        *active = Some(ActiveSession {
            generation,
            device: device.clone(),
            commands,
            shutdown,
            alive: alive.clone(),
        });
        self.connected.store(true, Ordering::Release);

        self.supervisor.remember(device.clone());
        if epoch.is_none() {
            let target: Weak<dyn Reconnector> = self.this.clone();
            self.supervisor.start(target);
        }

        info!("Connected to {}", device.label());
        self.state.transition(ConnectionState::Connected {
            device_label: device.label().to_string(),
        });

        tokio::spawn(self.clone().read_loop(generation, source, shutdown_rx.clone(), alive.clone()));
        tokio::spawn(self.clone().write_loop(generation, sink, queue, shutdown_rx, alive));
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut source: BoxedReader,
        mut shutdown: watch::Receiver<bool>,
        alive: Arc<AtomicBool>,
    ) {
        let frames = &self.frames;
        let end = reader::pump(&mut source, self.config.read_buffer_size, &mut shutdown, |line| {
            trace!("Received: {}", line);
            // No subscribers is not an error
            let _ = frames.send(InboundFrame::decode(line));
        })
        .await;

        match end {
            ReadEnd::Shutdown => debug!("Read loop stopped"),
            ReadEnd::EndOfStream => {
                info!("Link closed by remote");
                alive.store(false, Ordering::Release);
                self.end_session(generation, ConnectionState::Disconnected);
            }
            ReadEnd::Failed(e) => {
                warn!("Read failed: {}", e);
                alive.store(false, Ordering::Release);
                self.end_session(generation, ConnectionState::Disconnected);
            }
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        generation: u64,
        mut sink: BoxedWriter,
        mut queue: mpsc::UnboundedReceiver<Command>,
        mut shutdown: watch::Receiver<bool>,
        alive: Arc<AtomicBool>,
    ) {
        let pacing = self.config.write_pacing();

        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = queue.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            if !self.connected.load(Ordering::Acquire) || !alive.load(Ordering::Acquire) {
                warn!("Link down, dropping command: {}", command);
                continue;
            }
            if !self.permissions.can_connect() {
                error!("{}", PERMISSION_LOST_WHILE_SENDING);
                self.end_session(generation, ConnectionState::error(PERMISSION_LOST_WHILE_SENDING));
                break;
            }

            debug!("Sending: {}", command);
            if let Err(e) = writer::write_command(&mut sink, &command).await {
                warn!("Write failed: {}", e);
                alive.store(false, Ordering::Release);
                self.end_session(generation, ConnectionState::Disconnected);
                break;
            }

            if pacing > Duration::ZERO {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
        }
        debug!("Write loop stopped");
    }

    /// Tear down the session of `generation` and publish `next`
    fn end_session(&self, generation: u64, next: ConnectionState) {
        let mut active = self.active.lock();
        if !active.as_ref().is_some_and(|session| session.generation == generation) {
            return;
        }
        if let Some(session) = active.take() {
            session.close();
        }
        self.connected.store(false, Ordering::Release);
        self.state.transition(next);
    }

    /// Tear down whatever session is live, without a state change
    fn close_active(&self) {
        let mut active = self.active.lock();
        if let Some(session) = active.take() {
            session.close();
        }
        self.connected.store(false, Ordering::Release);
    }
}

impl Reconnector for SessionManager {
    fn can_connect(&self) -> bool {
        self.permissions.can_connect()
    }

    fn reconnect(&self, device: RemoteDevice, epoch: u64) {
        self.establish(device, Some(epoch));
    }
}
