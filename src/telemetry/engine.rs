//! # Telemetry Engine
//!
//! Consumes decoded frames from the session, keeps the sensor snapshot, the
//! user-facing log ring, the raw frame stream and the stream statistics, and
//! exposes one helper per device command.
//!
//! All snapshot updates happen on the single consumer task, so observers see
//! them in wire order.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::log_ring::{LogEntry, LogRing};
use super::snapshot::SensorData;
use super::stats::{RateWindow, StreamStats};
use crate::config::TelemetryConfig;
use crate::error::{Result, VibraError};
use crate::protocol::{Ack, Command, Frame};
use crate::session::{InboundFrame, SessionManager};

/// Length an `RS2` frame is cut to in the log
const TELEMETRY_LOG_LEN: usize = 50;

/// Frame rate above which each measurement window is logged
const BUSY_STREAM_FPS: u32 = 10;

/// `text` cut to `max` characters, with `...` when something was cut
fn abbreviate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub struct TelemetryEngine {
    config: TelemetryConfig,
    session: Arc<SessionManager>,
    snapshot: watch::Sender<SensorData>,
    ring: Mutex<LogRing>,
    logs: watch::Sender<Vec<LogEntry>>,
    raw: watch::Sender<String>,
    stats: watch::Sender<StreamStats>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TelemetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEngine")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl TelemetryEngine {
    pub fn new(config: TelemetryConfig, session: Arc<SessionManager>) -> Arc<Self> {
        let ring = LogRing::new(config.log_capacity);
        Arc::new(Self {
            config,
            session,
            snapshot: watch::Sender::new(SensorData::default()),
            ring: Mutex::new(ring),
            logs: watch::Sender::new(Vec::new()),
            raw: watch::Sender::new(String::new()),
            stats: watch::Sender::new(StreamStats::default()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start consuming frames and measuring the stream; idempotent
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            debug!("Telemetry engine already running");
            return;
        }

        let frames = self.session.subscribe();
        tasks.push(tokio::spawn(consume(Arc::downgrade(self), frames)));
        tasks.push(tokio::spawn(monitor(
            Arc::downgrade(self),
            self.config.stats_interval(),
        )));
        info!("Telemetry engine started");
    }

    pub fn stop(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("Telemetry engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().iter().any(|task| !task.is_finished())
    }

    /// Sensor snapshot stream; starts with the current value
    pub fn snapshot(&self) -> watch::Receiver<SensorData> {
        self.snapshot.subscribe()
    }

    pub fn current_snapshot(&self) -> SensorData {
        self.snapshot.borrow().clone()
    }

    /// Log ring stream, newest entry first
    pub fn logs(&self) -> watch::Receiver<Vec<LogEntry>> {
        self.logs.subscribe()
    }

    /// Text of the most recently received frame
    pub fn raw_frames(&self) -> watch::Receiver<String> {
        self.raw.subscribe()
    }

    pub fn stats(&self) -> watch::Receiver<StreamStats> {
        self.stats.subscribe()
    }

    /// Apply one received frame
    pub fn handle_frame(&self, inbound: &InboundFrame) {
        let now = Utc::now();
        self.raw.send_replace(inbound.line.clone());
        self.stats
            .send_modify(|stats| stats.record(inbound.line.len(), now));

        self.snapshot.send_if_modified(|current| {
            let mut next = current.merged(inbound);
            if next == *current {
                return false;
            }
            next.updated_at = Some(now);
            *current = next;
            true
        });

        let message = self.describe(inbound);
        self.log(message);
    }

    /// Log-ring text for a received frame
    fn describe(&self, inbound: &InboundFrame) -> String {
        match &inbound.frame {
            Frame::Telemetry(_) => format!("RS2: {}", abbreviate(&inbound.line, TELEMETRY_LOG_LEN)),
            Frame::Ack(ack) => self.describe_ack(ack),
            Frame::Error(text) => format!("ERR: {}", text),
            Frame::Warning(text) => format!("WARN: {}", text),
            Frame::Data(_) => "DATA updated".to_string(),
            Frame::Session(_) => "SESSION updated".to_string(),
            Frame::Calibration(_) => "Calibration updated".to_string(),
            Frame::Smoothing(_) => "Smoothing updated".to_string(),
            Frame::Debug(text) => format!("DEBUG: {}", text),
            Frame::Battery(_) => "Battery updated".to_string(),
            Frame::Wheel(_) => "Wheel updated".to_string(),
            Frame::ZOffset(_) => "Z offset updated".to_string(),
            Frame::Unknown(text) => abbreviate(text, self.config.raw_display_len),
        }
    }

    fn describe_ack(&self, ack: &Ack) -> String {
        let snapshot = self.snapshot.borrow();
        match ack {
            Ack::Running { .. } => format!("Logging started - SID: {}", snapshot.session_id),
            Ack::Stopped => "Logging stopped".to_string(),
            Ack::Paused => "Logging paused".to_string(),
            Ack::AutoPausedNoData => "Auto-paused (no data)".to_string(),
            Ack::BatteryCritical => "Critical battery - auto-paused".to_string(),
            Ack::TripResetComplete => "Trip reset".to_string(),
            Ack::HardResetComplete => "Hard reset (odometer and trip)".to_string(),
            Ack::NewSession { .. } => format!("New session: ID {}", snapshot.session_id),
            Ack::WheelSet(Some(wheel)) => format!("Wheel circumference: {}m", wheel),
            Ack::WheelSet(None) => "Wheel circumference set".to_string(),
            Ack::SmoothSet => "Smoothing parameters updated".to_string(),
            Ack::AlphaSet(Some(alpha)) => format!("Alpha: {}", alpha),
            Ack::AlphaSet(None) => "Alpha set".to_string(),
            Ack::ZOffsetSet(Some(offset)) => format!("Z offset: {}m/s²", offset),
            Ack::ZOffsetSet(None) => "Z offset set".to_string(),
            Ack::TimeSynced => "Time synced with device".to_string(),
            Ack::View(view) => format!("View changed to: {}", view),
            Ack::ViewSet => "View mode set".to_string(),
            Ack::BufferCleared => "Buffer cleared".to_string(),
            Ack::Other(text) => format!("ACK: {}", text),
        }
    }

    /// Append a line to the log ring
    pub fn log(&self, message: impl Into<String>) {
        let entry = LogEntry::new(message);
        debug!("{}", entry.message);

        let mut ring = self.ring.lock();
        ring.push(entry);
        self.logs.send_replace(ring.to_vec());
    }

    /// Empty the log ring; nothing is sent to the device
    pub fn clear_logs(&self) {
        let mut ring = self.ring.lock();
        ring.clear();
        self.logs.send_replace(Vec::new());
    }

    /// Submit `command` if the session is live right now
    ///
    /// # Errors
    ///
    /// Returns `VibraError::NotConnected` if there is no live session; the
    /// command is dropped and the refusal is logged.
    pub fn send(&self, command: Command) -> Result<()> {
        if !self.session.is_connected() {
            self.refuse(command.as_str());
            return Err(VibraError::NotConnected);
        }
        self.submit(command)
    }

    /// Queue `command` on the session and log what actually happened
    fn submit(&self, command: Command) -> Result<()> {
        let text = command.as_str().to_string();
        match self.session.send_command(command) {
            Ok(()) => {
                self.log(format!("Sending: {}", text));
                Ok(())
            }
            Err(e) => {
                // The link dropped between the check and the queue
                self.refuse(&text);
                Err(e)
            }
        }
    }

    fn refuse(&self, command: &str) {
        let state = self.session.state().current();
        self.log(format!(
            "Not connected (state: {}), cannot send: {}",
            state, command
        ));
    }

    /// Start a survey run
    ///
    /// Like every helper below, this resolves to one command sent through
    /// [`send`](TelemetryEngine::send) and fails the same way.
    pub fn start_logging(&self) -> Result<()> {
        self.send(Command::start())
    }

    /// Stop the current run
    pub fn stop_logging(&self) -> Result<()> {
        self.send(Command::stop())
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::pause())
    }

    /// Zero the trip distance; the device answers `TRIP_RESET_COMPLETE`
    pub fn reset_trip(&self) -> Result<()> {
        self.send(Command::reset_trip())
    }

    /// Zero trip and odometer
    pub fn hard_reset(&self) -> Result<()> {
        self.send(Command::hard_reset())
    }

    /// Ask for a full `DATA:` report
    pub fn get_data(&self) -> Result<()> {
        self.send(Command::get_data())
    }

    pub fn get_battery(&self) -> Result<()> {
        self.send(Command::get_battery())
    }

    pub fn get_session(&self) -> Result<()> {
        self.send(Command::get_session())
    }

    /// Open a new session on the device; counters restart at zero
    pub fn new_session(&self) -> Result<()> {
        self.send(Command::new_session())
    }

    pub fn next_view(&self) -> Result<()> {
        self.send(Command::next_view())
    }

    /// Show display page `view`
    pub fn set_view(&self, view: i32) -> Result<()> {
        self.send(Command::set_view(view))
    }

    /// Set the wheel circumference
    ///
    /// # Arguments
    ///
    /// * `circumference` - Wheel circumference in meters (e.g., 2.5)
    ///
    /// # Errors
    ///
    /// Returns `VibraError::NotConnected` if no session is live; the refusal
    /// is logged and nothing is written.
    pub fn set_wheel(&self, circumference: f32) -> Result<()> {
        self.send(Command::set_wheel(circumference))
    }

    /// Set the speed smoothing factor
    pub fn set_smooth(&self, alpha: f32) -> Result<()> {
        self.send(Command::set_smooth(alpha))
    }

    /// Set the vertical acceleration offset in m/s²
    pub fn set_z_offset(&self, offset: f32) -> Result<()> {
        self.send(Command::set_z_offset(offset))
    }

    /// Send `SYNCTIME` with a caller-formatted timestamp
    ///
    /// # Errors
    ///
    /// Returns `VibraError::InvalidCommand` if `timestamp` contains a
    /// delimiter, or `VibraError::NotConnected` as for [`send`].
    ///
    /// [`send`]: TelemetryEngine::send
    pub fn sync_time(&self, timestamp: &str) -> Result<()> {
        self.send(Command::sync_time(timestamp)?)
    }

    /// Send `SYNCTIME` with the local clock
    pub fn sync_time_now(&self) -> Result<()> {
        self.send(Command::sync_time_now())
    }

    pub fn get_wheel(&self) -> Result<()> {
        self.send(Command::get_wheel())
    }

    pub fn get_smooth(&self) -> Result<()> {
        self.send(Command::get_smooth())
    }

    pub fn get_z_offset(&self) -> Result<()> {
        self.send(Command::get_z_offset())
    }

    /// Ask for every calibration value (`CAL:` report)
    pub fn get_calibration(&self) -> Result<()> {
        self.send(Command::get_calibration())
    }

    pub fn get_errors(&self) -> Result<()> {
        self.send(Command::get_errors())
    }

    pub fn debug_trip(&self) -> Result<()> {
        self.send(Command::debug_trip())
    }

    /// Drop whatever the device has buffered
    pub fn clear_buffer(&self) -> Result<()> {
        self.send(Command::clear_buffer())
    }

    pub fn get_raw_data(&self) -> Result<()> {
        self.send(Command::get_raw_data())
    }

    /// Ask the device for its command list; the answer lands in the log
    pub fn help(&self) -> Result<()> {
        self.send(Command::help())
    }

    /// Send a line typed by the user, verbatim
    ///
    /// # Errors
    ///
    /// Returns `VibraError::InvalidCommand` for an empty line or one with
    /// embedded line breaks, and `VibraError::NotConnected` as for [`send`].
    ///
    /// [`send`]: TelemetryEngine::send
    pub fn raw_command(&self, line: &str) -> Result<()> {
        match Command::raw(line) {
            Ok(command) => self.send(command),
            Err(e) => {
                self.log(format!("Rejected command: {}", e));
                Err(e)
            }
        }
    }
}

async fn consume(engine: Weak<TelemetryEngine>, mut frames: broadcast::Receiver<InboundFrame>) {
    loop {
        match frames.recv().await {
            Ok(inbound) => {
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                engine.handle_frame(&inbound);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Telemetry consumer fell behind, skipped {} frames", skipped);
            }
            Err(RecvError::Closed) => return,
        }
    }
}

async fn monitor(engine: Weak<TelemetryEngine>, interval: Duration) {
    let mut window = RateWindow::new(Instant::now(), 0);
    loop {
        tokio::time::sleep(interval).await;
        let Some(engine) = engine.upgrade() else {
            return;
        };

        let total = engine.stats.borrow().total_frames;
        if let Some(rate) = window.roll(total, Instant::now()) {
            engine.stats.send_modify(|stats| stats.frames_per_second = rate);
            if rate > BUSY_STREAM_FPS {
                debug!("Stream throughput: {} frames/sec", rate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkConfig, ReconnectConfig};
    use crate::connection::{ConnectionState, RemoteDevice, StateMachine};
    use crate::protocol::LifecycleState;
    use crate::reconnect::ReconnectSupervisor;
    use crate::transport::mocks::{self, MockTransport};
    use std::sync::atomic::AtomicBool;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct Harness {
        engine: Arc<TelemetryEngine>,
        session: Arc<SessionManager>,
        transport: MockTransport,
    }

    fn harness() -> Harness {
        let transport = MockTransport::new();
        let state = Arc::new(StateMachine::new());
        let supervisor = ReconnectSupervisor::new(&ReconnectConfig::default(), state.clone());
        let session = SessionManager::new(
            LinkConfig::default(),
            Arc::new(transport.clone()),
            Arc::new(mocks::permissions(Arc::new(AtomicBool::new(true)))),
            state,
            supervisor,
        );
        let engine = TelemetryEngine::new(TelemetryConfig::default(), session.clone());
        Harness {
            engine,
            session,
            transport,
        }
    }

    fn feed(engine: &TelemetryEngine, line: &str) {
        engine.handle_frame(&InboundFrame::decode(line.to_string()));
    }

    fn messages(engine: &TelemetryEngine) -> Vec<String> {
        engine
            .logs()
            .borrow()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    async fn connect(h: &Harness) {
        let mut state = h.session.state().observe();
        h.session.connect(RemoteDevice::new("mock0", Some("VIBRA".to_string())));
        let connected = tokio::time::timeout(
            Duration::from_secs(30),
            state.wait_for(|s| matches!(s, ConnectionState::Connected { .. })),
        )
        .await
        .is_ok_and(|changed| changed.is_ok());
        assert!(connected);
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 10), "short");
        assert_eq!(abbreviate("exactly10!", 10), "exactly10!");
        assert_eq!(abbreviate("abcdefghijk", 10), "abcdefghij...");
        assert_eq!(abbreviate("ééééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_refused_queue_is_not_logged_as_sent() {
        let h = harness();
        let result = h.engine.submit(Command::get_data());
        assert!(matches!(result, Err(VibraError::NotConnected)));

        let logs = messages(&h.engine);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0], "Not connected (state: Disconnected), cannot send: GETDATA");
    }

    #[tokio::test]
    async fn test_merge_publishes_snapshot() {
        let h = harness();
        let mut snapshots = h.engine.snapshot();
        snapshots.borrow_and_update();

        feed(&h.engine, "DATA:trip=10,spd=2");
        feed(&h.engine, "DATA:bat=7.4");

        assert!(snapshots.has_changed().unwrap());
        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.trip_distance, 10.0);
        assert_eq!(snapshot.speed, 2.0);
        assert_eq!(snapshot.battery, 7.4);
        assert!(snapshot.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_station_remainder() {
        let h = harness();
        feed(&h.engine, "DATA:trip=1050");
        feed(&h.engine, "DATA:sta=1+20");
        assert_eq!(h.engine.current_snapshot().meter_remainder, 30);
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_is_not_republished() {
        let h = harness();
        feed(&h.engine, "DATA:trip=10");
        let mut snapshots = h.engine.snapshot();
        snapshots.borrow_and_update();

        feed(&h.engine, "ERR:sensor fault");
        feed(&h.engine, "DATA:trip=10");
        assert!(!snapshots.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_every_frame_reaches_raw_stream_and_stats() {
        let h = harness();
        feed(&h.engine, "RS2,TRIP=1.0");
        feed(&h.engine, "ACK:PAUSED");

        assert_eq!(*h.engine.raw_frames().borrow(), "ACK:PAUSED");
        let stats = h.engine.stats().borrow().clone();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.last_frame_len, "ACK:PAUSED".len());
        assert_eq!(h.engine.current_snapshot().raw_frame, "RS2,TRIP=1.0");
    }

    #[tokio::test]
    async fn test_ack_log_messages() {
        let h = harness();
        feed(&h.engine, "ACK:RUNNING,SID=7");
        feed(&h.engine, "ACK:NEW_SESSION");
        feed(&h.engine, "ACK:WHEEL_SET,2.5");

        let logs = messages(&h.engine);
        assert_eq!(logs[0], "Wheel circumference: 2.5m");
        assert_eq!(logs[1], "New session: ID 8");
        assert_eq!(logs[2], "Logging started - SID: 7");

        let snapshot = h.engine.current_snapshot();
        assert_eq!(snapshot.state, LifecycleState::NewSession);
        assert_eq!(snapshot.wheel_circumference, 2.5);
    }

    #[tokio::test]
    async fn test_long_unknown_frame_is_truncated_in_log() {
        let h = harness();
        let long = "X".repeat(120);
        feed(&h.engine, &long);

        let logs = messages(&h.engine);
        assert_eq!(logs[0], format!("{}...", "X".repeat(80)));
        assert_eq!(h.engine.current_snapshot().raw_frame, long);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_refused() {
        let h = harness();
        let result = h.engine.start_logging();

        assert!(matches!(result, Err(VibraError::NotConnected)));
        assert_eq!(
            messages(&h.engine)[0],
            "Not connected (state: Disconnected), cannot send: START"
        );
        assert_eq!(h.transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_raw_command_is_rejected() {
        let h = harness();
        let result = h.engine.raw_command("START\nSTOP");
        assert!(matches!(result, Err(VibraError::InvalidCommand(_))));
        assert!(messages(&h.engine)[0].starts_with("Rejected command"));
    }

    #[tokio::test]
    async fn test_clear_logs_empties_ring() {
        let h = harness();
        feed(&h.engine, "ERR:one");
        feed(&h.engine, "ERR:two");
        h.engine.clear_logs();
        assert!(h.engine.logs().borrow().is_empty());
    }

    #[tokio::test]
    async fn test_log_ring_is_bounded() {
        let h = harness();
        for i in 0..210 {
            feed(&h.engine, &format!("ERR:{}", i));
        }
        let logs = messages(&h.engine);
        assert_eq!(logs.len(), 200);
        assert_eq!(logs[0], "ERR: 209");
        assert_eq!(logs[199], "ERR: 10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_wheel_reaches_wire() {
        let h = harness();
        connect(&h).await;
        let remote = h.transport.take_remote().unwrap();

        h.engine.set_wheel(2.5).unwrap();
        let mut lines = BufReader::new(remote).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "SETWHEEL,2.5");
        assert_eq!(messages(&h.engine)[0], "Sending: SETWHEEL,2.5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_applies_received_frames() {
        let h = harness();
        h.engine.start();
        h.engine.start();
        assert!(h.engine.is_running());
        connect(&h).await;
        let mut remote = h.transport.take_remote().unwrap();

        let mut snapshots = h.engine.snapshot();
        remote.write_all(b"BAT=7.40V\r\nDATA:trip=1050,sta=1+020\n").await.unwrap();

        let applied = tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|s| s.battery == 7.4 && s.meter_remainder == 30),
        )
        .await
        .is_ok_and(|changed| changed.is_ok());
        assert!(applied);

        h.engine.stop();
        assert!(!h.engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_monitor_computes_rate() {
        let h = harness();
        h.engine.start();
        for _ in 0..10 {
            feed(&h.engine, "RS2,TRIP=1.0");
        }

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(h.engine.stats().borrow().frames_per_second, 2);
        h.engine.stop();
    }
}
