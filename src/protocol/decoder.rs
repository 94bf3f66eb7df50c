//! # Frame Decoder
//!
//! Turns one trimmed text line into a typed [`Frame`].
//!
//! Dispatch is a literal prefix match. Inside a recognised frame every
//! `key=value` pair is parsed independently: a value that fails to parse
//! leaves its field `None` (the merge step keeps the previous value) and
//! unknown keys are ignored. Decoding never fails; anything unrecognised
//! becomes [`Frame::Unknown`].

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::constants::*;

/// Lifecycle label of the remote logger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Ready,
    Running,
    Stopped,
    Paused,
    NewSession,
    /// A state code the firmware sent that has no known label
    Other(String),
}

impl LifecycleState {
    /// Map a numeric `state=` code from a `DATA:` frame
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => Self::Ready,
            "1" => Self::Running,
            "2" => Self::Stopped,
            "3" => Self::Paused,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Paused => "PAUSED",
            Self::NewSession => "NEW SESSION",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for LifecycleState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One decoded inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `RS2,` compact telemetry tuple
    Telemetry(TelemetryReport),
    /// `ACK:` command acknowledgement
    Ack(Ack),
    /// `ERR:` free text
    Error(String),
    /// `WARN:` free text
    Warning(String),
    /// `DATA:` full report
    Data(DataReport),
    /// `SESSION:` counters
    Session(SessionReport),
    /// `CAL:` calibration
    Calibration(CalibrationReport),
    /// `SMOOTH:` smoothing parameters
    Smoothing(SmoothingReport),
    /// `DEBUG:` free text
    Debug(String),
    /// `BAT=7.40V`
    Battery(Option<f32>),
    /// `WHEEL=2.000`
    Wheel(Option<f32>),
    /// `ZOFFSET=0.010`
    ZOffset(Option<f32>),
    /// Anything else, verbatim
    Unknown(String),
}

/// Fields of an `RS2,` frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryReport {
    pub trip: Option<f32>,
    pub odometer: Option<f32>,
    pub speed: Option<f32>,
    pub vertical_accel: Option<f32>,
    /// Text after `*`, not verified
    pub checksum: Option<String>,
}

/// `sta=major+minor`; each half parsed on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationUpdate {
    pub major: Option<u32>,
    pub minor: Option<u32>,
}

/// Fields of a `DATA:` frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataReport {
    pub trip: Option<f32>,
    pub station: Option<StationUpdate>,
    pub odometer: Option<f32>,
    pub speed: Option<f32>,
    pub vertical_accel: Option<f32>,
    pub packets: Option<u32>,
    pub errors: Option<u32>,
    pub state: Option<LifecycleState>,
    pub battery: Option<f32>,
    pub session_id: Option<u32>,
    pub wheel: Option<f32>,
}

/// Fields of a `SESSION:` frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: Option<u32>,
    pub packets: Option<u32>,
    pub errors: Option<u32>,
}

/// Fields of a `CAL:` frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationReport {
    pub wheel: Option<f32>,
    pub z_offset: Option<f32>,
}

/// Fields of a `SMOOTH:` frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingReport {
    pub window: Option<u32>,
    pub alpha: Option<f32>,
}

/// Acknowledgement payloads
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Running { session_id: Option<u32> },
    Stopped,
    Paused,
    AutoPausedNoData,
    BatteryCritical,
    TripResetComplete,
    HardResetComplete,
    NewSession { session_id: Option<u32> },
    WheelSet(Option<f32>),
    SmoothSet,
    AlphaSet(Option<f32>),
    ZOffsetSet(Option<f32>),
    TimeSynced,
    View(String),
    ViewSet,
    BufferCleared,
    /// Acknowledgement with no state effect
    Other(String),
}

/// Decode one frame
pub fn decode_frame(line: &str) -> Frame {
    let line = line.trim();

    if let Some(body) = line.strip_prefix(PREFIX_RS2) {
        Frame::Telemetry(decode_telemetry(body))
    } else if let Some(body) = line.strip_prefix(PREFIX_ACK) {
        Frame::Ack(decode_ack(body))
    } else if let Some(body) = line.strip_prefix(PREFIX_ERR) {
        Frame::Error(body.trim().to_string())
    } else if let Some(body) = line.strip_prefix(PREFIX_WARN) {
        Frame::Warning(body.trim().to_string())
    } else if let Some(body) = line.strip_prefix(PREFIX_DATA) {
        Frame::Data(decode_data(body))
    } else if let Some(body) = line.strip_prefix(PREFIX_SESSION) {
        Frame::Session(decode_session(body))
    } else if let Some(body) = line.strip_prefix(PREFIX_CAL) {
        Frame::Calibration(decode_calibration(body))
    } else if let Some(body) = line.strip_prefix(PREFIX_SMOOTH) {
        Frame::Smoothing(decode_smoothing(body))
    } else if let Some(body) = line.strip_prefix(PREFIX_DEBUG) {
        Frame::Debug(body.trim().to_string())
    } else if let Some(body) = line.strip_prefix(PREFIX_BAT) {
        let body = body.trim();
        let volts = body.strip_suffix(['V', 'v']).unwrap_or(body);
        Frame::Battery(parse_value(PREFIX_BAT, volts))
    } else if let Some(body) = line.strip_prefix(PREFIX_WHEEL) {
        Frame::Wheel(parse_value(PREFIX_WHEEL, body))
    } else if let Some(body) = line.strip_prefix(PREFIX_ZOFFSET) {
        Frame::ZOffset(parse_value(PREFIX_ZOFFSET, body))
    } else {
        Frame::Unknown(line.to_string())
    }
}

/// Split `a=1,b=2` into trimmed pairs, skipping parts without `=`
fn pairs(body: &str) -> impl Iterator<Item = (&str, &str)> {
    body.split(FIELD_DELIMITER)
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

/// Parse one value; failures are logged and yield `None`
fn parse_value<T: FromStr + Finite>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed.is_finite_value() => Some(parsed),
        _ => {
            debug!("Skipping unparsable value for {}: {:?}", key, value);
            None
        }
    }
}

/// Rejects NaN and infinities, which `f32::from_str` accepts
trait Finite {
    fn is_finite_value(&self) -> bool;
}

impl Finite for f32 {
    fn is_finite_value(&self) -> bool {
        self.is_finite()
    }
}

impl Finite for u32 {
    fn is_finite_value(&self) -> bool {
        true
    }
}

fn decode_telemetry(body: &str) -> TelemetryReport {
    let (fields, checksum) = match body.split_once(CHECKSUM_MARKER) {
        Some((fields, checksum)) => (fields, Some(checksum.trim().to_string())),
        None => (body, None),
    };

    let mut report = TelemetryReport {
        checksum,
        ..Default::default()
    };
    for (key, value) in pairs(fields) {
        match key {
            "TRIP" => report.trip = parse_value(key, value),
            "ODO" => report.odometer = parse_value(key, value),
            "SPD" => report.speed = parse_value(key, value),
            "Z" => report.vertical_accel = parse_value(key, value),
            _ => {}
        }
    }
    report
}

fn decode_station(value: &str) -> Option<StationUpdate> {
    let (major, minor) = value.split_once('+')?;
    Some(StationUpdate {
        major: parse_value("sta", major),
        minor: parse_value("sta", minor),
    })
}

fn decode_data(body: &str) -> DataReport {
    let mut report = DataReport::default();
    for (key, value) in pairs(body) {
        match key {
            "trip" => report.trip = parse_value(key, value),
            "sta" => report.station = decode_station(value),
            "odo" => report.odometer = parse_value(key, value),
            "spd" => report.speed = parse_value(key, value),
            "z" => report.vertical_accel = parse_value(key, value),
            "pkt" => report.packets = parse_value(key, value),
            "err" => report.errors = parse_value(key, value),
            "state" if !value.is_empty() => report.state = Some(LifecycleState::from_code(value)),
            "bat" => report.battery = parse_value(key, value),
            "sid" => report.session_id = parse_value(key, value),
            "wheel" => report.wheel = parse_value(key, value),
            _ => {}
        }
    }
    report
}

fn decode_session(body: &str) -> SessionReport {
    let mut report = SessionReport::default();
    for (key, value) in pairs(body) {
        match key {
            "id" => report.session_id = parse_value(key, value),
            "pkt" => report.packets = parse_value(key, value),
            "err" => report.errors = parse_value(key, value),
            _ => {}
        }
    }
    report
}

fn decode_calibration(body: &str) -> CalibrationReport {
    let mut report = CalibrationReport::default();
    for (key, value) in pairs(body) {
        match key {
            "WHEEL" => report.wheel = parse_value(key, value),
            "ZOFF" => report.z_offset = parse_value(key, value),
            _ => {}
        }
    }
    report
}

fn decode_smoothing(body: &str) -> SmoothingReport {
    let mut report = SmoothingReport::default();
    for (key, value) in pairs(body) {
        match key {
            "WIN" => report.window = parse_value(key, value),
            "ALPHA" => report.alpha = parse_value(key, value),
            _ => {}
        }
    }
    report
}

/// Value after the first `,` of an acknowledgement (`WHEEL_SET,2.0`)
fn ack_argument(body: &str) -> Option<&str> {
    body.split_once(FIELD_DELIMITER).map(|(_, arg)| arg.trim())
}

fn decode_ack(body: &str) -> Ack {
    let body = body.trim();

    if body.starts_with(ACK_RUNNING) {
        let session_id = body
            .split_once(ACK_SESSION_ID_KEY)
            .and_then(|(_, rest)| parse_value(ACK_SESSION_ID_KEY, rest.split(FIELD_DELIMITER).next()?));
        Ack::Running { session_id }
    } else if body.contains(ACK_AUTO_PAUSED_NO_DATA) {
        Ack::AutoPausedNoData
    } else if body.contains(ACK_BAT_CRITICAL) {
        Ack::BatteryCritical
    } else if body.contains(ACK_TRIP_RESET_COMPLETE) {
        Ack::TripResetComplete
    } else if body.contains(ACK_HARD_RESET_COMPLETE) {
        Ack::HardResetComplete
    } else if body.starts_with(ACK_NEW_SESSION) {
        let session_id = ack_argument(body).and_then(|arg| parse_value(ACK_NEW_SESSION, arg));
        Ack::NewSession { session_id }
    } else if body.starts_with(ACK_WHEEL_SET) {
        Ack::WheelSet(ack_argument(body).and_then(|arg| parse_value(ACK_WHEEL_SET, arg)))
    } else if body.starts_with(ACK_SMOOTH_SET) {
        Ack::SmoothSet
    } else if body.starts_with(ACK_ALPHA_SET) {
        Ack::AlphaSet(ack_argument(body).and_then(|arg| parse_value(ACK_ALPHA_SET, arg)))
    } else if body.starts_with(ACK_ZOFFSET_SET) {
        Ack::ZOffsetSet(ack_argument(body).and_then(|arg| parse_value(ACK_ZOFFSET_SET, arg)))
    } else if body.starts_with(ACK_TIME_SYNCED) {
        Ack::TimeSynced
    } else if let Some(view) = body.strip_prefix(ACK_VIEW) {
        Ack::View(view.trim().to_string())
    } else if body.starts_with(ACK_VIEW_SET) {
        Ack::ViewSet
    } else if body.contains(ACK_BUFFER_CLEARED) {
        Ack::BufferCleared
    } else if body.contains(ACK_STOPPED) {
        Ack::Stopped
    } else if body.contains(ACK_PAUSED) {
        Ack::Paused
    } else {
        Ack::Other(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rs2_with_checksum() {
        let frame = decode_frame("RS2,TRIP=123.4,SPD=2.1,Z=0.03,ODO=5001.2*4F");
        assert_eq!(
            frame,
            Frame::Telemetry(TelemetryReport {
                trip: Some(123.4),
                odometer: Some(5001.2),
                speed: Some(2.1),
                vertical_accel: Some(0.03),
                checksum: Some("4F".to_string()),
            })
        );
    }

    #[test]
    fn test_decode_rs2_bad_number_is_skipped() {
        let Frame::Telemetry(report) = decode_frame("RS2,TRIP=abc,SPD=2.5,FOO=1") else {
            panic!("expected telemetry frame");
        };
        assert_eq!(report.trip, None);
        assert_eq!(report.speed, Some(2.5));
        assert_eq!(report.checksum, None);
    }

    #[test]
    fn test_decode_rs2_rejects_nan() {
        let Frame::Telemetry(report) = decode_frame("RS2,TRIP=NaN,Z=inf") else {
            panic!("expected telemetry frame");
        };
        assert_eq!(report.trip, None);
        assert_eq!(report.vertical_accel, None);
    }

    #[test]
    fn test_decode_data_all_fields() {
        let Frame::Data(report) =
            decode_frame("DATA:trip=123.4,sta=1+050,spd=2.1,z=0.03,pkt=42,err=3,state=1,bat=7.4,sid=7,odo=9.5,wheel=2.0")
        else {
            panic!("expected data frame");
        };
        assert_eq!(report.trip, Some(123.4));
        assert_eq!(report.station, Some(StationUpdate { major: Some(1), minor: Some(50) }));
        assert_eq!(report.speed, Some(2.1));
        assert_eq!(report.vertical_accel, Some(0.03));
        assert_eq!(report.packets, Some(42));
        assert_eq!(report.errors, Some(3));
        assert_eq!(report.state, Some(LifecycleState::Running));
        assert_eq!(report.battery, Some(7.4));
        assert_eq!(report.session_id, Some(7));
        assert_eq!(report.odometer, Some(9.5));
        assert_eq!(report.wheel, Some(2.0));
    }

    #[test]
    fn test_decode_data_station_without_plus_is_ignored() {
        let Frame::Data(report) = decode_frame("DATA:sta=1050,trip=5") else {
            panic!("expected data frame");
        };
        assert_eq!(report.station, None);
        assert_eq!(report.trip, Some(5.0));
    }

    #[test]
    fn test_decode_data_unknown_state_code_is_kept() {
        let Frame::Data(report) = decode_frame("DATA:state=9") else {
            panic!("expected data frame");
        };
        assert_eq!(report.state, Some(LifecycleState::Other("9".to_string())));
    }

    #[test]
    fn test_decode_session_and_calibration() {
        assert_eq!(
            decode_frame("SESSION:id=4,pkt=100,err=x"),
            Frame::Session(SessionReport {
                session_id: Some(4),
                packets: Some(100),
                errors: None,
            })
        );
        assert_eq!(
            decode_frame("CAL:WHEEL=2.000,ZOFF=0.010"),
            Frame::Calibration(CalibrationReport {
                wheel: Some(2.0),
                z_offset: Some(0.01),
            })
        );
        assert_eq!(
            decode_frame("SMOOTH:WIN=5,ALPHA=0.25"),
            Frame::Smoothing(SmoothingReport {
                window: Some(5),
                alpha: Some(0.25),
            })
        );
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_frame("BAT=7.40V"), Frame::Battery(Some(7.4)));
        assert_eq!(decode_frame("BAT=7.40"), Frame::Battery(Some(7.4)));
        assert_eq!(decode_frame("BAT=lowV"), Frame::Battery(None));
        assert_eq!(decode_frame("WHEEL=2.000"), Frame::Wheel(Some(2.0)));
        assert_eq!(decode_frame("ZOFFSET=-0.5"), Frame::ZOffset(Some(-0.5)));
    }

    #[test]
    fn test_decode_text_frames() {
        assert_eq!(decode_frame("ERR:SD card missing"), Frame::Error("SD card missing".to_string()));
        assert_eq!(decode_frame("WARN: low battery"), Frame::Warning("low battery".to_string()));
        assert_eq!(decode_frame("DEBUG:trip_offset=12"), Frame::Debug("trip_offset=12".to_string()));
        assert_eq!(decode_frame("hello world"), Frame::Unknown("hello world".to_string()));
    }

    #[test]
    fn test_prefix_match_is_literal() {
        // A bare key=value line is opaque, not a DATA frame
        assert_eq!(decode_frame("trip=10,spd=2"), Frame::Unknown("trip=10,spd=2".to_string()));
        // Prefixes are case sensitive
        assert_eq!(decode_frame("ack:STOPPED"), Frame::Unknown("ack:STOPPED".to_string()));
    }

    #[test]
    fn test_decode_acks() {
        let ack = |line: &str| match decode_frame(line) {
            Frame::Ack(ack) => ack,
            other => panic!("expected ack, got {:?}", other),
        };

        assert_eq!(ack("ACK:RUNNING,SID=7"), Ack::Running { session_id: Some(7) });
        assert_eq!(ack("ACK:RUNNING"), Ack::Running { session_id: None });
        assert_eq!(ack("ACK:STOPPED"), Ack::Stopped);
        assert_eq!(ack("ACK:STOP"), Ack::Other("STOP".to_string()));
        assert_eq!(ack("ACK:PAUSED"), Ack::Paused);
        assert_eq!(ack("ACK:AUTO_PAUSED_NO_DATA"), Ack::AutoPausedNoData);
        assert_eq!(ack("ACK:BAT_CRITICAL"), Ack::BatteryCritical);
        assert_eq!(ack("ACK:TRIP_RESET_COMPLETE"), Ack::TripResetComplete);
        assert_eq!(ack("ACK:HARD_RESET_COMPLETE"), Ack::HardResetComplete);
        assert_eq!(ack("ACK:NEW_SESSION,12"), Ack::NewSession { session_id: Some(12) });
        assert_eq!(ack("ACK:NEW_SESSION"), Ack::NewSession { session_id: None });
        assert_eq!(ack("ACK:WHEEL_SET,2.5"), Ack::WheelSet(Some(2.5)));
        assert_eq!(ack("ACK:ALPHA_SET,0.3"), Ack::AlphaSet(Some(0.3)));
        assert_eq!(ack("ACK:ZOFFSET_SET,0.02"), Ack::ZOffsetSet(Some(0.02)));
        assert_eq!(ack("ACK:SMOOTH_SET"), Ack::SmoothSet);
        assert_eq!(ack("ACK:TIME_SYNCED"), Ack::TimeSynced);
        assert_eq!(ack("ACK:VIEW=SPEED"), Ack::View("SPEED".to_string()));
        assert_eq!(ack("ACK:VIEW_SET"), Ack::ViewSet);
        assert_eq!(ack("ACK:BUFFER_CLEARED"), Ack::BufferCleared);
    }

    #[test]
    fn test_lifecycle_labels() {
        assert_eq!(LifecycleState::default().label(), "READY");
        assert_eq!(LifecycleState::NewSession.to_string(), "NEW SESSION");
        assert_eq!(LifecycleState::from_code("2"), LifecycleState::Stopped);
        assert_eq!(LifecycleState::from_code("3"), LifecycleState::Paused);
    }
}
