//! # Sensor Snapshot
//!
//! [`SensorData`] is an immutable value: merging a frame builds a new
//! snapshot from the previous one. Fields a frame does not carry (or carries
//! unparsable) keep their previous value.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::constants::METERS_PER_STATION;
use crate::protocol::decoder::{
    Ack, CalibrationReport, DataReport, Frame, LifecycleState, SessionReport, SmoothingReport,
    StationUpdate, TelemetryReport,
};
use crate::session::InboundFrame;

/// Current telemetry of the survey device
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorData {
    /// Trip distance in meters
    pub trip_distance: f32,
    pub sta_major: u32,
    pub sta_minor: u32,
    /// Trip distance minus the station position, in whole meters
    pub meter_remainder: i32,
    /// Speed in m/s
    pub speed: f32,
    /// Vertical acceleration in m/s²
    pub vertical_accel: f32,
    /// Battery voltage
    pub battery: f32,
    pub session_id: u32,
    pub packet_count: u32,
    pub error_count: u32,
    /// Cumulative odometer in meters
    pub odometer: f32,
    pub wheel_circumference: f32,
    pub z_offset: f32,
    pub smoothing_window: u32,
    pub speed_alpha: f32,
    pub state: LifecycleState,
    /// Text of the last `RS2` or unrecognised frame
    pub raw_frame: String,
    pub updated_at: Option<DateTime<Utc>>,
}

fn keep<T: Copy>(field: &mut T, update: Option<T>) {
    if let Some(value) = update {
        *field = value;
    }
}

impl SensorData {
    /// Snapshot after applying `inbound`
    ///
    /// `updated_at` is left untouched; the caller stamps snapshots it
    /// actually publishes.
    pub fn merged(&self, inbound: &InboundFrame) -> SensorData {
        let mut next = self.clone();
        match &inbound.frame {
            Frame::Telemetry(report) => {
                next.apply_telemetry(report);
                next.raw_frame = inbound.line.clone();
            }
            Frame::Ack(ack) => next.apply_ack(ack),
            Frame::Data(report) => next.apply_data(report),
            Frame::Session(report) => next.apply_session(report),
            Frame::Calibration(report) => next.apply_calibration(report),
            Frame::Smoothing(report) => next.apply_smoothing(report),
            Frame::Battery(volts) => keep(&mut next.battery, *volts),
            Frame::Wheel(wheel) => keep(&mut next.wheel_circumference, *wheel),
            Frame::ZOffset(offset) => keep(&mut next.z_offset, *offset),
            Frame::Unknown(text) => next.raw_frame = text.clone(),
            Frame::Error(_) | Frame::Warning(_) | Frame::Debug(_) => {}
        }
        next
    }

    fn apply_telemetry(&mut self, report: &TelemetryReport) {
        keep(&mut self.trip_distance, report.trip);
        keep(&mut self.odometer, report.odometer);
        keep(&mut self.speed, report.speed);
        keep(&mut self.vertical_accel, report.vertical_accel);
        self.packet_count = self.packet_count.saturating_add(1);
    }

    fn apply_ack(&mut self, ack: &Ack) {
        match ack {
            Ack::Running { session_id } => {
                self.state = LifecycleState::Running;
                keep(&mut self.session_id, *session_id);
            }
            Ack::Stopped => self.state = LifecycleState::Stopped,
            Ack::Paused | Ack::AutoPausedNoData | Ack::BatteryCritical => {
                self.state = LifecycleState::Paused;
            }
            Ack::TripResetComplete => {
                self.reset_trip();
                self.state = LifecycleState::Ready;
            }
            Ack::HardResetComplete => {
                self.reset_trip();
                self.odometer = 0.0;
                self.state = LifecycleState::Ready;
            }
            Ack::NewSession { session_id } => {
                self.session_id = session_id.unwrap_or_else(|| self.session_id.saturating_add(1));
                self.packet_count = 0;
                self.error_count = 0;
                self.state = LifecycleState::NewSession;
            }
            Ack::WheelSet(wheel) => keep(&mut self.wheel_circumference, *wheel),
            Ack::AlphaSet(alpha) => keep(&mut self.speed_alpha, *alpha),
            Ack::ZOffsetSet(offset) => keep(&mut self.z_offset, *offset),
            Ack::SmoothSet
            | Ack::TimeSynced
            | Ack::View(_)
            | Ack::ViewSet
            | Ack::BufferCleared
            | Ack::Other(_) => {}
        }
    }

    fn apply_data(&mut self, report: &DataReport) {
        keep(&mut self.trip_distance, report.trip);
        keep(&mut self.odometer, report.odometer);
        keep(&mut self.speed, report.speed);
        keep(&mut self.vertical_accel, report.vertical_accel);
        keep(&mut self.packet_count, report.packets);
        keep(&mut self.error_count, report.errors);
        keep(&mut self.battery, report.battery);
        keep(&mut self.session_id, report.session_id);
        keep(&mut self.wheel_circumference, report.wheel);
        if let Some(state) = &report.state {
            self.state = state.clone();
        }
        // After the trip merge, so key order inside the frame does not matter
        if let Some(station) = report.station {
            self.apply_station(station);
        }
    }

    fn apply_station(&mut self, station: StationUpdate) {
        keep(&mut self.sta_major, station.major);
        keep(&mut self.sta_minor, station.minor);
        let station_meters =
            f64::from(self.sta_major) * f64::from(METERS_PER_STATION) + f64::from(self.sta_minor);
        self.meter_remainder = (f64::from(self.trip_distance) - station_meters) as i32;
    }

    fn apply_session(&mut self, report: &SessionReport) {
        keep(&mut self.session_id, report.session_id);
        keep(&mut self.packet_count, report.packets);
        keep(&mut self.error_count, report.errors);
    }

    fn apply_calibration(&mut self, report: &CalibrationReport) {
        keep(&mut self.wheel_circumference, report.wheel);
        keep(&mut self.z_offset, report.z_offset);
    }

    fn apply_smoothing(&mut self, report: &SmoothingReport) {
        keep(&mut self.smoothing_window, report.window);
        keep(&mut self.speed_alpha, report.alpha);
    }

    fn reset_trip(&mut self) {
        self.trip_distance = 0.0;
        self.sta_major = 0;
        self.sta_minor = 0;
        self.meter_remainder = 0;
    }

    /// Trip distance in kilometers, e.g. `1.050 km`
    pub fn format_trip(&self) -> String {
        format!("{:.3} km", self.trip_distance / 1000.0)
    }

    /// Station position, e.g. `STA 01+050`
    pub fn format_station(&self) -> String {
        format!("STA {:02}+{:03}", self.sta_major, self.sta_minor)
    }

    /// Speed converted to km/h, e.g. `7.2 km/h`
    pub fn format_speed(&self) -> String {
        format!("{:.1} km/h", self.speed * 3.6)
    }

    pub fn format_vertical_accel(&self) -> String {
        format!("{:.2} m/s²", self.vertical_accel)
    }

    pub fn format_battery(&self) -> String {
        format!("{:.2} V", self.battery)
    }
}
