//! # Line Protocol Constants
//!
//! Core definitions for the newline-delimited text protocol spoken by the
//! survey device firmware.

/// Separator between a command verb and its arguments, and between
/// `key=value` pairs inside a frame
pub const FIELD_DELIMITER: char = ',';

/// Terminator appended to every outbound command
pub const COMMAND_TERMINATOR: u8 = b'\n';

/// Byte values that end an inbound frame
pub const FRAME_SEPARATORS: [u8; 2] = [b'\n', b'\r'];

/// Longest partial frame kept between reads before it is discarded.
/// The firmware never emits lines anywhere near this long.
pub const MAX_PENDING_FRAME_BYTES: usize = 4096;

/// Meters per station major unit (`sta=1+050` is 1050 m)
pub const METERS_PER_STATION: u32 = 1000;

// Inbound frame prefixes
pub const PREFIX_RS2: &str = "RS2,";
pub const PREFIX_ACK: &str = "ACK:";
pub const PREFIX_ERR: &str = "ERR:";
pub const PREFIX_WARN: &str = "WARN:";
pub const PREFIX_DATA: &str = "DATA:";
pub const PREFIX_SESSION: &str = "SESSION:";
pub const PREFIX_CAL: &str = "CAL:";
pub const PREFIX_SMOOTH: &str = "SMOOTH:";
pub const PREFIX_DEBUG: &str = "DEBUG:";
pub const PREFIX_BAT: &str = "BAT=";
pub const PREFIX_WHEEL: &str = "WHEEL=";
pub const PREFIX_ZOFFSET: &str = "ZOFFSET=";

/// Marker introducing the optional checksum suffix of an `RS2,` frame
pub const CHECKSUM_MARKER: char = '*';

// Acknowledgement keywords
pub const ACK_RUNNING: &str = "RUNNING";
pub const ACK_STOPPED: &str = "STOPPED";
pub const ACK_PAUSED: &str = "PAUSED";
pub const ACK_AUTO_PAUSED_NO_DATA: &str = "AUTO_PAUSED_NO_DATA";
pub const ACK_BAT_CRITICAL: &str = "BAT_CRITICAL";
pub const ACK_TRIP_RESET_COMPLETE: &str = "TRIP_RESET_COMPLETE";
pub const ACK_HARD_RESET_COMPLETE: &str = "HARD_RESET_COMPLETE";
pub const ACK_NEW_SESSION: &str = "NEW_SESSION";
pub const ACK_WHEEL_SET: &str = "WHEEL_SET";
pub const ACK_SMOOTH_SET: &str = "SMOOTH_SET";
pub const ACK_ALPHA_SET: &str = "ALPHA_SET";
pub const ACK_ZOFFSET_SET: &str = "ZOFFSET_SET";
pub const ACK_TIME_SYNCED: &str = "TIME_SYNCED";
pub const ACK_VIEW: &str = "VIEW=";
pub const ACK_VIEW_SET: &str = "VIEW_SET";
pub const ACK_BUFFER_CLEARED: &str = "BUFFER_CLEARED";
pub const ACK_SESSION_ID_KEY: &str = "SID=";

// Outbound command verbs
pub const CMD_START: &str = "START";
pub const CMD_STOP: &str = "STOP";
pub const CMD_PAUSE: &str = "PAUSE";
pub const CMD_RESET_TRIP: &str = "RESETTRIP";
pub const CMD_HARD_RESET: &str = "HARDRESET";
pub const CMD_GET_DATA: &str = "GETDATA";
pub const CMD_GET_BATTERY: &str = "GETBATTERY";
pub const CMD_GET_SESSION: &str = "GETSESSION";
pub const CMD_NEW_SESSION: &str = "NEWSESSION";
pub const CMD_NEXT_VIEW: &str = "NEXTVIEW";
pub const CMD_SET_VIEW: &str = "SETVIEW";
pub const CMD_SET_WHEEL: &str = "SETWHEEL";
pub const CMD_SET_SMOOTH: &str = "SETSMOOTH";
pub const CMD_SET_ZOFFSET: &str = "SETZOFFSET";
pub const CMD_SYNC_TIME: &str = "SYNCTIME";
pub const CMD_GET_WHEEL: &str = "GETWHEEL";
pub const CMD_GET_SMOOTH: &str = "GETSMOOTH";
pub const CMD_GET_ZOFFSET: &str = "GETZOFFSET";
pub const CMD_GET_CAL: &str = "GETCAL";
pub const CMD_GET_ERRORS: &str = "GETERRORS";
pub const CMD_DEBUG_TRIP: &str = "DEBUGTRIP";
pub const CMD_CLEAR_BUFFER: &str = "CLEARBUFFER";
pub const CMD_GET_RAW_DATA: &str = "GETRAWDATA";
pub const CMD_HELP: &str = "HELP";

/// `strftime` pattern for the `SYNCTIME` argument (ISO-8601, local clock)
pub const SYNC_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
