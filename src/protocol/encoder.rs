//! # Command Encoder
//!
//! Builds outbound command lines: a verb optionally followed by
//! comma-joined arguments, terminated by a single `\n`. There is no escaping,
//! so verbs and arguments containing the delimiter or a line break are
//! rejected when the command is built.

use std::fmt;

use super::constants::*;
use crate::error::{Result, VibraError};

/// A validated command line, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
}

impl Command {
    /// Build a command from a verb and arguments
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommand` if the verb is empty or any part contains
    /// `,`, `\r` or `\n`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vibra_link::protocol::encoder::Command;
    ///
    /// let cmd = Command::with_args("SETVIEW", ["2"]).unwrap();
    /// assert_eq!(cmd.as_str(), "SETVIEW,2");
    /// ```
    pub fn with_args<I, S>(verb: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let verb = verb.trim();
        if verb.is_empty() {
            return Err(VibraError::InvalidCommand("empty verb".to_string()));
        }
        check_field(verb)?;

        let mut text = verb.to_string();
        for arg in args {
            let arg = arg.as_ref();
            check_field(arg)?;
            text.push(FIELD_DELIMITER);
            text.push_str(arg);
        }
        Ok(Self { text })
    }

    /// Build a command without arguments
    pub fn new(verb: &str) -> Result<Self> {
        Self::with_args(verb, std::iter::empty::<&str>())
    }

    /// Accept a line typed by the user as-is
    ///
    /// Commas are allowed (the user writes the whole line), line breaks are
    /// not.
    pub fn raw(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(VibraError::InvalidCommand("empty command".to_string()));
        }
        if line.contains(['\r', '\n']) {
            return Err(VibraError::InvalidCommand(format!(
                "line break inside command {:?}",
                line
            )));
        }
        Ok(Self {
            text: line.to_string(),
        })
    }

    /// Verb and arguments, without terminator
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Bytes put on the wire, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 1);
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(COMMAND_TERMINATOR);
        bytes
    }

    /// Built-in verbs and formatted numbers never need validation
    fn known(verb: &str, arg: Option<String>) -> Self {
        let text = match arg {
            Some(arg) => format!("{}{}{}", verb, FIELD_DELIMITER, arg),
            None => verb.to_string(),
        };
        Self { text }
    }

    /// `START`: begin logging a survey run
    pub fn start() -> Self {
        Self::known(CMD_START, None)
    }

    /// `STOP`: end the current run
    pub fn stop() -> Self {
        Self::known(CMD_STOP, None)
    }

    /// `PAUSE`: suspend logging without closing the run
    pub fn pause() -> Self {
        Self::known(CMD_PAUSE, None)
    }

    /// `RESETTRIP`: zero the trip distance and station
    pub fn reset_trip() -> Self {
        Self::known(CMD_RESET_TRIP, None)
    }

    /// `HARDRESET`: zero trip and odometer
    pub fn hard_reset() -> Self {
        Self::known(CMD_HARD_RESET, None)
    }

    /// `GETDATA`: request a full `DATA:` report
    pub fn get_data() -> Self {
        Self::known(CMD_GET_DATA, None)
    }

    /// `GETBATTERY`: request a `BAT=` report
    pub fn get_battery() -> Self {
        Self::known(CMD_GET_BATTERY, None)
    }

    /// `GETSESSION`: request a `SESSION:` report
    pub fn get_session() -> Self {
        Self::known(CMD_GET_SESSION, None)
    }

    /// `NEWSESSION`: open a new session id on the device
    pub fn new_session() -> Self {
        Self::known(CMD_NEW_SESSION, None)
    }

    /// `NEXTVIEW`: cycle the device display
    pub fn next_view() -> Self {
        Self::known(CMD_NEXT_VIEW, None)
    }

    /// `SETVIEW,<index>`: jump to a display page
    pub fn set_view(view: i32) -> Self {
        Self::known(CMD_SET_VIEW, Some(view.to_string()))
    }

    /// `SETWHEEL,<circumference in meters>`
    pub fn set_wheel(circumference: f32) -> Self {
        Self::known(CMD_SET_WHEEL, Some(format_float(circumference)))
    }

    /// `SETSMOOTH,<alpha>`: speed smoothing factor
    pub fn set_smooth(alpha: f32) -> Self {
        Self::known(CMD_SET_SMOOTH, Some(format_float(alpha)))
    }

    /// `SETZOFFSET,<m/s²>`: vertical acceleration offset
    pub fn set_z_offset(offset: f32) -> Self {
        Self::known(CMD_SET_ZOFFSET, Some(format_float(offset)))
    }

    /// `SYNCTIME,<timestamp>`
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommand` if the timestamp contains a delimiter.
    pub fn sync_time(timestamp: &str) -> Result<Self> {
        Self::with_args(CMD_SYNC_TIME, [timestamp])
    }

    /// `SYNCTIME` with the local clock formatted as ISO-8601
    pub fn sync_time_now() -> Self {
        let now = chrono::Local::now().format(SYNC_TIME_FORMAT).to_string();
        Self::known(CMD_SYNC_TIME, Some(now))
    }

    /// `GETWHEEL`: request the wheel circumference
    pub fn get_wheel() -> Self {
        Self::known(CMD_GET_WHEEL, None)
    }

    /// `GETSMOOTH`: request the smoothing settings
    pub fn get_smooth() -> Self {
        Self::known(CMD_GET_SMOOTH, None)
    }

    /// `GETZOFFSET`: request the vertical offset
    pub fn get_z_offset() -> Self {
        Self::known(CMD_GET_ZOFFSET, None)
    }

    /// `GETCAL`: request every calibration value
    pub fn get_calibration() -> Self {
        Self::known(CMD_GET_CAL, None)
    }

    /// `GETERRORS`: request the device error counters
    pub fn get_errors() -> Self {
        Self::known(CMD_GET_ERRORS, None)
    }

    /// `DEBUGTRIP`: ask the device to dump its trip state
    pub fn debug_trip() -> Self {
        Self::known(CMD_DEBUG_TRIP, None)
    }

    /// `CLEARBUFFER`: drop data buffered on the device
    pub fn clear_buffer() -> Self {
        Self::known(CMD_CLEAR_BUFFER, None)
    }

    /// `GETRAWDATA`: request raw sensor values
    pub fn get_raw_data() -> Self {
        Self::known(CMD_GET_RAW_DATA, None)
    }

    /// `HELP`: ask the device for its command list
    pub fn help() -> Self {
        Self::known(CMD_HELP, None)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn check_field(field: &str) -> Result<()> {
    if field.contains([FIELD_DELIMITER, '\r', '\n']) {
        return Err(VibraError::InvalidCommand(format!(
            "{:?} contains a delimiter",
            field
        )));
    }
    Ok(())
}

/// Shortest round-trip form, always with a fractional part (`2.0`, `2.5`)
pub fn format_float(value: f32) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
