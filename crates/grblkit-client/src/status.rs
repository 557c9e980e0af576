//! Machine status reports.
//!
//! Decodes the `<State|Key:Val|...>` realtime report into a [`Status`]
//! snapshot. Each snapshot records which fields the report actually
//! carried, so a consumer can tell "absent this update" from "present
//! with a zero value".

use grblkit_core::StatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine state reported as the first segment of a status report.
///
/// The firmware owns the legality of transitions; this is only the last
/// reported value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    Run,
    Jog,
    /// Feed hold in progress.
    HoldActive,
    /// Feed hold complete, ready to resume.
    HoldComplete,
    Home,
    Alarm,
    Check,
    /// Door closed, ready to resume.
    DoorClosed,
    /// Machine stopped, door still ajar.
    DoorAjar,
    /// Door opened, hold in progress.
    DoorOpening,
    /// Door closed, resuming.
    DoorClosing,
    Sleep,
    /// A state this client does not recognize, preserved verbatim.
    Unknown(String),
}

impl MachineState {
    fn parse(s: &str) -> MachineState {
        match s {
            "Idle" => MachineState::Idle,
            "Run" => MachineState::Run,
            "Jog" => MachineState::Jog,
            "Hold:1" => MachineState::HoldActive,
            "Hold:0" => MachineState::HoldComplete,
            "Home" => MachineState::Home,
            "Alarm" => MachineState::Alarm,
            "Check" => MachineState::Check,
            "Door:0" => MachineState::DoorClosed,
            "Door:1" => MachineState::DoorAjar,
            "Door:2" => MachineState::DoorOpening,
            "Door:3" => MachineState::DoorClosing,
            "Sleep" => MachineState::Sleep,
            other => MachineState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MachineState::Idle => "Idle",
            MachineState::Run => "Run",
            MachineState::Jog => "Jog",
            MachineState::HoldActive => "Hold:1",
            MachineState::HoldComplete => "Hold:0",
            MachineState::Home => "Home",
            MachineState::Alarm => "Alarm",
            MachineState::Check => "Check",
            MachineState::DoorClosed => "Door:0",
            MachineState::DoorAjar => "Door:1",
            MachineState::DoorOpening => "Door:2",
            MachineState::DoorClosing => "Door:3",
            MachineState::Sleep => "Sleep",
            MachineState::Unknown(s) => s,
        }
    }
}

impl Default for MachineState {
    fn default() -> Self {
        MachineState::Unknown(String::new())
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A report field, as recorded in a snapshot's presence list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusField {
    MachinePosition,
    WorkPosition,
    WorkOffset,
    Buffer,
    Line,
    FeedSpindle,
    Feed,
    Pins,
    Overrides,
    Aux,
}

/// Input pins reported active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pins {
    pub probe: bool,
    pub limit_x: bool,
    pub limit_y: bool,
    pub limit_z: bool,
    pub door: bool,
    pub feed_hold: bool,
    pub cycle_start: bool,
}

/// Override percentages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: u16,
    pub rapid: u16,
    pub spindle: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpindleDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

/// Auxiliary accessory state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aux {
    pub spindle_on: bool,
    pub spindle_direction: SpindleDirection,
    pub coolant_flood: bool,
    pub coolant_mist: bool,
}

/// A machine status snapshot.
///
/// Position fields are `None` until first reported. The remaining fields
/// default to zero; consult [`Status::fields`] to learn which of them the
/// report carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: MachineState,
    /// Which fields the report carried, in report order.
    pub fields: Vec<StatusField>,
    /// Machine position, millimeters.
    pub mpos: Option<[f64; 3]>,
    /// Work position, millimeters.
    pub wpos: Option<[f64; 3]>,
    /// Work coordinate offset, millimeters.
    pub wco: Option<[f64; 3]>,
    /// Planner blocks available.
    pub block_buffer_available: u32,
    /// Serial receive bytes available.
    pub serial_buffer_available: u32,
    /// Line number currently executing.
    pub line: u32,
    pub feed_speed: f64,
    pub spindle_speed: f64,
    pub pins: Pins,
    pub overrides: Overrides,
    pub aux: Aux,
}

impl Status {
    /// Parse a status report, with or without its `<`/`>` delimiters.
    pub fn parse(report: &str) -> Result<Status, StatusError> {
        let report = report.strip_prefix('<').unwrap_or(report);
        let report = report.strip_suffix('>').unwrap_or(report);
        if report.is_empty() {
            return Err(StatusError::Empty);
        }

        let mut parts = report.split('|');
        let mut s = Status {
            state: MachineState::parse(parts.next().unwrap_or_default()),
            ..Status::default()
        };

        for part in parts {
            let Some((key, val)) = part.split_once(':') else {
                continue;
            };
            match key {
                "MPos" => {
                    s.mpos = Some(parse_coords("MPos", val)?);
                    s.fields.push(StatusField::MachinePosition);
                }
                "WPos" => {
                    s.wpos = Some(parse_coords("WPos", val)?);
                    s.fields.push(StatusField::WorkPosition);
                }
                "WCO" => {
                    s.wco = Some(parse_coords("WCO", val)?);
                    s.fields.push(StatusField::WorkOffset);
                }
                "Bf" => {
                    let ints = parse_u32_list("Bf", val)?;
                    if let [blocks, bytes] = ints[..] {
                        s.block_buffer_available = blocks;
                        s.serial_buffer_available = bytes;
                    }
                    s.fields.push(StatusField::Buffer);
                }
                "Ln" => {
                    s.line = parse_u32("Ln", val)?;
                    s.fields.push(StatusField::Line);
                }
                "FS" => {
                    let floats = parse_f64_list("FS", val)?;
                    if let [feed, spindle] = floats[..] {
                        s.feed_speed = feed;
                        s.spindle_speed = spindle;
                    }
                    s.fields.push(StatusField::FeedSpindle);
                }
                "F" => {
                    s.feed_speed = parse_f64("F", val)?;
                    s.fields.push(StatusField::Feed);
                }
                "Pn" => {
                    for c in val.chars() {
                        match c {
                            'P' => s.pins.probe = true,
                            'X' => s.pins.limit_x = true,
                            'Y' => s.pins.limit_y = true,
                            'Z' => s.pins.limit_z = true,
                            'D' => s.pins.door = true,
                            'H' => s.pins.feed_hold = true,
                            'S' => s.pins.cycle_start = true,
                            _ => {}
                        }
                    }
                    s.fields.push(StatusField::Pins);
                }
                "Ov" => {
                    let ints = parse_u32_list("Ov", val)?;
                    if let [feed, rapid, spindle] = ints[..] {
                        s.overrides.feed = feed as u16;
                        s.overrides.rapid = rapid as u16;
                        s.overrides.spindle = spindle as u16;
                    }
                    s.fields.push(StatusField::Overrides);
                }
                "A" => {
                    for c in val.chars() {
                        match c {
                            'S' => {
                                s.aux.spindle_on = true;
                                s.aux.spindle_direction = SpindleDirection::Clockwise;
                            }
                            'C' => {
                                s.aux.spindle_on = true;
                                s.aux.spindle_direction = SpindleDirection::CounterClockwise;
                            }
                            'F' => s.aux.coolant_flood = true,
                            'M' => s.aux.coolant_mist = true,
                            _ => {}
                        }
                    }
                    s.fields.push(StatusField::Aux);
                }
                // unknown keys: newer firmware, ignore
                _ => {}
            }
        }

        Ok(s)
    }
}

fn parse_f64(field: &'static str, s: &str) -> Result<f64, StatusError> {
    s.parse().map_err(|err: std::num::ParseFloatError| {
        StatusError::InvalidField {
            field,
            value: s.to_string(),
            reason: err.to_string(),
        }
    })
}

fn parse_u32(field: &'static str, s: &str) -> Result<u32, StatusError> {
    s.parse().map_err(|err: std::num::ParseIntError| {
        StatusError::InvalidField {
            field,
            value: s.to_string(),
            reason: err.to_string(),
        }
    })
}

fn parse_f64_list(field: &'static str, s: &str) -> Result<Vec<f64>, StatusError> {
    s.split(',').map(|p| parse_f64(field, p)).collect()
}

fn parse_u32_list(field: &'static str, s: &str) -> Result<Vec<u32>, StatusError> {
    s.split(',').map(|p| parse_u32(field, p)).collect()
}

fn parse_coords(field: &'static str, s: &str) -> Result<[f64; 3], StatusError> {
    let floats = parse_f64_list(field, s)?;
    match floats[..] {
        [x, y, z] => Ok([x, y, z]),
        _ => Err(StatusError::CoordinateCount {
            field,
            count: floats.len(),
        }),
    }
}

impl fmt::Display for Status {
    /// Render the snapshot back into report form, emitting exactly the
    /// fields in the presence list.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.state)?;
        for field in &self.fields {
            match field {
                StatusField::MachinePosition => {
                    if let Some(p) = self.mpos {
                        write!(f, "|MPos:{:.3},{:.3},{:.3}", p[0], p[1], p[2])?;
                    }
                }
                StatusField::WorkPosition => {
                    if let Some(p) = self.wpos {
                        write!(f, "|WPos:{:.3},{:.3},{:.3}", p[0], p[1], p[2])?;
                    }
                }
                StatusField::WorkOffset => {
                    if let Some(p) = self.wco {
                        write!(f, "|WCO:{:.3},{:.3},{:.3}", p[0], p[1], p[2])?;
                    }
                }
                StatusField::Buffer => {
                    write!(
                        f,
                        "|Bf:{},{}",
                        self.block_buffer_available, self.serial_buffer_available
                    )?;
                }
                StatusField::Line => write!(f, "|Ln:{}", self.line)?,
                StatusField::FeedSpindle => {
                    write!(f, "|FS:{},{}", self.feed_speed, self.spindle_speed)?;
                }
                StatusField::Feed => write!(f, "|F:{}", self.feed_speed)?,
                StatusField::Pins => {
                    write!(f, "|Pn:")?;
                    let p = self.pins;
                    for (set, c) in [
                        (p.probe, 'P'),
                        (p.limit_x, 'X'),
                        (p.limit_y, 'Y'),
                        (p.limit_z, 'Z'),
                        (p.door, 'D'),
                        (p.feed_hold, 'H'),
                        (p.cycle_start, 'S'),
                    ] {
                        if set {
                            write!(f, "{c}")?;
                        }
                    }
                }
                StatusField::Overrides => {
                    let o = self.overrides;
                    write!(f, "|Ov:{},{},{}", o.feed, o.rapid, o.spindle)?;
                }
                StatusField::Aux => {
                    write!(f, "|A:")?;
                    if self.aux.spindle_on {
                        match self.aux.spindle_direction {
                            SpindleDirection::Clockwise => write!(f, "S")?,
                            SpindleDirection::CounterClockwise => write!(f, "C")?,
                        }
                    }
                    if self.aux.coolant_flood {
                        write!(f, "F")?;
                    }
                    if self.aux.coolant_mist {
                        write!(f, "M")?;
                    }
                }
            }
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_report() {
        let s = Status::parse("Idle|MPos:1.000,2.000,3.000|Bf:15,128|FS:500,1000|Ov:100,100,100")
            .unwrap();
        assert_eq!(s.state, MachineState::Idle);
        assert_eq!(s.mpos, Some([1.0, 2.0, 3.0]));
        assert_eq!(s.block_buffer_available, 15);
        assert_eq!(s.serial_buffer_available, 128);
        assert_eq!(s.feed_speed, 500.0);
        assert_eq!(s.spindle_speed, 1000.0);
        assert_eq!(s.overrides.feed, 100);
        assert_eq!(
            s.fields,
            vec![
                StatusField::MachinePosition,
                StatusField::Buffer,
                StatusField::FeedSpindle,
                StatusField::Overrides,
            ]
        );
    }

    #[test]
    fn test_parse_with_delimiters() {
        let s = Status::parse("<Run|WPos:5.0,5.0,5.0>").unwrap();
        assert_eq!(s.state, MachineState::Run);
        assert_eq!(s.wpos, Some([5.0, 5.0, 5.0]));
        assert_eq!(s.mpos, None);
    }

    #[test]
    fn test_parse_hold_and_door_states() {
        assert_eq!(
            Status::parse("Hold:1").unwrap().state,
            MachineState::HoldActive
        );
        assert_eq!(
            Status::parse("Hold:0").unwrap().state,
            MachineState::HoldComplete
        );
        assert_eq!(
            Status::parse("Door:2").unwrap().state,
            MachineState::DoorOpening
        );
    }

    #[test]
    fn test_parse_unknown_state_preserved() {
        let s = Status::parse("Tool|MPos:0.000,0.000,0.000").unwrap();
        assert_eq!(s.state, MachineState::Unknown("Tool".to_string()));
    }

    #[test]
    fn test_parse_pins() {
        let s = Status::parse("Alarm|Pn:PXZ").unwrap();
        assert!(s.pins.probe);
        assert!(s.pins.limit_x);
        assert!(!s.pins.limit_y);
        assert!(s.pins.limit_z);
        assert_eq!(s.fields, vec![StatusField::Pins]);
    }

    #[test]
    fn test_parse_aux() {
        let s = Status::parse("Run|A:CF").unwrap();
        assert!(s.aux.spindle_on);
        assert_eq!(s.aux.spindle_direction, SpindleDirection::CounterClockwise);
        assert!(s.aux.coolant_flood);
        assert!(!s.aux.coolant_mist);
    }

    #[test]
    fn test_parse_single_feed() {
        let s = Status::parse("Run|F:750").unwrap();
        assert_eq!(s.feed_speed, 750.0);
        assert_eq!(s.fields, vec![StatusField::Feed]);
    }

    #[test]
    fn test_parse_line_number() {
        let s = Status::parse("Run|Ln:42").unwrap();
        assert_eq!(s.line, 42);
    }

    #[test]
    fn test_unknown_key_ignored() {
        let s = Status::parse("Idle|Frobnicate:1,2,3|Ln:7").unwrap();
        assert_eq!(s.line, 7);
        assert_eq!(s.fields, vec![StatusField::Line]);
    }

    #[test]
    fn test_bad_coordinate_names_field() {
        let err = Status::parse("Idle|MPos:1.0,nope,3.0").unwrap_err();
        match err {
            StatusError::InvalidField { field, value, .. } => {
                assert_eq!(field, "MPos");
                assert_eq!(value, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_coordinate_count() {
        let err = Status::parse("Idle|WCO:1.0,2.0").unwrap_err();
        assert!(matches!(
            err,
            StatusError::CoordinateCount { field: "WCO", count: 2 }
        ));
    }

    #[test]
    fn test_empty_report() {
        assert!(matches!(Status::parse(""), Err(StatusError::Empty)));
    }

    #[test]
    fn test_display_round_trip() {
        let s = Status::parse(
            "Run|MPos:1.500,-2.000,0.000|WCO:0.000,0.000,1.000|Bf:10,20|Ln:3|FS:500,1000|Pn:PH|Ov:100,50,200|A:SF",
        )
        .unwrap();
        let rendered = s.to_string();
        let reparsed = Status::parse(&rendered).unwrap();
        assert_eq!(s, reparsed);
    }

    #[test]
    fn test_display_unknown_state_round_trip() {
        let s = Status::parse("Hold|F:10").unwrap();
        let reparsed = Status::parse(&s.to_string()).unwrap();
        assert_eq!(s, reparsed);
    }
}
