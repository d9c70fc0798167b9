//! Telescope state as tracked from TCC replies.

use std::fmt;

use shared::PlateCatalog;
use tracing::{debug, warn};

/// Commanded state of a single telescope axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisCmdState {
    Tracking,
    Halted,
    Halting,
    Slewing,
    Drifting,
    Other(String),
}

impl AxisCmdState {
    /// Parse one entry of an `axiscmdstate` list. Input is expected lower-case.
    pub fn parse(value: &str) -> Self {
        match value.trim().trim_matches('"') {
            "tracking" => AxisCmdState::Tracking,
            "halted" => AxisCmdState::Halted,
            "halting" => AxisCmdState::Halting,
            "slewing" => AxisCmdState::Slewing,
            "drifting" => AxisCmdState::Drifting,
            other => AxisCmdState::Other(other.to_string()),
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, AxisCmdState::Tracking)
    }
}

impl fmt::Display for AxisCmdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisCmdState::Tracking => write!(f, "tracking"),
            AxisCmdState::Halted => write!(f, "halted"),
            AxisCmdState::Halting => write!(f, "halting"),
            AxisCmdState::Slewing => write!(f, "slewing"),
            AxisCmdState::Drifting => write!(f, "drifting"),
            AxisCmdState::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Snapshot of what the TCC has told us.
///
/// `plate_id` is derived: it is recomputed through the plate catalog every
/// time the instrument number changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TccState {
    my_user_id: Option<i32>,
    instrument_num: Option<i32>,
    plate_id: Option<i32>,
    axis_states: Option<Vec<AxisCmdState>>,
    secondary_orientation: Option<String>,
}

impl TccState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session id assigned by the TCC on connect.
    pub fn my_user_id(&self) -> Option<i32> {
        self.my_user_id
    }

    /// Cartridge currently mounted.
    pub fn instrument_num(&self) -> Option<i32> {
        self.instrument_num
    }

    /// Plate on the mounted cartridge, if the catalog knows it.
    pub fn plate_id(&self) -> Option<i32> {
        self.plate_id
    }

    pub fn axis_states(&self) -> Option<&[AxisCmdState]> {
        self.axis_states.as_deref()
    }

    pub fn secondary_orientation(&self) -> Option<&str> {
        self.secondary_orientation.as_deref()
    }

    /// Forget everything, including the session id.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clear the fields a status query must refresh before it completes.
    /// The session id and the last secondary orientation survive.
    pub fn clear_status(&mut self) {
        self.instrument_num = None;
        self.plate_id = None;
        self.axis_states = None;
    }

    /// Record the session id. Only the first assignment sticks.
    pub fn set_my_user_id(&mut self, user_id: i32) {
        match self.my_user_id {
            None => {
                debug!("TCC assigned user id {}", user_id);
                self.my_user_id = Some(user_id);
            }
            Some(existing) if existing != user_id => {
                warn!(
                    "Ignoring user id {} from TCC, already assigned {}",
                    user_id, existing
                );
            }
            Some(_) => {}
        }
    }

    /// Record the mounted cartridge and look up its plate.
    ///
    /// Non-positive instrument numbers mean no cartridge and leave `plate_id`
    /// unset. A catalog failure is logged and also leaves `plate_id` unset.
    pub fn set_instrument_num(&mut self, instrument_num: i32, catalog: &dyn PlateCatalog) {
        self.instrument_num = Some(instrument_num);
        self.plate_id = if instrument_num > 0 {
            match catalog.plate_id(instrument_num) {
                Ok(plate_id) => Some(plate_id),
                Err(e) => {
                    warn!(
                        "Plate lookup failed for instrument {}: {}",
                        instrument_num, e
                    );
                    None
                }
            }
        } else {
            None
        };
    }

    pub fn set_axis_states(&mut self, states: Vec<AxisCmdState>) {
        self.axis_states = Some(states);
    }

    pub fn set_secondary_orientation(&mut self, orientation: String) {
        self.secondary_orientation = Some(orientation);
    }

    /// True once both fields a status query must refresh are present.
    pub fn is_status_complete(&self) -> bool {
        self.instrument_num.is_some() && self.axis_states.is_some()
    }

    /// True when axis states are known, non-empty, and all tracking.
    pub fn is_ok_to_offset(&self) -> bool {
        match &self.axis_states {
            Some(states) => !states.is_empty() && states.iter().all(AxisCmdState::is_tracking),
            None => false,
        }
    }

    /// Why [`is_ok_to_offset`](Self::is_ok_to_offset) is false.
    pub fn not_ready_reason(&self) -> String {
        match &self.axis_states {
            None => "axis states unknown".to_string(),
            Some(states) if states.is_empty() => "no axis states reported".to_string(),
            Some(states) => {
                let list: Vec<String> = states.iter().map(|s| s.to_string()).collect();
                format!("axes not all tracking: {}", list.join(","))
            }
        }
    }
}
