//! Output side of the engine
//!
//! [`ControllerSink`] is the boundary to whatever exposes the virtual pad to
//! the OS. Every setter reports whether the update was accepted; the engine
//! only calls [`submit`](ControllerSink::submit) after an accepted update.
//!
//! [`VirtualPad`] is the in-process sink shipped with the binary. It keeps a
//! driver-shaped [`PadReport`] and publishes it through a watch channel on
//! every submit.

use crate::controller::state::{Button, Buttons, DPad};
use chrono::{DateTime, Local};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Controller sink is not connected")]
    NotConnected,

    #[error("Controller sink rejected the update: {0}")]
    Rejected(String),
}

/// Receiver of output commands
pub trait ControllerSink: Send + 'static {
    fn set_left_stick(&mut self, x: f32, y: f32) -> Result<(), SinkError>;

    fn set_right_stick(&mut self, x: f32, y: f32) -> Result<(), SinkError>;

    fn set_left_trigger(&mut self, value: f32) -> Result<(), SinkError>;

    fn set_right_trigger(&mut self, value: f32) -> Result<(), SinkError>;

    fn set_button(&mut self, button: Button, down: bool) -> Result<(), SinkError>;

    fn set_dpad(&mut self, direction: DPad) -> Result<(), SinkError>;

    /// Commits everything set since the last submit as one report.
    fn submit(&mut self) -> Result<(), SinkError>;
}

/// Report in the shape a virtual Xbox 360 pad expects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadReport {
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub buttons: Buttons,
    pub timestamp: DateTime<Local>,
}

impl Default for PadReport {
    fn default() -> Self {
        Self {
            left_x: 0,
            left_y: 0,
            right_x: 0,
            right_y: 0,
            left_trigger: 0,
            right_trigger: 0,
            buttons: Buttons::empty(),
            timestamp: Local::now(),
        }
    }
}

impl PadReport {
    pub fn is_neutral(&self) -> bool {
        self.left_x == 0
            && self.left_y == 0
            && self.right_x == 0
            && self.right_y == 0
            && self.left_trigger == 0
            && self.right_trigger == 0
            && self.buttons.is_empty()
    }
}

/// Positive deflection scales to 32767, negative to 32768.
pub fn stick_to_axis(value: f32) -> i16 {
    let clamped = value.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * f32::from(i16::MAX)).round() as i16
    } else {
        (clamped * -f32::from(i16::MIN)).round() as i16
    }
}

pub fn trigger_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * f32::from(u8::MAX)).round() as u8
}

/// In-process virtual pad publishing reports over a watch channel
#[derive(Debug)]
pub struct VirtualPad {
    report: PadReport,
    connected: bool,
    submitted: u64,
    report_sender: watch::Sender<PadReport>,
}

impl Default for VirtualPad {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPad {
    /// Creates a disconnected pad.
    pub fn new() -> Self {
        let (report_sender, _) = watch::channel(PadReport::default());
        Self {
            report: PadReport::default(),
            connected: false,
            submitted: 0,
            report_sender,
        }
    }

    pub fn connect(&mut self) {
        if self.connected {
            return;
        }
        info!("Virtual pad connected");
        self.report = PadReport::default();
        self.connected = true;
    }

    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        info!("Virtual pad disconnected after {} reports", self.submitted);
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn subscribe(&self) -> watch::Receiver<PadReport> {
        self.report_sender.subscribe()
    }

    pub fn report(&self) -> &PadReport {
        &self.report
    }

    fn ensure_connected(&self) -> Result<(), SinkError> {
        if self.connected {
            Ok(())
        } else {
            Err(SinkError::NotConnected)
        }
    }
}

impl ControllerSink for VirtualPad {
    fn set_left_stick(&mut self, x: f32, y: f32) -> Result<(), SinkError> {
        self.ensure_connected()?;
        self.report.left_x = stick_to_axis(x);
        self.report.left_y = stick_to_axis(y);
        Ok(())
    }

    fn set_right_stick(&mut self, x: f32, y: f32) -> Result<(), SinkError> {
        self.ensure_connected()?;
        self.report.right_x = stick_to_axis(x);
        self.report.right_y = stick_to_axis(y);
        Ok(())
    }

    fn set_left_trigger(&mut self, value: f32) -> Result<(), SinkError> {
        self.ensure_connected()?;
        self.report.left_trigger = trigger_to_byte(value);
        Ok(())
    }

    fn set_right_trigger(&mut self, value: f32) -> Result<(), SinkError> {
        self.ensure_connected()?;
        self.report.right_trigger = trigger_to_byte(value);
        Ok(())
    }

    fn set_button(&mut self, button: Button, down: bool) -> Result<(), SinkError> {
        self.ensure_connected()?;
        self.report.buttons.set(button.flag(), down);
        Ok(())
    }

    fn set_dpad(&mut self, direction: DPad) -> Result<(), SinkError> {
        self.ensure_connected()?;
        let dpad_bits = DPad::NorthEast.buttons() | DPad::SouthWest.buttons();
        self.report.buttons.remove(dpad_bits);
        self.report.buttons.insert(direction.buttons());
        Ok(())
    }

    fn submit(&mut self) -> Result<(), SinkError> {
        self.ensure_connected()?;
        self.report.timestamp = Local::now();
        self.submitted += 1;

        // send_replace succeeds without receivers; the latest report is kept
        self.report_sender.send_replace(self.report);
        debug!(
            "Submitted report #{}: L:({},{}) R:({},{}) LT:{} RT:{} Buttons:{:#06x}",
            self.submitted,
            self.report.left_x,
            self.report.left_y,
            self.report.right_x,
            self.report.right_y,
            self.report.left_trigger,
            self.report.right_trigger,
            self.report.buttons.bits()
        );
        Ok(())
    }
}

impl Drop for VirtualPad {
    fn drop(&mut self) {
        if self.connected {
            warn!("Virtual pad dropped while connected, disconnecting");
            self.disconnect();
        }
    }
}
