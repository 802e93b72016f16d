//! Drive motor selection and set-point shaping
//!
//! The controller closes the speed loop itself; the host only decides which
//! motor gets which set-point and keeps it within what the controller
//! accepts.

use pwrs_protocol::Side;

/// Largest speed the controller accepts, in encoder clicks per second
pub const MAX_SPEED: i16 = 320;

/// Which motor(s) a speed command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorSelector {
    Left,
    Right,
    /// Both motors, sent as two requests: left then right
    Both,
}

impl MotorSelector {
    /// Sides addressed, in transmit order
    pub fn sides(self) -> &'static [Side] {
        match self {
            MotorSelector::Left => &[Side::Left],
            MotorSelector::Right => &[Side::Right],
            MotorSelector::Both => &[Side::Left, Side::Right],
        }
    }
}

impl From<Side> for MotorSelector {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => MotorSelector::Left,
            Side::Right => MotorSelector::Right,
        }
    }
}

/// Clamp a requested speed to `±max_speed`
pub fn clamp_speed(speed: i32, max_speed: i16) -> i16 {
    let limit = i32::from(max_speed.unsigned_abs().min(i16::MAX as u16));
    // Within ±i16::MAX after the clamp
    speed.clamp(-limit, limit) as i16
}

/// Travel limit to send with a set-point
///
/// The controller stops a motor after this many clicks unless a newer
/// request arrives. It is capped at the speed itself, so an unrefreshed
/// request never runs for more than about a second, and at what one byte
/// can carry.
pub fn clicks_hint(speed: i16, max_clicks: u16) -> u8 {
    let clicks = max_clicks.min(speed.unsigned_abs());
    u8::try_from(clicks).unwrap_or(u8::MAX)
}
