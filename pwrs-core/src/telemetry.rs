//! Telemetry cache
//!
//! The controller streams current and range samples without being asked.
//! Each validated indication overwrites the cached value for its channel;
//! callers read the latest value whenever they like. Samples are best
//! effort, a lost one is simply replaced by the next.

use pwrs_protocol::{Message, Side};

/// Number of motor current channels
pub const CURRENT_CHANNELS: usize = 4;

/// Number of ultrasonic range sensors
pub const RANGE_SENSORS: usize = 3;

/// Current sense scale: millivolts per ADC count
pub const SCALE_MV_PER_COUNT: f64 = 4.9;

/// Current sense gain: millivolts per amp
pub const MV_PER_AMP: f64 = 1000.0;

/// Sound travels one centimetre in this many microseconds
pub const MICROSECONDS_PER_CM: f64 = 29.154519;

/// Reported current before the first sample arrives
pub const DEFAULT_CURRENT_AMPS: f64 = 0.0;

/// Reported range before the first sample arrives
pub const DEFAULT_RANGE_CM: f64 = 10.0;

/// Convert a raw current sample to amps
pub fn current_to_amps(raw: u16) -> f64 {
    f64::from(raw) * SCALE_MV_PER_COUNT / MV_PER_AMP
}

/// Convert an echo round-trip time to a one-way distance in centimetres
pub fn range_to_cm(raw_us: u16) -> f64 {
    (f64::from(raw_us) / MICROSECONDS_PER_CM) / 2.0
}

/// Conditions the link cannot recover from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Current sensing saturated on a motor channel
    CurrentOverflow { motor: u8 },
}

/// What the dispatcher did with a message
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    /// Cached a current sample
    Current { channel: usize, amps: f64 },
    /// Cached a range sample
    Range { sensor: usize, cm: f64 },
    /// Cached a speed echo
    Speed { side: Side, speed: i16 },
    /// Message valid but not for us, or for a channel we do not have
    Ignored,
    /// The caller must stop
    Fatal(Fault),
}

/// Last known values reported by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryCache {
    currents: [f64; CURRENT_CHANNELS],
    ranges: [f64; RANGE_SENSORS],
    speeds: [Option<i16>; 2],
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryCache {
    /// Create a cache holding the default readings
    pub fn new() -> Self {
        Self {
            currents: [DEFAULT_CURRENT_AMPS; CURRENT_CHANNELS],
            ranges: [DEFAULT_RANGE_CM; RANGE_SENSORS],
            speeds: [None; 2],
        }
    }

    /// Forget every reading
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Apply a validated message to the cache
    ///
    /// Indications for channel or sensor ids outside the fitted range are
    /// ignored. A current overflow changes nothing and is returned as
    /// [`Dispatch::Fatal`].
    pub fn dispatch(&mut self, message: &Message) -> Dispatch {
        match *message {
            Message::Current(ind) => {
                let channel = usize::from(ind.motor);
                match self.currents.get_mut(channel) {
                    Some(slot) => {
                        let amps = current_to_amps(ind.current);
                        *slot = amps;
                        Dispatch::Current { channel, amps }
                    }
                    None => Dispatch::Ignored,
                }
            }
            Message::Range(ind) => {
                let sensor = usize::from(ind.sensor);
                match self.ranges.get_mut(sensor) {
                    Some(slot) => {
                        let cm = range_to_cm(ind.range);
                        *slot = cm;
                        Dispatch::Range { sensor, cm }
                    }
                    None => Dispatch::Ignored,
                }
            }
            Message::SpeedIndication(ind) => {
                self.speeds[ind.side.index()] = Some(ind.speed);
                Dispatch::Speed {
                    side: ind.side,
                    speed: ind.speed,
                }
            }
            Message::CurrentOverflow(ind) => {
                Dispatch::Fatal(Fault::CurrentOverflow { motor: ind.motor })
            }
            // Host-to-controller traffic has no business arriving here
            Message::SpeedRequest(_) => Dispatch::Ignored,
        }
    }

    /// Latest current on `channel` in amps
    ///
    /// Returns [`DEFAULT_CURRENT_AMPS`] before the first sample or for a
    /// channel that does not exist.
    pub fn current(&self, channel: usize) -> f64 {
        self.currents
            .get(channel)
            .copied()
            .unwrap_or(DEFAULT_CURRENT_AMPS)
    }

    /// Latest range on `sensor` in centimetres
    ///
    /// Returns [`DEFAULT_RANGE_CM`] before the first sample or for a sensor
    /// that does not exist.
    pub fn range(&self, sensor: usize) -> f64 {
        self.ranges.get(sensor).copied().unwrap_or(DEFAULT_RANGE_CM)
    }

    /// Last speed the controller echoed for `side`
    pub fn speed(&self, side: Side) -> Option<i16> {
        self.speeds[side.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwrs_protocol::{
        CurrentIndication, CurrentOverflowIndication, RangeIndication, SpeedIndication,
        SpeedRequest,
    };

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_defaults_before_first_sample() {
        let cache = TelemetryCache::new();
        for channel in 0..CURRENT_CHANNELS {
            assert!(close(cache.current(channel), 0.0, 1e-12));
        }
        for sensor in 0..RANGE_SENSORS {
            assert!(close(cache.range(sensor), 10.0, 1e-12));
        }
        assert_eq!(cache.speed(Side::Left), None);
    }

    #[test]
    fn test_current_sample_in_amps() {
        let mut cache = TelemetryCache::new();
        let outcome = cache.dispatch(&Message::Current(CurrentIndication {
            current: 2000,
            motor: 1,
        }));

        assert!(matches!(outcome, Dispatch::Current { channel: 1, .. }));
        assert!(close(cache.current(1), 9.8, 1e-9));
        assert!(close(cache.current(0), 0.0, 1e-12));
    }

    #[test]
    fn test_range_sample_in_cm() {
        let mut cache = TelemetryCache::new();
        cache.dispatch(&Message::Range(RangeIndication {
            range: 5831,
            sensor: 0,
        }));

        assert!(close(cache.range(0), 100.0, 1e-2));
        assert!(close(cache.range(1), DEFAULT_RANGE_CM, 1e-12));
    }

    #[test]
    fn test_out_of_range_ids_ignored() {
        let mut cache = TelemetryCache::new();
        let before = cache.clone();

        let current = cache.dispatch(&Message::Current(CurrentIndication {
            current: 100,
            motor: CURRENT_CHANNELS as u8,
        }));
        let range = cache.dispatch(&Message::Range(RangeIndication {
            range: 100,
            sensor: RANGE_SENSORS as u8,
        }));

        assert_eq!(current, Dispatch::Ignored);
        assert_eq!(range, Dispatch::Ignored);
        assert_eq!(cache, before);
        assert!(close(cache.current(99), DEFAULT_CURRENT_AMPS, 1e-12));
    }

    #[test]
    fn test_speed_echo_cached() {
        let mut cache = TelemetryCache::new();
        cache.dispatch(&Message::SpeedIndication(SpeedIndication {
            ctx: 3,
            side: Side::Right,
            speed: -150,
        }));
        assert_eq!(cache.speed(Side::Right), Some(-150));
        assert_eq!(cache.speed(Side::Left), None);
    }

    #[test]
    fn test_overflow_is_fatal() {
        let mut cache = TelemetryCache::new();
        let outcome = cache.dispatch(&Message::CurrentOverflow(CurrentOverflowIndication {
            motor: 2,
        }));
        assert_eq!(outcome, Dispatch::Fatal(Fault::CurrentOverflow { motor: 2 }));
    }

    #[test]
    fn test_speed_request_ignored() {
        let mut cache = TelemetryCache::new();
        let outcome = cache.dispatch(&Message::SpeedRequest(SpeedRequest {
            ctx: 0,
            side: Side::Left,
            clicks: 0,
            speed: 10,
        }));
        assert_eq!(outcome, Dispatch::Ignored);
    }

    #[test]
    fn test_clear_restores_defaults() {
        let mut cache = TelemetryCache::new();
        cache.dispatch(&Message::Range(RangeIndication {
            range: 5831,
            sensor: 2,
        }));
        cache.clear();
        assert_eq!(cache, TelemetryCache::new());
    }
}
