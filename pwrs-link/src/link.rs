//! Motor controller link driver
//!
//! One [`Link`] owns the serial port, the frame in flight and the telemetry
//! cache. Speed commands are fire-and-forget: the controller does not
//! acknowledge them, and the next periodic command for a motor supersedes
//! the last. Corrupt incoming frames are dropped quietly since the
//! controller resends telemetry periodically.

use std::io;

use log::{debug, error, info, trace, warn};
use pwrs_core::{clamp_speed, clicks_hint, Dispatch, Fault, MotorSelector, TelemetryCache};
use pwrs_hal::{UartConfig, UartRx, UartTx};
use pwrs_protocol::{Frame, FrameError, FrameReceiver, Message, Side, SpeedRequest};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::port::SerialDevice;
use crate::sim::SimulatedPort;

/// Upper bound on reads per poll, so a chattering controller cannot hold
/// the control loop
const MAX_READS_PER_POLL: usize = 16;

/// Called when the controller reports a fault the link cannot recover from
pub type FatalHandler = fn(Fault) -> !;

/// Default [`FatalHandler`]: stop the process
///
/// Without current sensing the motors cannot be driven safely.
pub fn abort_on_fault(fault: Fault) -> ! {
    error!("Unrecoverable motor controller fault: {:?}, aborting", fault);
    std::process::abort()
}

/// Receive and transmit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Raw bytes read from the port
    pub bytes_received: u64,
    /// Valid messages handed to the dispatcher
    pub frames_dispatched: u64,
    /// Frames dropped for a checksum mismatch
    pub checksum_errors: u64,
    /// Frames dropped for a malformed escape sequence
    pub escape_errors: u64,
    /// Frames dropped for an unknown command code
    pub unknown_commands: u64,
    /// Frames dropped for a bad length or field value
    pub malformed_frames: u64,
    /// Speed requests written in full
    pub speed_requests_sent: u64,
}

/// Link to the motor controller
pub struct Link<P = SerialDevice> {
    port: Option<P>,
    uart: UartConfig,
    receiver: FrameReceiver,
    telemetry: TelemetryCache,
    rx_buf: Vec<u8>,
    next_ctx: u32,
    max_speed: i16,
    stats: LinkStats,
    on_fatal: FatalHandler,
}

impl<P: core::fmt::Debug> core::fmt::Debug for Link<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Link")
            .field("port", &self.port)
            .field("receiver", &self.receiver)
            .field("telemetry", &self.telemetry)
            .field("next_ctx", &self.next_ctx)
            .field("max_speed", &self.max_speed)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Link<SerialDevice> {
    /// Open the controller on `path` with default settings
    pub fn open(path: &str) -> Result<Self, LinkError> {
        Self::open_with_config(&LinkConfig::for_device(path))
    }

    /// Open the controller described by `config`
    pub fn open_with_config(config: &LinkConfig) -> Result<Self, LinkError> {
        let device = SerialDevice::open(&config.device, &config.uart_config())?;
        Ok(Self::with_port(device, config))
    }

    /// Close the current device, if any, and open `path` in its place
    ///
    /// Telemetry and any partial frame from the old device are discarded.
    pub fn reopen(&mut self, path: &str) -> Result<(), LinkError> {
        self.close();
        let device = SerialDevice::open(path, &self.uart)?;
        self.attach(device);
        Ok(())
    }
}

impl Link<SimulatedPort> {
    /// Link with no hardware behind it; set-points are logged
    pub fn simulated(config: &LinkConfig) -> Self {
        info!("Motor controller simulation enabled");
        Self::with_port(SimulatedPort::new(), config)
    }
}

impl<P> Link<P>
where
    P: UartTx<Error = io::Error> + UartRx<Error = io::Error>,
{
    /// Wrap an already open port
    pub fn with_port(port: P, config: &LinkConfig) -> Self {
        Self {
            port: Some(port),
            uart: config.uart_config(),
            receiver: FrameReceiver::new(),
            telemetry: TelemetryCache::new(),
            rx_buf: vec![0; config.read_chunk.max(1)],
            next_ctx: 0,
            max_speed: config.max_speed,
            stats: LinkStats::default(),
            on_fatal: abort_on_fault,
        }
    }

    /// Replace the handler for unrecoverable faults
    pub fn with_fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.on_fatal = handler;
        self
    }

    /// Close the current port, if any, and use `port` from now on
    pub fn attach(&mut self, port: P) {
        self.close();
        self.port = Some(port);
    }

    /// Release the port
    ///
    /// Pending output is flushed first. The frame in flight and all cached
    /// telemetry are discarded. Calling this on a closed link does nothing.
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush() {
                warn!("Flush on close failed: {}", e);
            }
            info!("Motor controller link closed");
        }
        self.receiver.reset();
        self.telemetry.clear();
    }

    /// True while a port is attached
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// The attached port
    pub fn port(&self) -> Option<&P> {
        self.port.as_ref()
    }

    /// The attached port, mutably
    pub fn port_mut(&mut self) -> Option<&mut P> {
        self.port.as_mut()
    }

    /// Command one or both motors
    ///
    /// `speed` is clamped to the configured maximum. The controller stops
    /// the motor after `max_clicks` encoder clicks, or fewer, unless a newer
    /// command arrives. [`MotorSelector::Both`] sends two independent
    /// requests, left then right; both are attempted and the first error is
    /// returned.
    pub fn send_speed(
        &mut self,
        motors: MotorSelector,
        speed: i32,
        max_clicks: u16,
    ) -> Result<(), LinkError> {
        if self.port.is_none() {
            return Err(LinkError::not_open());
        }

        let speed = clamp_speed(speed, self.max_speed);
        let clicks = clicks_hint(speed, max_clicks);

        let mut result = Ok(());
        for &side in motors.sides() {
            let request = SpeedRequest {
                ctx: self.next_ctx(),
                side,
                clicks,
                speed,
            };
            trace!("Speed request {:?}", request);
            match self.send_message(&Message::SpeedRequest(request)) {
                Ok(()) => self.stats.speed_requests_sent += 1,
                Err(e) => {
                    warn!("Speed request for {:?} failed: {}", side, e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    /// Drain whatever the controller has sent since the last call
    ///
    /// Never waits for input. Returns the number of messages dispatched,
    /// zero when nothing was pending.
    pub fn poll(&mut self) -> Result<usize, LinkError> {
        let mut dispatched = 0;

        for _ in 0..MAX_READS_PER_POLL {
            let port = self.port.as_mut().ok_or_else(LinkError::not_open)?;
            let n = port.read_available(&mut self.rx_buf).map_err(|e| {
                warn!("Serial read failed: {}", e);
                LinkError::Serial(e)
            })?;
            if n == 0 {
                break;
            }

            trace!("RX: {} bytes", n);
            self.stats.bytes_received += n as u64;
            for i in 0..n {
                let byte = self.rx_buf[i];
                dispatched += self.process_byte(byte);
            }

            if n < self.rx_buf.len() {
                break;
            }
        }

        Ok(dispatched)
    }

    /// Latest motor current on `channel`, in amps
    pub fn read_current(&self, channel: usize) -> f64 {
        self.telemetry.current(channel)
    }

    /// Latest ultrasonic range on `sensor`, in centimetres
    pub fn read_range(&self, sensor: usize) -> f64 {
        self.telemetry.range(sensor)
    }

    /// Latest speed the controller reported for `side`
    pub fn read_speed(&self, side: Side) -> Option<i16> {
        self.telemetry.speed(side)
    }

    /// The telemetry cache
    pub fn telemetry(&self) -> &TelemetryCache {
        &self.telemetry
    }

    /// Receive and transmit counters
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn next_ctx(&mut self) -> u32 {
        let ctx = self.next_ctx;
        self.next_ctx = self.next_ctx.wrapping_add(1);
        ctx
    }

    fn send_message(&mut self, message: &Message) -> Result<(), LinkError> {
        let wire = message
            .to_frame()
            .and_then(|frame| frame.encode())
            .map_err(LinkError::Encode)?;

        let port = self.port.as_mut().ok_or_else(LinkError::not_open)?;
        let written = port.write(&wire)?;
        if written != wire.len() {
            return Err(LinkError::ShortWrite {
                written,
                expected: wire.len(),
            });
        }

        trace!("TX: {} bytes", wire.len());
        Ok(())
    }

    fn process_byte(&mut self, byte: u8) -> usize {
        match self.receiver.feed(byte) {
            Ok(Some(frame)) => self.handle_frame(&frame),
            Ok(None) => 0,
            Err(e) => {
                self.record_drop(e);
                0
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> usize {
        let message = match Message::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                self.record_drop(e);
                return 0;
            }
        };

        self.stats.frames_dispatched += 1;
        match self.telemetry.dispatch(&message) {
            Dispatch::Current { channel, amps } => {
                debug!("Motor {} current {:.2} A", channel, amps)
            }
            Dispatch::Range { sensor, cm } => debug!("Sensor {} range {:.1} cm", sensor, cm),
            Dispatch::Speed { side, speed } => debug!("{:?} motor at {}", side, speed),
            Dispatch::Ignored => debug!("Ignoring {:?}", message),
            Dispatch::Fatal(fault) => (self.on_fatal)(fault),
        }
        1
    }

    fn record_drop(&mut self, e: FrameError) {
        let counter = match e {
            FrameError::InvalidChecksum => &mut self.stats.checksum_errors,
            FrameError::InvalidEscape => &mut self.stats.escape_errors,
            FrameError::UnknownCommand => &mut self.stats.unknown_commands,
            _ => &mut self.stats.malformed_frames,
        };
        *counter += 1;
        warn!("Dropping frame: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwrs_core::telemetry::DEFAULT_RANGE_CM;
    use pwrs_protocol::{
        checksum, CurrentIndication, CurrentOverflowIndication, RangeIndication, SpeedIndication,
        COMMAND_COUNT, DELIMITER,
    };
    use proptest::prelude::*;

    fn sim_link() -> Link<SimulatedPort> {
        Link::simulated(&LinkConfig::default())
    }

    fn port(link: &mut Link<SimulatedPort>) -> &mut SimulatedPort {
        link.port_mut().unwrap()
    }

    fn sent_requests(link: &mut Link<SimulatedPort>) -> Vec<SpeedRequest> {
        port(link)
            .take_sent_messages()
            .into_iter()
            .map(|m| match m {
                Message::SpeedRequest(req) => req,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    fn current_wire(current: u16, motor: u8) -> Vec<u8> {
        Message::Current(CurrentIndication { current, motor })
            .to_frame()
            .unwrap()
            .encode()
            .unwrap()
            .to_vec()
    }

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn panic_on_fault(fault: Fault) -> ! {
        panic!("fatal: {fault:?}")
    }

    #[test]
    fn test_speed_clamped_to_max() {
        let mut link = sim_link();

        link.send_speed(MotorSelector::Left, 5000, 1000).unwrap();
        link.send_speed(MotorSelector::Right, -5000, 1000).unwrap();

        let requests = sent_requests(&mut link);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].speed, 320);
        assert_eq!(requests[0].side, Side::Left);
        assert_eq!(requests[1].speed, -320);
        assert_eq!(requests[1].side, Side::Right);
    }

    #[test]
    fn test_configured_max_speed() {
        let config = LinkConfig {
            max_speed: 100,
            ..LinkConfig::default()
        };
        let mut link = Link::simulated(&config);
        link.send_speed(MotorSelector::Left, 250, 10).unwrap();
        assert_eq!(sent_requests(&mut link)[0].speed, 100);
    }

    #[test]
    fn test_both_sends_left_then_right_with_own_ctx() {
        let mut link = sim_link();
        link.send_speed(MotorSelector::Left, 10, 10).unwrap();
        link.send_speed(MotorSelector::Both, 120, 50).unwrap();

        let requests = sent_requests(&mut link);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].side, Side::Left);
        assert_eq!(requests[2].side, Side::Right);
        assert_eq!(requests[0].ctx, 0);
        assert_eq!(requests[1].ctx, 1);
        assert_eq!(requests[2].ctx, 2);
        assert!(requests[1..].iter().all(|r| r.speed == 120 && r.clicks == 50));
        assert_eq!(link.stats().speed_requests_sent, 3);
    }

    #[test]
    fn test_clicks_capped_by_speed() {
        let mut link = sim_link();
        link.send_speed(MotorSelector::Left, -30, 1000).unwrap();
        assert_eq!(sent_requests(&mut link)[0].clicks, 30);
    }

    #[test]
    fn test_short_write_is_serial_error() {
        let mut link = sim_link();
        port(&mut link).limit_writes(Some(3));

        let err = link.send_speed(MotorSelector::Both, 100, 100).unwrap_err();
        assert!(matches!(
            err,
            LinkError::ShortWrite {
                written: 3,
                ..
            }
        ));
        assert!(err.is_serial());
        assert_eq!(link.stats().speed_requests_sent, 0);
    }

    #[test]
    fn test_poll_with_nothing_pending() {
        let mut link = sim_link();
        let before = link.telemetry().clone();

        assert_eq!(link.poll().unwrap(), 0);
        assert_eq!(link.telemetry(), &before);
        assert_eq!(link.stats(), LinkStats::default());
    }

    #[test]
    fn test_current_indication_reaches_cache() {
        let mut link = sim_link();
        port(&mut link)
            .inject_message(&Message::Current(CurrentIndication {
                current: 2000,
                motor: 1,
            }))
            .unwrap();

        assert_eq!(link.poll().unwrap(), 1);
        assert!(close(link.read_current(1), 9.8, 1e-9));
        assert!(close(link.read_current(0), 0.0, 1e-12));
    }

    #[test]
    fn test_range_indication_reaches_cache() {
        let mut link = sim_link();
        assert!(close(link.read_range(0), DEFAULT_RANGE_CM, 1e-12));

        port(&mut link)
            .inject_message(&Message::Range(RangeIndication {
                range: 5831,
                sensor: 0,
            }))
            .unwrap();

        assert_eq!(link.poll().unwrap(), 1);
        assert!(close(link.read_range(0), 100.0, 1e-2));
    }

    #[test]
    fn test_speed_echo_reaches_cache() {
        let mut link = sim_link();
        port(&mut link)
            .inject_message(&Message::SpeedIndication(SpeedIndication {
                ctx: 9,
                side: Side::Left,
                speed: 200,
            }))
            .unwrap();

        link.poll().unwrap();
        assert_eq!(link.read_speed(Side::Left), Some(200));
        assert_eq!(link.read_speed(Side::Right), None);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut link = sim_link();
        let wire = current_wire(2000, 1);

        let mut dispatched = 0;
        for &byte in &wire {
            port(&mut link).inject(&[byte]);
            dispatched += link.poll().unwrap();
        }

        assert_eq!(dispatched, 1);
        assert!(close(link.read_current(1), 9.8, 1e-9));
    }

    #[test]
    fn test_small_read_chunk_drains_in_one_poll() {
        let config = LinkConfig {
            read_chunk: 2,
            ..LinkConfig::default()
        };
        let mut link = Link::simulated(&config);
        port(&mut link).inject(&current_wire(2000, 1));

        assert_eq!(link.poll().unwrap(), 1);
        assert_eq!(port(&mut link).pending(), 0);
    }

    #[test]
    fn test_garbage_then_frame() {
        let mut link = sim_link();
        port(&mut link).inject(&[0x00, 0xFF, 0x12, DELIMITER, 0x03, 0x03, 0xD0]);
        port(&mut link).inject(&current_wire(1000, 2));

        assert_eq!(link.poll().unwrap(), 1);
        assert!(close(link.read_current(2), 4.9, 1e-9));
    }

    #[test]
    fn test_corrupt_frame_dropped_silently() {
        let mut link = sim_link();
        let mut wire = current_wire(2000, 1);
        let last = wire.len() - 1;
        wire[last] ^= 0x04;
        port(&mut link).inject(&wire);

        assert_eq!(link.poll().unwrap(), 0);
        assert!(close(link.read_current(1), 0.0, 1e-12));
        assert_eq!(link.stats().checksum_errors, 1);
        assert_eq!(link.stats().frames_dispatched, 0);
    }

    #[test]
    fn test_unknown_command_discarded() {
        let mut link = sim_link();
        let bogus = COMMAND_COUNT + 3;
        port(&mut link).inject(&[DELIMITER, bogus, 0x00, checksum(bogus, 0, &[])]);

        assert_eq!(link.poll().unwrap(), 0);
        assert_eq!(link.stats().unknown_commands, 1);
        assert_eq!(link.telemetry(), &TelemetryCache::new());
    }

    #[test]
    fn test_wrong_length_discarded() {
        let mut link = sim_link();
        let frame = Frame::new(pwrs_protocol::Command::CurrentIndication, &[0xD0, 0x07]).unwrap();
        port(&mut link).inject(&frame.encode().unwrap());

        assert_eq!(link.poll().unwrap(), 0);
        assert_eq!(link.stats().malformed_frames, 1);
    }

    #[test]
    #[should_panic(expected = "CurrentOverflow")]
    fn test_current_overflow_is_fatal() {
        let mut link = sim_link().with_fatal_handler(panic_on_fault);
        port(&mut link)
            .inject_message(&Message::CurrentOverflow(CurrentOverflowIndication {
                motor: 0,
            }))
            .unwrap();
        let _ = link.poll();
    }

    #[test]
    fn test_read_error_is_serial_error() {
        let mut link = sim_link();
        port(&mut link).fail_next_read(io::ErrorKind::BrokenPipe);

        let err = link.poll().unwrap_err();
        assert!(matches!(err, LinkError::Serial(_)));
        // The link is still usable afterwards
        assert_eq!(link.poll().unwrap(), 0);
    }

    #[test]
    fn test_closed_link_reports_no_device() {
        let mut link = sim_link();
        link.close();
        assert!(!link.is_open());

        assert!(link.poll().unwrap_err().is_no_device());
        assert!(link
            .send_speed(MotorSelector::Both, 10, 10)
            .unwrap_err()
            .is_no_device());

        // Closing twice is harmless
        link.close();
    }

    #[test]
    fn test_reattach_discards_partial_frame_and_telemetry() {
        let mut link = sim_link();
        port(&mut link).inject(&current_wire(2000, 1));
        link.poll().unwrap();

        let wire = current_wire(1000, 0);
        let (head, tail) = wire.split_at(4);
        port(&mut link).inject(head);
        link.poll().unwrap();

        link.attach(SimulatedPort::new());
        assert!(close(link.read_current(1), 0.0, 1e-12));

        port(&mut link).inject(tail);
        assert_eq!(link.poll().unwrap(), 0);
        assert!(close(link.read_current(0), 0.0, 1e-12));
    }

    #[test]
    fn test_open_missing_device() {
        let err = Link::open("/dev/pwrs-no-such-tty").unwrap_err();
        assert!(err.is_no_device());
    }

    proptest! {
        #[test]
        fn prop_any_chunking_dispatches_once(
            current in any::<u16>(),
            motor in 0u8..4,
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let mut link = sim_link();
            let wire = current_wire(current, motor);

            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(wire.len() + 1)).collect();
            points.push(0);
            points.push(wire.len());
            points.sort_unstable();
            points.dedup();

            let mut dispatched = 0;
            for pair in points.windows(2) {
                port(&mut link).inject(&wire[pair[0]..pair[1]]);
                dispatched += link.poll().unwrap();
            }

            prop_assert_eq!(dispatched, 1);
            let expected = f64::from(current) * 4.9 / 1000.0;
            prop_assert!(close(link.read_current(usize::from(motor)), expected, 1e-9));
        }
    }
}
