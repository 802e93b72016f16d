//! In-memory stand-in for the motor controller
//!
//! Used when no controller is attached: set-points are decoded and logged
//! instead of being sent anywhere. Bytes can be queued for the receive side,
//! which lets bench code and tests play the controller's part.

use std::collections::VecDeque;
use std::io;

use log::{info, warn};
use pwrs_hal::{UartRx, UartTx};
use pwrs_protocol::{FrameError, FrameReceiver, Message, Side};

/// Simulated serial port
#[derive(Debug, Default)]
pub struct SimulatedPort {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    monitor: FrameReceiver,
    write_limit: Option<usize>,
    read_error: Option<io::ErrorKind>,
}

impl SimulatedPort {
    /// Create an idle port
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes for the host to read
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Queue one encoded message for the host to read
    pub fn inject_message(&mut self, message: &Message) -> Result<(), FrameError> {
        let wire = message.to_frame()?.encode()?;
        self.inject(&wire);
        Ok(())
    }

    /// Bytes queued but not yet read
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Take everything the host has written so far
    pub fn take_written(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.written)
    }

    /// Take and decode everything the host has written so far
    ///
    /// Frames that fail to decode are skipped.
    pub fn take_sent_messages(&mut self) -> Vec<Message> {
        let mut receiver = FrameReceiver::new();
        self.take_written()
            .into_iter()
            .filter_map(|byte| receiver.feed(byte).ok().flatten())
            .filter_map(|frame| Message::from_frame(&frame).ok())
            .collect()
    }

    /// Accept at most `limit` bytes per write, to provoke short writes
    pub fn limit_writes(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    /// Fail the next read with `kind`
    pub fn fail_next_read(&mut self, kind: io::ErrorKind) {
        self.read_error = Some(kind);
    }

    fn log_outgoing(&mut self, data: &[u8]) {
        for &byte in data {
            match self.monitor.feed(byte) {
                Ok(Some(frame)) => match Message::from_frame(&frame) {
                    Ok(Message::SpeedRequest(req)) => {
                        let side = match req.side {
                            Side::Left => 'L',
                            Side::Right => 'R',
                        };
                        info!(
                            "Set {}={:+} clicks={} ctx={}",
                            side, req.speed, req.clicks, req.ctx
                        );
                    }
                    Ok(other) => info!("TX {:?}", other),
                    Err(e) => warn!("TX undecodable frame: {:?}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("TX framing error: {:?}", e),
            }
        }
    }
}

impl UartTx for SimulatedPort {
    type Error = io::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let accepted = self.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        let data = &data[..accepted];
        self.written.extend_from_slice(data);
        self.log_outgoing(data);
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl UartRx for SimulatedPort {
    type Error = io::Error;

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if let Some(kind) = self.read_error.take() {
            return Err(io::Error::from(kind));
        }

        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> Result<(), Self::Error> {
        self.rx.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwrs_protocol::{RangeIndication, SpeedRequest};

    #[test]
    fn test_read_drains_in_order() {
        let mut port = SimulatedPort::new();
        port.inject(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(port.read_available(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(port.pending(), 2);
        assert_eq!(port.read_available(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(port.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_written_frames_decode() {
        let mut port = SimulatedPort::new();
        let request = Message::SpeedRequest(SpeedRequest {
            ctx: 1,
            side: Side::Left,
            clicks: 10,
            speed: -10,
        });
        let wire = request.to_frame().unwrap().encode().unwrap();

        assert_eq!(port.write(&wire).unwrap(), wire.len());
        assert_eq!(port.take_sent_messages(), [request]);
        assert!(port.take_written().is_empty());
    }

    #[test]
    fn test_write_limit() {
        let mut port = SimulatedPort::new();
        port.limit_writes(Some(2));
        assert_eq!(port.write(&[1, 2, 3]).unwrap(), 2);
        assert_eq!(port.take_written(), [1, 2]);
    }

    #[test]
    fn test_injected_read_error_fires_once() {
        let mut port = SimulatedPort::new();
        port.fail_next_read(io::ErrorKind::BrokenPipe);
        let mut buf = [0u8; 4];
        assert!(port.read_available(&mut buf).is_err());
        assert_eq!(port.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_discard_input() {
        let mut port = SimulatedPort::new();
        port.inject_message(&Message::Range(RangeIndication {
            range: 100,
            sensor: 1,
        }))
        .unwrap();
        assert!(port.pending() > 0);
        port.discard_input().unwrap();
        assert_eq!(port.pending(), 0);
    }
}
