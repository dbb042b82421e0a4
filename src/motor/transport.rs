// Half-duplex serial transport for the servo bus
//
// All servos hang off one wire. The line is either driving (transmit) or
// listening (receive), never both, and every channel shares the same port
// through a cloneable `Bus` handle.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Bits on the wire per byte (start + 8 data + stop)
pub const BITS_PER_BYTE: u32 = 10;

/// Read timeout used by the hardware port when a byte is requested
const SERIAL_READ_TIMEOUT_MS: u64 = 10;

/// Line direction of the half-duplex bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

/// Byte-level access to a half-duplex serial line
pub trait Transport {
    /// (Re)configure the line for the given baud rate
    fn initialize(&mut self, baud_rate: u32) -> io::Result<()>;

    /// Switch the line between driving and listening
    fn set_mode(&mut self, direction: Direction) -> io::Result<()>;

    /// Send a whole packet in one uninterrupted burst
    fn transmit_burst(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Whether a received byte is waiting
    fn byte_available(&mut self) -> bool;

    /// Take the next received byte, if any
    fn receive_byte(&mut self) -> Option<u8>;
}

/// Inter-byte deadline for reply capture.
///
/// The budget counts polling ticks and restarts every time a byte arrives,
/// so it bounds the gap between bytes rather than the whole transaction.
#[derive(Debug, Clone, Copy)]
pub struct InterByteDeadline {
    budget: u32,
    ticks: u32,
}

impl InterByteDeadline {
    pub fn new(budget: u32) -> Self {
        Self { budget, ticks: 0 }
    }

    /// Budget expressed in bit periods for a reply of `reply_len` bytes
    pub fn for_reply(reply_len: usize) -> Self {
        Self::new(reply_len as u32 * BITS_PER_BYTE)
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn elapsed(&self) -> u32 {
        self.ticks
    }

    pub fn is_expired(&self) -> bool {
        self.ticks >= self.budget
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn reset(&mut self) {
        self.ticks = 0;
    }
}

/// Shared handle to the bus. Cloning gives another handle to the same line.
///
/// Two locks guard the line. `line` is held for a whole request/reply
/// exchange so no other channel can transmit in between. `transport` is held
/// for a single poll or burst and released after every received byte.
pub struct Bus<T> {
    transport: Arc<Mutex<T>>,
    line: Arc<Mutex<()>>,
    baud_rate: u32,
    poll_interval: Duration,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            line: Arc::clone(&self.line),
            baud_rate: self.baud_rate,
            poll_interval: self.poll_interval,
        }
    }
}

impl<T: Transport> Bus<T> {
    /// Initialize the transport at `baud_rate` and leave it transmitting
    pub fn new(mut transport: T, baud_rate: u32) -> io::Result<Self> {
        transport.initialize(baud_rate)?;
        transport.set_mode(Direction::Transmit)?;

        Ok(Self {
            transport: Arc::new(Mutex::new(transport)),
            line: Arc::new(Mutex::new(())),
            baud_rate,
            poll_interval: Duration::ZERO,
        })
    }

    /// Sleep this long between polls instead of just yielding
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Take the transport for one operation.
    ///
    /// A panic while holding the guard cannot leave the port half-written in
    /// a way later packets depend on, so a poisoned lock is simply reclaimed.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the line for one exchange; other channels wait until it drops
    pub fn begin(&self) -> Transaction<'_, T> {
        Transaction {
            bus: self,
            _line: self.line.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Transmit a packet that expects no reply
    pub fn transmit(&self, packet: &[u8]) -> io::Result<()> {
        self.begin().transmit(packet)
    }

    /// Time needed to clock `len` bytes onto the wire
    pub fn wire_time(&self, len: usize) -> Duration {
        let bits = len as u64 * BITS_PER_BYTE as u64;
        Duration::from_micros(bits * 1_000_000 / self.baud_rate.max(1) as u64)
    }

    fn pause(&self) {
        if self.poll_interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.poll_interval);
        }
    }
}

/// Exclusive use of the line from a request until its reply is captured
pub struct Transaction<'a, T> {
    bus: &'a Bus<T>,
    _line: MutexGuard<'a, ()>,
}

impl<T: Transport> Transaction<'_, T> {
    /// Transmit a packet and hold the line until it has left the wire
    pub fn transmit(&mut self, packet: &[u8]) -> io::Result<()> {
        let mut transport = self.bus.lock();
        transport.set_mode(Direction::Transmit)?;
        transport.transmit_burst(packet)?;
        thread::sleep(self.bus.wire_time(packet.len()));
        Ok(())
    }

    pub fn set_mode(&mut self, direction: Direction) -> io::Result<()> {
        self.bus.lock().set_mode(direction)
    }

    /// Wait for the next byte until the deadline runs out.
    ///
    /// The transport is locked for each poll only. Returns `None` once the
    /// deadline is expired.
    pub fn read_byte_before(&mut self, deadline: &mut InterByteDeadline) -> Option<u8> {
        loop {
            {
                let mut transport = self.bus.lock();
                if transport.byte_available() {
                    if let Some(byte) = transport.receive_byte() {
                        deadline.reset();
                        return Some(byte);
                    }
                }
            }

            deadline.tick();
            if deadline.is_expired() {
                return None;
            }
            self.bus.pause();
        }
    }
}

/// How the adapter switches the line direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionControl {
    /// The adapter switches on its own (U2D2, USB2AX, ...)
    Automatic,
    /// RTS drives the transceiver's direction pin, high while transmitting
    Rts,
}

/// Hardware serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    control: DirectionControl,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud_rate: u32) -> serialport::Result<Self> {
        Self::open_with_control(port_name, baud_rate, DirectionControl::Automatic)
    }

    pub fn open_with_control(
        port_name: &str,
        baud_rate: u32,
        control: DirectionControl,
    ) -> serialport::Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
            .open()?;

        Ok(Self { port, control })
    }
}

impl Transport for SerialTransport {
    fn initialize(&mut self, baud_rate: u32) -> io::Result<()> {
        self.port.set_baud_rate(baud_rate)?;
        Ok(())
    }

    fn set_mode(&mut self, direction: Direction) -> io::Result<()> {
        if direction == Direction::Transmit {
            // Whatever is still buffered belongs to an earlier transaction
            self.port.clear(ClearBuffer::Input)?;
        }
        if self.control == DirectionControl::Rts {
            self.port
                .write_request_to_send(direction == Direction::Transmit)?;
        }
        Ok(())
    }

    fn transmit_burst(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn byte_available(&mut self) -> bool {
        matches!(self.port.bytes_to_read(), Ok(n) if n > 0)
    }

    fn receive_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Some(byte[0]),
            Err(e) => {
                debug!("Serial read failed: {}", e);
                None
            }
        }
    }
}
