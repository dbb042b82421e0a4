// AX-12 serial protocol engine
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Status replies use the same frame with the instruction byte replaced by the
// servo's error flags.

use std::fmt;
use tracing::debug;

use super::transport::{Bus, Direction, InterByteDeadline, Transaction, Transport};

/// Default serial configuration for AX-12 servos
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;

/// Address every servo listens to. Servos never answer it.
pub const ID_BROADCAST: u8 = 0xFE;

/// Highest address a single servo can have
pub const ID_MAX: u8 = 0xFD;

/// Packet header bytes
pub(crate) const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Size of a status reply carrying no parameters
pub const STATUS_PACKET_LEN: usize = 6;

/// Inter-byte budget for write replies (6 bytes * 10 bit periods)
pub const WRITE_REPLY_BUDGET: u32 = 60;

/// Status byte seeded before a reply is captured
pub const NO_REPLY_YET: u8 = 0xFE;

/// Full scale of the position registers
pub const POSITION_MAX: u16 = 1023;

/// Mechanical travel covered by `0..=POSITION_MAX`
pub const POSITION_RANGE_DEG: f32 = 300.0;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    Reset = 0x06,
    SyncWrite = 0x83,
}

impl Instruction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::Read),
            0x03 => Some(Self::Write),
            0x04 => Some(Self::RegWrite),
            0x05 => Some(Self::Action),
            0x06 => Some(Self::Reset),
            0x83 => Some(Self::SyncWrite),
            _ => None,
        }
    }
}

/// Control table addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 0,        // 2 bytes, read-only
    Id = 3,                 // 1 byte
    BaudRate = 4,           // 1 byte
    ReturnDelayTime = 5,    // 1 byte
    CwAngleLimit = 6,       // 2 bytes
    CcwAngleLimit = 8,      // 2 bytes
    StatusReturnLevel = 16, // 1 byte

    // RAM area (volatile)
    TorqueEnable = 24,       // 1 byte
    Led = 25,                // 1 byte
    GoalPosition = 30,       // 2 bytes
    MovingSpeed = 32,        // 2 bytes
    TorqueLimit = 34,        // 2 bytes
    PresentPosition = 36,    // 2 bytes, read-only
    PresentSpeed = 38,       // 2 bytes, read-only
    PresentLoad = 40,        // 2 bytes, read-only
    PresentVoltage = 42,     // 1 byte, read-only
    PresentTemperature = 43, // 1 byte, read-only
    Registered = 44,         // 1 byte, read-only
    Moving = 46,             // 1 byte, read-only
    Lock = 47,               // 1 byte
}

/// Joint mode holds a position; wheel mode spins continuously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Joint,
    Wheel,
}

/// Error flags reported in the status byte of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusError(u8);

impl StatusError {
    pub const INPUT_VOLTAGE: u8 = 0x01;
    pub const ANGLE_LIMIT: u8 = 0x02;
    pub const OVERHEATING: u8 = 0x04;
    pub const RANGE: u8 = 0x08;
    pub const CHECKSUM: u8 = 0x10;
    pub const OVERLOAD: u8 = 0x20;
    pub const INSTRUCTION: u8 = 0x40;

    const NAMES: [(u8, &'static str); 7] = [
        (Self::INPUT_VOLTAGE, "input voltage"),
        (Self::ANGLE_LIMIT, "angle limit"),
        (Self::OVERHEATING, "overheating"),
        (Self::RANGE, "range"),
        (Self::CHECKSUM, "checksum"),
        (Self::OVERLOAD, "overload"),
        (Self::INSTRUCTION, "instruction"),
    ];

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "ok");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if self.0 & 0x80 != 0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "0x{:02X}", self.0)?;
        }
        Ok(())
    }
}

/// Error types for AX-12 communication
#[derive(Debug, thiserror::Error)]
pub enum Ax12Error {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} reported a fault: {status}")]
    Fault { id: u8, status: StatusError },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, Ax12Error>;

/// Outcome of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Sent to the broadcast address, nobody answers
    NoReplyExpected,
    /// Decoded status packet
    Reply { error: StatusError, params: Vec<u8> },
}

impl Status {
    /// Parameters of the reply, or a `Fault` if the servo raised any flag
    pub fn into_params(self, id: u8) -> Result<Vec<u8>> {
        match self {
            Status::NoReplyExpected => Ok(Vec::new()),
            Status::Reply { error, .. } if !error.is_ok() => {
                Err(Ax12Error::Fault { id, status: error })
            }
            Status::Reply { params, .. } => Ok(params),
        }
    }
}

/// Checksum over id, length, instruction and params
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    !sum
}

/// Build a packet with header and checksum into `packet`
pub fn build_packet(packet: &mut Vec<u8>, id: u8, instruction: u8, params: &[u8]) {
    let length = (params.len() + 2) as u8; // params + instruction + checksum
    packet.clear();
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instruction);
    packet.extend_from_slice(params);

    let sum = checksum(&packet[2..]);
    packet.push(sum);
}

/// Protocol engine bound to one servo address on a shared bus
pub struct Ax12<T> {
    id: u8,
    bus: Bus<T>,
    tx: Vec<u8>,
    rx: Vec<u8>,
    last_status: u8,
}

impl<T: Transport> Ax12<T> {
    pub fn new(bus: Bus<T>, id: u8) -> Self {
        Self {
            id,
            bus,
            tx: Vec::with_capacity(16),
            rx: Vec::with_capacity(16),
            last_status: 0,
        }
    }

    /// Channel addressing every servo on the bus
    pub fn broadcast(bus: Bus<T>) -> Self {
        Self::new(bus, ID_BROADCAST)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn is_broadcast(&self) -> bool {
        self.id == ID_BROADCAST
    }

    /// Raw status byte of the latest transaction (`NO_REPLY_YET` while waiting)
    pub fn last_status(&self) -> u8 {
        self.last_status
    }

    /// Read `len` bytes starting at `register`
    pub fn send_read_request(&mut self, register: Register, len: u8) -> Result<Status> {
        build_packet(&mut self.tx, self.id, Instruction::Read as u8, &[register as u8, len]);
        debug!("Read from servo {}: reg={:?}, len={}", self.id, register, len);

        let reply_len = STATUS_PACKET_LEN + len as usize;
        self.transact(reply_len, InterByteDeadline::for_reply(reply_len))
    }

    /// Write `data` at `register`, immediately (`Write`) or buffered until
    /// the next trigger (`RegWrite`)
    pub fn send_write_command(
        &mut self,
        instruction: Instruction,
        register: Register,
        data: &[u8],
    ) -> Result<Status> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(register as u8);
        params.extend_from_slice(data);
        build_packet(&mut self.tx, self.id, instruction as u8, &params);
        debug!(
            "{:?} to servo {}: reg={:?}, data={:02X?}",
            instruction, self.id, register, data
        );

        self.transact(STATUS_PACKET_LEN, InterByteDeadline::new(WRITE_REPLY_BUDGET))
    }

    /// Tell every servo to execute its buffered `RegWrite`
    pub fn send_trigger_broadcast(&mut self) -> Result<()> {
        build_packet(&mut self.tx, ID_BROADCAST, Instruction::Action as u8, &[]);
        debug!("Trigger broadcast");
        self.bus.transmit(&self.tx)?;
        Ok(())
    }

    /// Transmit the prepared packet and capture the reply, if one is due.
    /// The line stays claimed from the request until the reply is in.
    fn transact(&mut self, reply_len: usize, mut deadline: InterByteDeadline) -> Result<Status> {
        let bus = self.bus.clone();
        let mut line = bus.begin();
        line.transmit(&self.tx)?;

        if self.is_broadcast() {
            self.last_status = 0;
            return Ok(Status::NoReplyExpected);
        }

        self.last_status = NO_REPLY_YET;
        line.set_mode(Direction::Receive)?;
        let captured = self.capture_reply(&mut line, reply_len, &mut deadline);
        line.set_mode(Direction::Transmit)?;
        drop(line);
        captured?;

        self.decode_reply()
    }

    fn capture_reply(
        &mut self,
        line: &mut Transaction<'_, T>,
        reply_len: usize,
        deadline: &mut InterByteDeadline,
    ) -> Result<()> {
        self.rx.clear();
        while self.rx.len() < reply_len {
            match line.read_byte_before(deadline) {
                Some(byte) => self.rx.push(byte),
                None => {
                    debug!(
                        "Servo {} timed out after {} of {} bytes",
                        self.id,
                        self.rx.len(),
                        reply_len
                    );
                    return Err(Ax12Error::Timeout { id: self.id });
                }
            }
        }
        Ok(())
    }

    fn decode_reply(&mut self) -> Result<Status> {
        let rx = &self.rx;
        if rx[..2] != HEADER {
            return Err(Ax12Error::InvalidResponse {
                id: self.id,
                reason: format!("Invalid header: {:02X?}", &rx[..2]),
            });
        }
        if rx[2] != self.id {
            return Err(Ax12Error::InvalidResponse {
                id: self.id,
                reason: format!("ID mismatch: expected {}, got {}", self.id, rx[2]),
            });
        }
        let length = rx[3] as usize;
        if length + 4 != rx.len() {
            return Err(Ax12Error::InvalidResponse {
                id: self.id,
                reason: format!("Length {} does not fit a {} byte reply", length, rx.len()),
            });
        }

        let received = rx[rx.len() - 1];
        if checksum(&rx[2..rx.len() - 1]) != received {
            return Err(Ax12Error::ChecksumMismatch { id: self.id });
        }

        self.last_status = rx[4];
        Ok(Status::Reply {
            error: StatusError::from_bits(rx[4]),
            params: rx[5..rx.len() - 1].to_vec(),
        })
    }

    // === High-level convenience methods ===

    /// Check whether the servo answers
    pub fn ping(&mut self) -> Result<bool> {
        build_packet(&mut self.tx, self.id, Instruction::Ping as u8, &[]);
        match self.transact(STATUS_PACKET_LEN, InterByteDeadline::new(WRITE_REPLY_BUDGET)) {
            Ok(_) => Ok(true),
            Err(Ax12Error::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn read_u8(&mut self, register: Register) -> Result<u8> {
        let params = self.send_read_request(register, 1)?.into_params(self.id)?;
        params.first().copied().ok_or_else(|| Ax12Error::InvalidResponse {
            id: self.id,
            reason: "Empty response".to_string(),
        })
    }

    /// Read two bytes (little-endian)
    pub fn read_u16(&mut self, register: Register) -> Result<u16> {
        let params = self.send_read_request(register, 2)?.into_params(self.id)?;
        if params.len() < 2 {
            return Err(Ax12Error::InvalidResponse {
                id: self.id,
                reason: format!("Expected 2 bytes, got {}", params.len()),
            });
        }
        Ok(u16::from_le_bytes([params[0], params[1]]))
    }

    pub fn write_u8(&mut self, register: Register, value: u8) -> Result<()> {
        self.send_write_command(Instruction::Write, register, &[value])?
            .into_params(self.id)?;
        Ok(())
    }

    /// Write two bytes (little-endian), effective immediately
    pub fn write_u16(&mut self, register: Register, value: u16) -> Result<()> {
        self.send_write_command(Instruction::Write, register, &value.to_le_bytes())?
            .into_params(self.id)?;
        Ok(())
    }

    /// Write two bytes (little-endian), effective on the next trigger
    pub fn reg_write_u16(&mut self, register: Register, value: u16) -> Result<()> {
        self.send_write_command(Instruction::RegWrite, register, &value.to_le_bytes())?
            .into_params(self.id)?;
        Ok(())
    }

    /// Sync write: same register on several servos in one broadcast packet
    /// data: [(id, value), ...]
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // [start_addr, data_length, id1, lo1, hi1, id2, lo2, hi2, ...]
        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&value.to_le_bytes());
        }

        build_packet(&mut self.tx, ID_BROADCAST, Instruction::SyncWrite as u8, &params);
        debug!("Sync write to {} servos: reg={:?}", data.len(), register);
        self.bus.transmit(&self.tx)?;
        Ok(())
    }

    pub fn set_torque(&mut self, enabled: bool) -> Result<()> {
        self.write_u8(Register::TorqueEnable, enabled as u8)
    }

    /// Joint mode uses the full angle range, wheel mode zeroes both limits
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let ccw_limit = match mode {
            Mode::Joint => POSITION_MAX,
            Mode::Wheel => 0,
        };
        self.write_u16(Register::CwAngleLimit, 0)?;
        self.write_u16(Register::CcwAngleLimit, ccw_limit)
    }

    pub fn set_goal_position(&mut self, position: u16) -> Result<()> {
        self.write_u16(Register::GoalPosition, position.min(POSITION_MAX))
    }

    pub fn set_moving_speed(&mut self, speed: u16) -> Result<()> {
        self.write_u16(Register::MovingSpeed, speed.min(POSITION_MAX))
    }

    pub fn present_position(&mut self) -> Result<u16> {
        self.read_u16(Register::PresentPosition)
    }

    pub fn is_moving(&mut self) -> Result<bool> {
        Ok(self.read_u8(Register::Moving)? != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::SimulatedServos;

    fn bus_with(ids: &[u8]) -> Bus<SimulatedServos> {
        Bus::new(SimulatedServos::with_servos(ids), DEFAULT_BAUDRATE).unwrap()
    }

    fn checksum_matches(packet: &[u8]) -> bool {
        let body = &packet[2..packet.len() - 1];
        let sum: u32 = body.iter().map(|&b| b as u32).sum();
        (!sum & 0xFF) as u8 == packet[packet.len() - 1]
    }

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum(&data), 215);
    }

    #[test]
    fn test_checksum_wraps_low_byte() {
        // 0xFE + 0xFE + 0x04 = 0x200, low byte 0x00
        let data = [0xFE, 0xFE, 0x04];
        assert_eq!(checksum(&data), 0xFF);
    }

    #[test]
    fn test_build_packet() {
        let mut packet = Vec::new();
        build_packet(&mut packet, 1, Instruction::Ping as u8, &[]);
        assert_eq!(packet, vec![0xFF, 0xFF, 1, 2, 0x01, 0xFB]);
    }

    #[test]
    fn test_every_sent_packet_carries_valid_checksum() {
        let bus = bus_with(&[3]);
        let mut servo = Ax12::new(bus.clone(), 3);
        servo.set_goal_position(512).unwrap();
        servo.reg_write_u16(Register::GoalPosition, 700).unwrap();
        servo.present_position().unwrap();
        servo.send_trigger_broadcast().unwrap();
        servo.sync_write_u16(Register::MovingSpeed, &[(3, 100), (4, 200)]).unwrap();

        let sent = bus.lock().take_sent();
        assert_eq!(sent.len(), 5);
        for packet in &sent {
            assert_eq!(packet[..2], HEADER);
            assert_eq!(packet[3] as usize, packet.len() - 4);
            assert!(checksum_matches(packet), "bad checksum in {:02X?}", packet);
        }
    }

    #[test]
    fn test_trigger_packet() {
        let bus = bus_with(&[]);
        let mut servo = Ax12::new(bus.clone(), 5);
        servo.send_trigger_broadcast().unwrap();

        let sent = bus.lock().take_sent();
        assert_eq!(sent, vec![vec![0xFF, 0xFF, 0xFE, 0x02, 0x05, 0xFA]]);
        assert_eq!(bus.lock().polls(), 0);
    }

    #[test]
    fn test_write_roundtrip() {
        let bus = bus_with(&[1]);
        let mut servo = Ax12::new(bus.clone(), 1);

        let status = servo
            .send_write_command(Instruction::Write, Register::GoalPosition, &[0x00, 0x03])
            .unwrap();
        assert_eq!(
            status,
            Status::Reply {
                error: StatusError::default(),
                params: vec![]
            }
        );
        assert_eq!(servo.last_status(), 0);
        assert_eq!(bus.lock().register_u16(1, Register::GoalPosition), 768);
    }

    #[test]
    fn test_read_returns_payload() {
        let bus = bus_with(&[2]);
        bus.lock().set_register_u16(2, Register::PresentPosition, 0x0123);
        let mut servo = Ax12::new(bus, 2);

        let status = servo.send_read_request(Register::PresentPosition, 2).unwrap();
        assert_eq!(
            status,
            Status::Reply {
                error: StatusError::default(),
                params: vec![0x23, 0x01]
            }
        );
        assert_eq!(servo.present_position().unwrap(), 0x0123);
    }

    #[test]
    fn test_write_timeout_after_exactly_sixty_polls() {
        let bus = bus_with(&[]);
        let mut servo = Ax12::new(bus.clone(), 9);

        let result = servo.send_write_command(Instruction::Write, Register::Led, &[1]);
        assert!(matches!(result, Err(Ax12Error::Timeout { id: 9 })));
        assert_eq!(bus.lock().polls(), 60);
        // Nothing was captured, the sentinel is still in place
        assert_eq!(servo.last_status(), NO_REPLY_YET);
    }

    #[test]
    fn test_read_timeout_scales_with_reply_length() {
        let bus = bus_with(&[]);
        let mut servo = Ax12::new(bus.clone(), 9);

        let result = servo.send_read_request(Register::PresentPosition, 2);
        assert!(matches!(result, Err(Ax12Error::Timeout { id: 9 })));
        assert_eq!(bus.lock().polls(), (6 + 2) * 10);
    }

    #[test]
    fn test_broadcast_never_waits() {
        let bus = bus_with(&[1, 2]);
        let mut all = Ax12::broadcast(bus.clone());

        let write = all
            .send_write_command(Instruction::Write, Register::TorqueEnable, &[1])
            .unwrap();
        let read = all.send_read_request(Register::PresentPosition, 2).unwrap();

        assert_eq!(write, Status::NoReplyExpected);
        assert_eq!(read, Status::NoReplyExpected);
        let sim = bus.lock();
        assert_eq!(sim.polls(), 0);
        assert!(!sim.modes().contains(&Direction::Receive));
        assert_eq!(sim.register(1, Register::TorqueEnable), 1);
    }

    #[test]
    fn test_bus_returns_to_transmit_after_reply() {
        let bus = bus_with(&[1]);
        let mut servo = Ax12::new(bus.clone(), 1);
        bus.lock().clear_modes();

        servo.ping().unwrap();
        let modes = bus.lock().modes().to_vec();
        assert_eq!(
            modes,
            vec![Direction::Transmit, Direction::Receive, Direction::Transmit]
        );
    }

    #[test]
    fn test_ping_missing_servo() {
        let bus = bus_with(&[1]);
        assert!(Ax12::new(bus.clone(), 1).ping().unwrap());
        assert!(!Ax12::new(bus, 2).ping().unwrap());
    }

    #[test]
    fn test_fault_status_is_surfaced_raw() {
        let bus = bus_with(&[4]);
        bus.lock().set_fault(4, StatusError::OVERLOAD);
        let mut servo = Ax12::new(bus, 4);

        let status = servo
            .send_write_command(Instruction::Write, Register::Led, &[1])
            .unwrap();
        assert_eq!(
            status,
            Status::Reply {
                error: StatusError::from_bits(StatusError::OVERLOAD),
                params: vec![]
            }
        );
        assert_eq!(servo.last_status(), StatusError::OVERLOAD);

        match servo.write_u8(Register::Led, 0) {
            Err(Ax12Error::Fault { id: 4, status }) => {
                assert!(status.contains(StatusError::OVERLOAD));
                assert_eq!(status.to_string(), "overload");
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_reply_is_rejected() {
        let bus = bus_with(&[6]);
        bus.lock().set_corrupt(6, true);
        let mut servo = Ax12::new(bus, 6);

        let result = servo.present_position();
        assert!(matches!(result, Err(Ax12Error::ChecksumMismatch { id: 6 })));
    }

    #[test]
    fn test_reg_write_waits_for_trigger() {
        let bus = bus_with(&[1, 2]);
        let mut first = Ax12::new(bus.clone(), 1);
        let mut second = Ax12::new(bus.clone(), 2);

        first.reg_write_u16(Register::GoalPosition, 100).unwrap();
        second.reg_write_u16(Register::GoalPosition, 900).unwrap();
        // Still parked at center until the trigger
        assert_eq!(bus.lock().register_u16(1, Register::GoalPosition), 512);
        assert_eq!(bus.lock().register(2, Register::Registered), 1);

        first.send_trigger_broadcast().unwrap();
        assert_eq!(bus.lock().register_u16(1, Register::GoalPosition), 100);
        assert_eq!(bus.lock().register_u16(2, Register::GoalPosition), 900);
        assert_eq!(bus.lock().register(2, Register::Registered), 0);
    }

    #[test]
    fn test_set_mode_writes_angle_limits() {
        let bus = bus_with(&[1]);
        let mut servo = Ax12::new(bus.clone(), 1);

        servo.set_mode(Mode::Wheel).unwrap();
        assert_eq!(bus.lock().register_u16(1, Register::CcwAngleLimit), 0);
        servo.set_mode(Mode::Joint).unwrap();
        assert_eq!(bus.lock().register_u16(1, Register::CcwAngleLimit), POSITION_MAX);
    }

    /// Servos that answer only after a number of empty polls
    struct SlowServos {
        servos: SimulatedServos,
        delay: u32,
        waited: u32,
    }

    impl Transport for SlowServos {
        fn initialize(&mut self, baud_rate: u32) -> std::io::Result<()> {
            self.servos.initialize(baud_rate)
        }

        fn set_mode(&mut self, direction: Direction) -> std::io::Result<()> {
            self.servos.set_mode(direction)
        }

        fn transmit_burst(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.waited = 0;
            self.servos.transmit_burst(bytes)
        }

        fn byte_available(&mut self) -> bool {
            if self.waited < self.delay {
                self.waited += 1;
                return false;
            }
            self.servos.byte_available()
        }

        fn receive_byte(&mut self) -> Option<u8> {
            self.servos.receive_byte()
        }
    }

    #[test]
    fn test_concurrent_channels_do_not_cut_into_a_reply() {
        let slow = SlowServos {
            servos: SimulatedServos::with_servos(&[1, 2]),
            delay: 10,
            waited: 0,
        };
        let bus = Bus::new(slow, DEFAULT_BAUDRATE)
            .unwrap()
            .with_poll_interval(std::time::Duration::from_millis(2));
        bus.lock().servos.set_register_u16(1, Register::PresentPosition, 0x0234);

        let reader_bus = bus.clone();
        let reader = std::thread::spawn(move || Ax12::new(reader_bus, 1).present_position());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let pinged = Ax12::new(bus.clone(), 2).ping();

        assert_eq!(reader.join().unwrap().unwrap(), 0x0234);
        assert!(pinged.unwrap());
    }

    #[test]
    fn test_status_error_display() {
        let status = StatusError::from_bits(StatusError::OVERHEATING | StatusError::RANGE);
        assert_eq!(status.to_string(), "overheating, range");
        assert_eq!(StatusError::default().to_string(), "ok");
    }
}
