// Simulated servo bus
//
// A `Transport` that answers like a chain of AX-12 servos: pings, reads,
// writes, buffered writes released by ACTION, sync writes. Motion completes
// instantly unless held. Used by the tests and by `--simulate`.

use std::collections::{BTreeMap, VecDeque};
use std::io;

use super::ax12::{HEADER, ID_BROADCAST, Instruction, Register, build_packet, checksum};
use super::transport::{Direction, Transport};

const CONTROL_TABLE_LEN: usize = 50;
const AX12_MODEL_NUMBER: u16 = 12;
const CENTER_POSITION: u16 = 512;

struct SimServo {
    registers: [u8; CONTROL_TABLE_LEN],
    pending: Option<(u8, Vec<u8>)>,
    fault: u8,
    muted: bool,
    corrupt: bool,
    hold_motion: bool,
}

impl SimServo {
    fn new(id: u8) -> Self {
        let mut servo = Self {
            registers: [0; CONTROL_TABLE_LEN],
            pending: None,
            fault: 0,
            muted: false,
            corrupt: false,
            hold_motion: false,
        };
        servo.reset(id);
        servo
    }

    fn reset(&mut self, id: u8) {
        self.registers = [0; CONTROL_TABLE_LEN];
        self.pending = None;
        self.set_u16(Register::ModelNumber, AX12_MODEL_NUMBER);
        self.registers[Register::Id as usize] = id;
        self.registers[Register::BaudRate as usize] = 1;
        self.set_u16(Register::CcwAngleLimit, 1023);
        self.set_u16(Register::GoalPosition, CENTER_POSITION);
        self.set_u16(Register::PresentPosition, CENTER_POSITION);
    }

    fn get_u16(&self, register: Register) -> u16 {
        let addr = register as usize;
        u16::from_le_bytes([self.registers[addr], self.registers[addr + 1]])
    }

    fn set_u16(&mut self, register: Register, value: u16) {
        let addr = register as usize;
        self.registers[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn read(&self, addr: u8, len: u8) -> Vec<u8> {
        let start = (addr as usize).min(CONTROL_TABLE_LEN);
        let end = (start + len as usize).min(CONTROL_TABLE_LEN);
        self.registers[start..end].to_vec()
    }

    fn write(&mut self, addr: u8, data: &[u8]) {
        let start = addr as usize;
        for (offset, &byte) in data.iter().enumerate() {
            if let Some(slot) = self.registers.get_mut(start + offset) {
                *slot = byte;
            }
        }

        let goal = Register::GoalPosition as usize;
        let touches_goal = start <= goal + 1 && start + data.len() > goal;
        if touches_goal {
            if self.hold_motion {
                self.registers[Register::Moving as usize] = 1;
            } else {
                self.finish_motion();
            }
        }
    }

    fn finish_motion(&mut self) {
        let goal = self.get_u16(Register::GoalPosition);
        self.set_u16(Register::PresentPosition, goal);
        self.registers[Register::Moving as usize] = 0;
    }

    fn execute(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        match instruction {
            Instruction::Ping => Vec::new(),
            Instruction::Read if params.len() >= 2 => self.read(params[0], params[1]),
            Instruction::Write if !params.is_empty() => {
                self.write(params[0], &params[1..]);
                Vec::new()
            }
            Instruction::RegWrite if !params.is_empty() => {
                self.pending = Some((params[0], params[1..].to_vec()));
                self.registers[Register::Registered as usize] = 1;
                Vec::new()
            }
            Instruction::Action => {
                if let Some((addr, data)) = self.pending.take() {
                    self.write(addr, &data);
                }
                self.registers[Register::Registered as usize] = 0;
                Vec::new()
            }
            Instruction::Reset => {
                self.reset(id);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

/// In-process stand-in for a chain of servos
pub struct SimulatedServos {
    servos: BTreeMap<u8, SimServo>,
    direction: Direction,
    rx: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    modes: Vec<Direction>,
    polls: usize,
    baud_rate: u32,
}

impl SimulatedServos {
    pub fn new() -> Self {
        Self {
            servos: BTreeMap::new(),
            direction: Direction::Transmit,
            rx: VecDeque::new(),
            sent: Vec::new(),
            modes: Vec::new(),
            polls: 0,
            baud_rate: 0,
        }
    }

    pub fn with_servos(ids: &[u8]) -> Self {
        let mut sim = Self::new();
        for &id in ids {
            sim.add_servo(id);
        }
        sim
    }

    pub fn add_servo(&mut self, id: u8) {
        self.servos.insert(id, SimServo::new(id));
    }

    pub fn remove_servo(&mut self, id: u8) {
        self.servos.remove(&id);
    }

    /// Servo keeps executing commands but stops answering
    pub fn mute(&mut self, id: u8, muted: bool) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.muted = muted;
        }
    }

    /// Error flags the servo reports in every reply
    pub fn set_fault(&mut self, id: u8, flags: u8) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.fault = flags;
        }
    }

    /// Replies go out with a broken checksum
    pub fn set_corrupt(&mut self, id: u8, corrupt: bool) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.corrupt = corrupt;
        }
    }

    /// Goal changes leave the servo moving until `finish_motion`
    pub fn hold_motion(&mut self, id: u8, hold: bool) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.hold_motion = hold;
        }
    }

    pub fn finish_motion(&mut self, id: u8) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.finish_motion();
        }
    }

    pub fn finish_all_motion(&mut self) {
        for servo in self.servos.values_mut() {
            servo.finish_motion();
        }
    }

    pub fn register(&self, id: u8, register: Register) -> u8 {
        self.servos
            .get(&id)
            .map_or(0, |servo| servo.registers[register as usize])
    }

    pub fn register_u16(&self, id: u8, register: Register) -> u16 {
        self.servos.get(&id).map_or(0, |servo| servo.get_u16(register))
    }

    pub fn set_register_u16(&mut self, id: u8, register: Register, value: u16) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.set_u16(register, value);
        }
    }

    /// Every packet transmitted so far, oldest first
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }

    /// Number of `byte_available` polls so far
    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn modes(&self) -> &[Direction] {
        &self.modes
    }

    pub fn clear_modes(&mut self) {
        self.modes.clear();
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn handle_packet(&mut self, packet: &[u8]) {
        if packet.len() < 6 || packet[..2] != HEADER {
            return;
        }
        let id = packet[2];
        let length = packet[3] as usize;
        let received = packet[packet.len() - 1];
        if length + 4 != packet.len() || checksum(&packet[2..packet.len() - 1]) != received {
            return;
        }
        let Some(instruction) = Instruction::from_u8(packet[4]) else {
            return;
        };
        let params = &packet[5..packet.len() - 1];

        if instruction == Instruction::SyncWrite {
            self.sync_write(params);
            return;
        }

        if id == ID_BROADCAST {
            for (&servo_id, servo) in self.servos.iter_mut() {
                servo.execute(servo_id, instruction, params);
            }
            return;
        }

        let Some(servo) = self.servos.get_mut(&id) else {
            return;
        };
        let data = servo.execute(id, instruction, params);
        if servo.muted {
            return;
        }

        let mut reply = Vec::with_capacity(6 + data.len());
        build_packet(&mut reply, id, servo.fault, &data);
        if servo.corrupt {
            if let Some(last) = reply.last_mut() {
                *last ^= 0xFF;
            }
        }
        self.rx.extend(reply);
    }

    fn sync_write(&mut self, params: &[u8]) {
        if params.len() < 2 {
            return;
        }
        let addr = params[0];
        let len = params[1] as usize;
        for block in params[2..].chunks(len + 1) {
            if block.len() != len + 1 {
                break;
            }
            if let Some(servo) = self.servos.get_mut(&block[0]) {
                servo.write(addr, &block[1..]);
            }
        }
    }
}

impl Default for SimulatedServos {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedServos {
    fn initialize(&mut self, baud_rate: u32) -> io::Result<()> {
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn set_mode(&mut self, direction: Direction) -> io::Result<()> {
        self.direction = direction;
        self.modes.push(direction);
        Ok(())
    }

    fn transmit_burst(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.direction != Direction::Transmit {
            return Err(io::Error::other("transmit while the line is receiving"));
        }
        self.rx.clear();
        self.sent.push(bytes.to_vec());
        self.handle_packet(bytes);
        Ok(())
    }

    fn byte_available(&mut self) -> bool {
        self.polls += 1;
        self.direction == Direction::Receive && !self.rx.is_empty()
    }

    fn receive_byte(&mut self) -> Option<u8> {
        if self.direction != Direction::Receive {
            return None;
        }
        self.rx.pop_front()
    }
}
