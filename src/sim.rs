//! Simulating and execution for RV32I programs.
//!
//! This module is focused on executing raw program images,
//! loaded at the start of physical memory ([`mem::MBASE`]).
//!
//! This module consists of:
//! - [`Simulator`]: The struct that simulates a program.
//! - [`mem`]: The module handling memory and the register file.
//! - [`device`]: The module handling memory-mapped IO and external devices.
//!
//! # Usage
//!
//! To simulate a program, instantiate a Simulator and load an image into it:
//!
//! ```
//! use sdb::sim::{Simulator, SimState};
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_default_image().unwrap();
//! sim.run().unwrap();
//!
//! assert!(matches!(sim.state(), SimState::End { code: 0, .. }));
//! ```
//!
//! ## Flags
//!
//! The simulator can be configured with [`SimFlags`].
//! For example, to use a smaller physical memory:
//!
//! ```
//! # use sdb::sim::{Simulator, SimFlags};
//! let sim = Simulator::new(SimFlags { msize: 0x10000, ..Default::default() });
//! assert_eq!(sim.mem.size(), 0x10000);
//! ```
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::run`] (which runs until the program halts),
//! there are also:
//! - [`Simulator::step_in`]: executes exactly one instruction
//! - [`Simulator::run_while`], [`Simulator::run_with_limit`]: more advanced programmatic execution
//!
//! A program halts by executing `ebreak`. The value of `a0` at that point is its exit code.
//!
//! ## Querying State
//!
//! - The PC is the `sim.pc` field.
//! - The register file is the `sim.reg_file` field.
//! - Memory can be accessed directly through the `sim.mem` field (which does not reach IO devices),
//!   or through [`Simulator::paddr_read`] and [`Simulator::paddr_write`] (which do).
//!
//! The simulator also implements [`EvalContext`], so expressions can be evaluated against it:
//!
//! ```
//! use sdb::expr::evaluate;
//! use sdb::sim::Simulator;
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_default_image().unwrap();
//! sim.step_in().unwrap();
//!
//! assert_eq!(evaluate("$t0", &sim), Ok(0x8000_0000));
//! assert_eq!(evaluate("*($pc + 12)", &sim), Ok(0xdeadbeef));
//! ```
//!
//! ## IO
//!
//! IO is handled by "external devices" (the trait [`device::ExternalDevice`]),
//! mapped into the address space through the `device_handler` field.
//!
//! If the `serial` flag is set, a [`device::SerialPort`] is mapped at [`device::SERIAL_PORT`].
//! Bytes the program stores to it can be read from the receiver given by [`Simulator::take_serial_receiver`].
pub mod mem;
pub mod device;

use crossbeam_channel as cbc;

use crate::expr::EvalContext;
use crate::{SWord, Word};
use device::{DeviceHandler, SerialPort};
use mem::{Mem, MemInitStrategy, RegFile, DEFAULT_MSIZE, MBASE};

/// The program loaded when no image is provided.
///
/// It clears a byte of its own data, loads it back into `a0`, and halts (with a good trap).
const DEFAULT_IMAGE: [Word; 5] = [
    0x00000297, // auipc t0, 0
    0x00028823, // sb    zero, 16(t0)
    0x0102c503, // lbu   a0, 16(t0)
    0x00100073, // ebreak
    0xdeadbeef, // data
];

const EBREAK: Word = 0x0010_0073;
const A0: usize = 10;

/// Errors that can occur during simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimErr {
    /// The instruction could not be decoded (or is not supported).
    IllegalInstr(Word),
    /// A memory access was out of bounds (and not to a device).
    AccessFault(Word),
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::IllegalInstr(inst) => write!(f, "illegal instruction 0x{inst:08x}"),
            SimErr::AccessFault(addr)  => write!(f, "address 0x{addr:08x} is out of bounds"),
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            SimErr::IllegalInstr(_) => Some("only the RV32I base instructions are supported".into()),
            SimErr::AccessFault(_)  => Some(format!("physical memory starts at 0x{MBASE:08x}").into()),
        }
    }
}

/// Anything that can cause a step to abruptly fail to finish.
enum StepBreak {
    /// An `ebreak` was executed.
    Halt,
    /// A simulation error occurred.
    Err(SimErr),
}
impl From<SimErr> for StepBreak {
    fn from(value: SimErr) -> Self {
        Self::Err(value)
    }
}

/// The execution state of the simulator.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SimState {
    /// The simulator is executing.
    Running,
    /// Execution is paused and can be resumed.
    #[default]
    Stop,
    /// The program halted via `ebreak`.
    End {
        /// The address of the `ebreak`.
        pc: Word,
        /// The exit code (the value of `a0`).
        code: Word
    },
    /// Execution failed with an error.
    Abort {
        /// The address of the instruction which failed.
        pc: Word
    },
    /// The user quit.
    Quit,
}
impl SimState {
    /// Whether the program can no longer be executed.
    pub fn has_ended(&self) -> bool {
        matches!(self, SimState::End { .. } | SimState::Abort { .. })
    }
}

/// Configuration flags for [`Simulator`].
///
/// These take effect when the `Simulator` is created with [`Simulator::new`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// The size of physical memory in bytes.
    ///
    /// By default, this is 128 MiB.
    pub msize: usize,

    /// Whether to map a serial port at [`device::SERIAL_PORT`].
    ///
    /// By default, this flag is `true`.
    pub serial: bool,

    /// The strategy used to fill memory.
    ///
    /// By default, this is [`MemInitStrategy::default`].
    pub mem_init: MemInitStrategy,
}
impl Default for SimFlags {
    fn default() -> Self {
        Self {
            msize: DEFAULT_MSIZE,
            serial: true,
            mem_init: Default::default(),
        }
    }
}

/// Executes RV32I programs.
#[derive(Debug)]
pub struct Simulator {
    /// The simulator's physical memory.
    pub mem: Mem,

    /// The simulator's register file.
    pub reg_file: RegFile,

    /// The program counter.
    pub pc: Word,

    /// The number of instructions successfully run since this `Simulator` was created.
    pub instructions_run: u64,

    /// Handler for memory-mapped devices.
    pub device_handler: DeviceHandler,

    /// Configuration settings for the simulator.
    pub flags: SimFlags,

    state: SimState,
    serial_rx: Option<cbc::Receiver<u8>>,
}

impl Simulator {
    /// Creates a new simulator with the provided initializers
    /// and with no program loaded.
    ///
    /// The PC starts at the beginning of physical memory.
    pub fn new(flags: SimFlags) -> Self {
        let mut device_handler = DeviceHandler::new();
        let serial_rx = match flags.serial {
            true => {
                let (serial, rx) = SerialPort::new();
                device_handler.add_device(serial, SerialPort::RANGE)
                    .ok()
                    .map(|_| rx)
            },
            false => None,
        };

        Self {
            mem: Mem::new(flags.msize, flags.mem_init),
            reg_file: RegFile::new(),
            pc: MBASE,
            instructions_run: 0,
            device_handler,
            flags,
            state: SimState::Stop,
            serial_rx,
        }
    }

    /// Takes the receiving end of the serial port.
    ///
    /// This returns `None` if the serial port is disabled or if the receiver was already taken.
    pub fn take_serial_receiver(&mut self) -> Option<cbc::Receiver<u8>> {
        self.serial_rx.take()
    }

    /// Loads a raw program image at the start of physical memory.
    ///
    /// # Errors
    /// If the image does not fit in physical memory, this returns
    /// an access fault at the first address past the end of memory.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), SimErr> {
        if !self.mem.copy_block(MBASE, image) {
            let end = MBASE.wrapping_add(self.mem.size() as Word);
            return Err(SimErr::AccessFault(end));
        }

        tracing::info!("loaded image of {} bytes at 0x{MBASE:08x}", image.len());
        Ok(())
    }

    /// Loads the built-in program image.
    ///
    /// # Errors
    /// This fails if physical memory is smaller than the built-in image (20 bytes).
    pub fn load_default_image(&mut self) -> Result<(), SimErr> {
        let image: Vec<u8> = DEFAULT_IMAGE.iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();

        tracing::info!("no image is given, using the built-in image");
        self.load_image(&image)
    }

    /// The current execution state.
    pub fn state(&self) -> SimState {
        self.state
    }

    /// Sets the execution state.
    pub fn set_state(&mut self, state: SimState) {
        self.state = state;
    }

    /// Reads `len` bytes (1, 2, or 4) at a physical address.
    ///
    /// This reads from physical memory or a mapped device.
    /// If neither is at this address, this returns `None`.
    pub fn paddr_read(&self, addr: Word, len: usize) -> Option<Word> {
        self.mem.read(addr, len)
            .or_else(|| self.device_handler.io_read(addr, len))
    }

    /// Writes the low `len` bytes (1, 2, or 4) of `data` at a physical address.
    ///
    /// # Errors
    /// If neither physical memory nor a device is at this address, this returns an access fault.
    pub fn paddr_write(&mut self, addr: Word, len: usize, data: Word) -> Result<(), SimErr> {
        match self.mem.write(addr, len, data) || self.device_handler.io_write(addr, len, data) {
            true  => Ok(()),
            false => Err(SimErr::AccessFault(addr)),
        }
    }

    /// Execute the program.
    ///
    /// This blocks until the program ends.
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// This blocks until the program ends or until the number of steps to execute has been hit.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), SimErr> {
        if max_steps == 0 { return Ok(()) };

        let i = self.instructions_run;
        self.run_while(|sim| sim.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Execute the program while a condition holds.
    ///
    /// The tripwire is checked after each instruction.
    /// Execution stops (with state [`SimState::Stop`]) once it returns false,
    /// or once the program halts or fails.
    ///
    /// If the program has already ended, this does nothing.
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<(), SimErr> {
        if self.state.has_ended() { return Ok(()) };
        self.state = SimState::Running;

        // run until:
        // 1. the program halts or fails
        // 2. the tripwire condition returns false
        // 3. something else changes the state (e.g., the tripwire)
        let result = loop {
            let pc = self.pc;
            match self.step() {
                Ok(()) => {},
                Err(StepBreak::Halt) => {
                    let code = self.reg_file[A0];
                    tracing::info!("program halted at pc = 0x{pc:08x} with exit code {code}");
                    self.state = SimState::End { pc, code };
                    // Watchers still see the halting instruction.
                    tripwire(self);
                    break Ok(());
                },
                Err(StepBreak::Err(e)) => {
                    tracing::error!("execution failed at pc = 0x{pc:08x}: {e}");
                    self.state = SimState::Abort { pc };
                    break Err(e);
                }
            }

            let keep_going = tripwire(self);
            if self.state != SimState::Running {
                break Ok(());
            }
            if !keep_going {
                self.state = SimState::Stop;
                break Ok(());
            }
        };

        tracing::debug!("executed {} instructions in total", self.instructions_run);
        result
    }

    /// Simulate exactly one instruction.
    ///
    /// On `ebreak`, the state becomes [`SimState::End`].
    /// On error, the state becomes [`SimState::Abort`].
    pub fn step_in(&mut self) -> Result<(), SimErr> {
        self.run_with_limit(1)
    }

    /// Simulates one step, executing one instruction.
    fn step(&mut self) -> Result<(), StepBreak> {
        let pc = self.pc;
        let inst = self.mem.read(pc, 4).ok_or(SimErr::AccessFault(pc))?;
        tracing::trace!("0x{pc:08x}: {inst:08x}");

        let opcode = inst & 0x7f;
        let rd = ((inst >> 7) & 0x1f) as usize;
        let funct3 = (inst >> 12) & 0x7;
        let rs1 = ((inst >> 15) & 0x1f) as usize;
        let rs2 = ((inst >> 20) & 0x1f) as usize;
        let funct7 = inst >> 25;

        let src1 = self.reg_file[rs1];
        let src2 = self.reg_file[rs2];
        let imm_i = ((inst as SWord) >> 20) as Word;
        let imm_s = (((inst as SWord) >> 25) << 5) as Word | ((inst >> 7) & 0x1f);
        let imm_b = (((inst as SWord) >> 31) as Word) << 12
            | ((inst >> 7) & 0x1) << 11
            | ((inst >> 25) & 0x3f) << 5
            | ((inst >> 8) & 0xf) << 1;
        let imm_u = inst & 0xffff_f000;
        let imm_j = (((inst as SWord) >> 31) as Word) << 20
            | (inst & 0x000f_f000)
            | ((inst >> 20) & 0x1) << 11
            | ((inst >> 21) & 0x3ff) << 1;

        let illegal = SimErr::IllegalInstr(inst);
        let mut next_pc = pc.wrapping_add(4);

        match opcode {
            // LUI
            0x37 => self.reg_file.set(rd, imm_u),
            // AUIPC
            0x17 => self.reg_file.set(rd, pc.wrapping_add(imm_u)),
            // JAL
            0x6f => {
                self.reg_file.set(rd, next_pc);
                next_pc = pc.wrapping_add(imm_j);
            },
            // JALR
            0x67 if funct3 == 0 => {
                let target = src1.wrapping_add(imm_i) & !1;
                self.reg_file.set(rd, next_pc);
                next_pc = target;
            },
            // BRANCH
            0x63 => {
                let taken = match funct3 {
                    0b000 => src1 == src2,
                    0b001 => src1 != src2,
                    0b100 => (src1 as SWord) < (src2 as SWord),
                    0b101 => (src1 as SWord) >= (src2 as SWord),
                    0b110 => src1 < src2,
                    0b111 => src1 >= src2,
                    _ => return Err(illegal.into())
                };
                if taken {
                    next_pc = pc.wrapping_add(imm_b);
                }
            },
            // LOAD
            0x03 => {
                let addr = src1.wrapping_add(imm_i);
                let (len, signed) = match funct3 {
                    0b000 => (1, true),
                    0b001 => (2, true),
                    0b010 => (4, false),
                    0b100 => (1, false),
                    0b101 => (2, false),
                    _ => return Err(illegal.into())
                };
                let data = self.paddr_read(addr, len).ok_or(SimErr::AccessFault(addr))?;
                let data = match (signed, len) {
                    (true, 1) => data as u8 as i8 as SWord as Word,
                    (true, 2) => data as u16 as i16 as SWord as Word,
                    _ => data
                };
                self.reg_file.set(rd, data);
            },
            // STORE
            0x23 => {
                let addr = src1.wrapping_add(imm_s);
                let len = match funct3 {
                    0b000 => 1,
                    0b001 => 2,
                    0b010 => 4,
                    _ => return Err(illegal.into())
                };
                self.paddr_write(addr, len, src2)?;
            },
            // OP-IMM
            0x13 => {
                let shamt = rs2 as u32;
                let result = match (funct3, funct7) {
                    (0b000, _) => src1.wrapping_add(imm_i),
                    (0b010, _) => Word::from((src1 as SWord) < (imm_i as SWord)),
                    (0b011, _) => Word::from(src1 < imm_i),
                    (0b100, _) => src1 ^ imm_i,
                    (0b110, _) => src1 | imm_i,
                    (0b111, _) => src1 & imm_i,
                    (0b001, 0x00) => src1 << shamt,
                    (0b101, 0x00) => src1 >> shamt,
                    (0b101, 0x20) => ((src1 as SWord) >> shamt) as Word,
                    _ => return Err(illegal.into())
                };
                self.reg_file.set(rd, result);
            },
            // OP
            0x33 => {
                let result = match (funct3, funct7) {
                    (0b000, 0x00) => src1.wrapping_add(src2),
                    (0b000, 0x20) => src1.wrapping_sub(src2),
                    (0b001, 0x00) => src1.wrapping_shl(src2),
                    (0b010, 0x00) => Word::from((src1 as SWord) < (src2 as SWord)),
                    (0b011, 0x00) => Word::from(src1 < src2),
                    (0b100, 0x00) => src1 ^ src2,
                    (0b101, 0x00) => src1.wrapping_shr(src2),
                    (0b101, 0x20) => (src1 as SWord).wrapping_shr(src2) as Word,
                    (0b110, 0x00) => src1 | src2,
                    (0b111, 0x00) => src1 & src2,
                    _ => return Err(illegal.into())
                };
                self.reg_file.set(rd, result);
            },
            // SYSTEM
            0x73 if inst == EBREAK => {
                self.instructions_run += 1;
                return Err(StepBreak::Halt);
            },
            _ => return Err(illegal.into())
        }

        self.pc = next_pc;
        self.instructions_run += 1;
        Ok(())
    }
}
impl EvalContext for Simulator {
    fn reg_value(&self, name: &str) -> Option<Word> {
        match name {
            "pc" => Some(self.pc),
            _ => RegFile::index_of(name).map(|i| self.reg_file[i])
        }
    }

    fn vaddr_read(&self, addr: Word, len: usize) -> Option<Word> {
        self.paddr_read(addr, len)
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::evaluate;
    use crate::Word;

    use super::device::SERIAL_PORT;
    use super::mem::MBASE;
    use super::{SimErr, SimFlags, SimState, Simulator};

    const T0: u32 = 5;
    const T1: u32 = 6;
    const A0: u32 = 10;
    const A1: u32 = 11;
    const A2: u32 = 12;
    const A3: u32 = 13;
    const RA: u32 = 1;
    const EBREAK: Word = 0x0010_0073;

    fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32) -> Word {
        funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | 0x33
    }
    fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> Word {
        (imm as u32) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }
    fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> Word {
        let imm = imm as u32;
        ((imm >> 5) & 0x7f) << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | (imm & 0x1f) << 7 | 0x23
    }
    fn b_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> Word {
        let imm = imm as u32;
        ((imm >> 12) & 1) << 31 | ((imm >> 5) & 0x3f) << 25 | rs2 << 20 | rs1 << 15
            | funct3 << 12 | ((imm >> 1) & 0xf) << 8 | ((imm >> 11) & 1) << 7 | 0x63
    }
    fn u_type(imm: u32, rd: u32, opcode: u32) -> Word {
        imm << 12 | rd << 7 | opcode
    }
    fn j_type(imm: i32, rd: u32) -> Word {
        let imm = imm as u32;
        ((imm >> 20) & 1) << 31 | ((imm >> 1) & 0x3ff) << 21 | ((imm >> 11) & 1) << 20
            | ((imm >> 12) & 0xff) << 12 | rd << 7 | 0x6f
    }
    fn addi(rd: u32, rs1: u32, imm: i32) -> Word {
        i_type(imm, rs1, 0b000, rd, 0x13)
    }

    fn load(program: &[Word]) -> Simulator {
        let mut sim = Simulator::new(SimFlags { msize: 0x1000, ..Default::default() });
        let image: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
        sim.load_image(&image).unwrap();
        sim
    }

    #[test]
    fn test_default_image_encoding() {
        assert_eq!(u_type(0, T0, 0x17), 0x00000297);
        assert_eq!(s_type(16, 0, T0, 0b000), 0x00028823);
        assert_eq!(i_type(16, T0, 0b100, A0, 0x03), 0x0102c503);
    }

    #[test]
    fn test_default_image() {
        let mut sim = Simulator::new(SimFlags { msize: 0x1000, ..Default::default() });
        sim.load_default_image().unwrap();
        assert_eq!(sim.paddr_read(MBASE + 16, 4), Some(0xdeadbeef));

        sim.run().unwrap();
        assert_eq!(sim.state(), SimState::End { pc: MBASE + 12, code: 0 });
        assert_eq!(sim.paddr_read(MBASE + 16, 4), Some(0xdeadbe00));
        assert_eq!(sim.instructions_run, 4);

        // cannot run after the end
        sim.run().unwrap();
        assert_eq!(sim.instructions_run, 4);
    }

    #[test]
    fn test_arith() {
        let mut sim = load(&[
            addi(T0, 0, -5),
            addi(T1, 0, 3),
            r_type(0x00, T1, T0, 0b000, A0), // add
            r_type(0x20, T1, T0, 0b000, A1), // sub
            r_type(0x00, T1, T0, 0b010, A2), // slt
            r_type(0x00, T1, T0, 0b011, A3), // sltu
            EBREAK,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[A0 as usize], (-2i32) as Word);
        assert_eq!(sim.reg_file[A1 as usize], (-8i32) as Word);
        assert_eq!(sim.reg_file[A2 as usize], 1);
        assert_eq!(sim.reg_file[A3 as usize], 0);

        let mut sim = load(&[
            addi(T0, 0, -16),
            i_type(2, T0, 0b101, A0, 0x13),                 // srli
            i_type(2 | (0x20 << 5), T0, 0b101, A1, 0x13),   // srai
            i_type(4, T0, 0b001, A2, 0x13),                 // slli
            i_type(0xff, T0, 0b111, A3, 0x13),              // andi
            EBREAK,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[A0 as usize], 0x3fff_fffc);
        assert_eq!(sim.reg_file[A1 as usize], (-4i32) as Word);
        assert_eq!(sim.reg_file[A2 as usize], (-256i32) as Word);
        assert_eq!(sim.reg_file[A3 as usize], 0xf0);
    }

    #[test]
    fn test_x0_hardwired() {
        let mut sim = load(&[addi(0, 0, 5), addi(A0, 0, 0), EBREAK]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[0], 0);
    }

    #[test]
    fn test_loop() {
        // sum 10 + 9 + ... + 1
        let mut sim = load(&[
            addi(A0, 0, 0),
            addi(T0, 0, 10),
            r_type(0x00, T0, A0, 0b000, A0),
            addi(T0, T0, -1),
            b_type(-8, 0, T0, 0b001), // bne t0, zero, -8
            EBREAK,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.state(), SimState::End { pc: MBASE + 20, code: 55 });
    }

    #[test]
    fn test_jumps() {
        let mut sim = load(&[
            j_type(8, RA),              // 0: jal ra, 8
            EBREAK,                     // 4
            addi(A0, 0, 3),             // 8
            i_type(0, RA, 0b000, 0, 0x67), // 12: jalr zero, 0(ra)
        ]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[RA as usize], MBASE + 4);
        assert_eq!(sim.state(), SimState::End { pc: MBASE + 4, code: 3 });
    }

    #[test]
    fn test_loads_stores() {
        let mut sim = load(&[
            u_type(0x80000, T0, 0x37),          // lui t0, 0x80000
            addi(T1, 0, -2),
            s_type(0x100, T1, T0, 0b010),        // sw t1, 0x100(t0)
            i_type(0x100, T0, 0b000, A0, 0x03), // lb
            i_type(0x100, T0, 0b101, A1, 0x03), // lhu
            i_type(0x100, T0, 0b001, A2, 0x03), // lh
            i_type(0x100, T0, 0b100, A3, 0x03), // lbu
            EBREAK,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.paddr_read(MBASE + 0x100, 4), Some(0xffff_fffe));
        assert_eq!(sim.reg_file[A0 as usize], 0xffff_fffe);
        assert_eq!(sim.reg_file[A1 as usize], 0xfffe);
        assert_eq!(sim.reg_file[A2 as usize], 0xffff_fffe);
        assert_eq!(sim.reg_file[A3 as usize], 0xfe);
    }

    #[test]
    fn test_serial() {
        let mut sim = load(&[
            u_type(0xa0000, T0, 0x37),
            addi(T1, 0, i32::from(b'h')),
            s_type(0x3f8, T1, T0, 0b000),
            addi(T1, 0, i32::from(b'i')),
            s_type(0x3f8, T1, T0, 0b000),
            addi(A0, 0, 0),
            EBREAK,
        ]);
        let rx = sim.take_serial_receiver().unwrap();
        assert!(sim.take_serial_receiver().is_none());
        sim.run().unwrap();

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), b"hi");
        assert_eq!(sim.paddr_read(SERIAL_PORT, 1), Some(0));
    }

    #[test]
    fn test_serial_disabled() {
        let mut sim = Simulator::new(SimFlags { msize: 0x1000, serial: false, ..Default::default() });
        assert!(sim.take_serial_receiver().is_none());
        assert_eq!(sim.paddr_write(SERIAL_PORT, 1, 0), Err(SimErr::AccessFault(SERIAL_PORT)));
    }

    #[test]
    fn test_errors() {
        let mut sim = load(&[addi(A0, 0, 1), 0xffff_ffff]);
        assert_eq!(sim.run(), Err(SimErr::IllegalInstr(0xffff_ffff)));
        assert_eq!(sim.state(), SimState::Abort { pc: MBASE + 4 });
        assert_eq!(sim.instructions_run, 1);

        let mut sim = load(&[i_type(0, 0, 0b010, A0, 0x03)]); // lw a0, 0(zero)
        assert_eq!(sim.run(), Err(SimErr::AccessFault(0)));

        let mut sim = load(&[]);
        sim.pc = MBASE + 0x1000;
        assert_eq!(sim.step_in(), Err(SimErr::AccessFault(MBASE + 0x1000)));

        let mut sim = Simulator::new(SimFlags { msize: 4, ..Default::default() });
        assert_eq!(sim.load_image(&[0; 5]), Err(SimErr::AccessFault(MBASE + 4)));
    }

    #[test]
    fn test_limits() {
        let mut sim = load(&[addi(A0, A0, 1), addi(A0, A0, 1), addi(A0, A0, 1), EBREAK]);
        sim.run_with_limit(0).unwrap();
        assert_eq!(sim.instructions_run, 0);
        sim.run_with_limit(2).unwrap();
        assert_eq!(sim.state(), SimState::Stop);
        assert_eq!(sim.reg_file[A0 as usize], 2);
        sim.step_in().unwrap();
        assert_eq!(sim.pc, MBASE + 12);
        sim.run_with_limit(10).unwrap();
        assert_eq!(sim.state(), SimState::End { pc: MBASE + 12, code: 3 });
    }

    #[test]
    fn test_eval_context() {
        let mut sim = load(&[addi(A0, 0, 7), EBREAK]);
        sim.step_in().unwrap();
        assert_eq!(evaluate("$a0", &sim), Ok(7));
        assert_eq!(evaluate("$x10 + $0", &sim), Ok(7));
        assert_eq!(evaluate("$pc", &sim), Ok(MBASE + 4));
        assert_eq!(evaluate("*$pc", &sim), Ok(EBREAK));
        assert!(evaluate("$r0", &sim).is_err());
        assert!(evaluate("*0", &sim).is_err());
    }
}
