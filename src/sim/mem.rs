//! Memory handling for the simulator.
//!
//! This module consists of:
//! - [`Mem`]: The physical memory.
//! - [`RegFile`]: The general purpose register file.
//! - [`MemInitStrategy`]: How memory is filled before an image is loaded.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::Word;

/// The address where physical memory starts.
pub const MBASE: Word = 0x8000_0000;

/// The default size of physical memory (128 MiB).
pub const DEFAULT_MSIZE: usize = 0x800_0000;

/// Strategy used to fill physical memory when the simulator is created.
///
/// Real memory does not start zeroed, so filling memory with random data
/// can help catch programs that read memory before writing it.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum MemInitStrategy {
    /// Fills memory with a fixed byte.
    Known {
        /// The byte to fill with.
        value: u8
    },

    /// Fills memory with random data from an unseeded RNG.
    Unseeded,

    /// Fills memory with random data from a seeded RNG.
    Seeded {
        /// The seed.
        seed: u64
    },

    /// Fills memory with zeroes.
    #[default]
    Zeroed,
}
impl std::str::FromStr for MemInitStrategy {
    type Err = String;

    /// Parses a strategy: `zero`, `random`, `fill=BYTE`, or a numeric seed.
    ///
    /// Numbers can be decimal or `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn parse_num<T: TryFrom<u64>>(s: &str) -> Option<T> {
            let n = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok()?,
                None => s.parse().ok()?,
            };
            T::try_from(n).ok()
        }

        match s {
            "zero" => Ok(MemInitStrategy::Zeroed),
            "random" => Ok(MemInitStrategy::Unseeded),
            _ => match s.strip_prefix("fill=") {
                Some(byte) => parse_num(byte)
                    .map(|value| MemInitStrategy::Known { value })
                    .ok_or_else(|| format!("invalid fill byte '{byte}'")),
                None => parse_num(s)
                    .map(|seed| MemInitStrategy::Seeded { seed })
                    .ok_or_else(|| format!("expected 'zero', 'random', 'fill=BYTE', or a seed, got '{s}'")),
            }
        }
    }
}
impl MemInitStrategy {
    fn fill(&self, data: &mut [u8]) {
        match *self {
            MemInitStrategy::Zeroed => {},
            MemInitStrategy::Known { value } => data.fill(value),
            MemInitStrategy::Unseeded => rand::thread_rng().fill_bytes(data),
            MemInitStrategy::Seeded { seed } => StdRng::seed_from_u64(seed).fill_bytes(data),
        }
    }
}

/// The simulator's physical memory.
///
/// Physical memory spans `MBASE..MBASE + size`.
/// Accesses are little-endian and can be 1, 2, or 4 bytes wide.
pub struct Mem {
    data: Box<[u8]>
}
impl Mem {
    /// Creates a new memory of the given size, filling it according to the strategy.
    pub fn new(size: usize, init: MemInitStrategy) -> Self {
        let mut data = vec![0; size].into_boxed_slice();
        init.fill(&mut data);
        Self { data }
    }

    /// The number of bytes in memory.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Computes the range in the data array that an access covers,
    /// if the access is fully in bounds.
    fn range(&self, addr: Word, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(addr.checked_sub(MBASE)?).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }

    /// Reads a little-endian value of `len` bytes (1, 2, or 4).
    ///
    /// This returns `None` if the access is out of bounds.
    pub fn read(&self, addr: Word, len: usize) -> Option<Word> {
        debug_assert!(matches!(len, 1 | 2 | 4), "invalid access width {len}");

        let bytes = &self.data[self.range(addr, len)?];
        let mut buf = [0; 4];
        buf[..len].copy_from_slice(bytes);
        Some(Word::from_le_bytes(buf))
    }

    /// Writes the low `len` bytes (1, 2, or 4) of `data` in little-endian order.
    ///
    /// This returns whether the write was in bounds.
    pub fn write(&mut self, addr: Word, len: usize, data: Word) -> bool {
        debug_assert!(matches!(len, 1 | 2 | 4), "invalid access width {len}");

        match self.range(addr, len) {
            Some(r) => {
                self.data[r].copy_from_slice(&data.to_le_bytes()[..len]);
                true
            },
            None => false
        }
    }

    /// Copies a block of bytes into memory, returning whether it fit.
    pub fn copy_block(&mut self, addr: Word, block: &[u8]) -> bool {
        match self.range(addr, block.len()) {
            Some(r) => {
                self.data[r].copy_from_slice(block);
                true
            },
            None => false
        }
    }
}
impl std::fmt::Debug for Mem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem")
            .field("base", &format_args!("0x{MBASE:08x}"))
            .field("size", &format_args!("0x{:x}", self.data.len()))
            .finish()
    }
}

/// The ABI names of the registers, indexed by register number.
pub const REG_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
    "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// The register file (`x0`-`x31`).
///
/// `x0` is hardwired to zero. Writes to it through [`RegFile::set`] are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegFile([Word; 32]);
impl RegFile {
    /// Creates a new register file with all registers set to 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a register (unless it is `x0`).
    pub fn set(&mut self, reg: usize, data: Word) {
        if reg != 0 {
            self.0[reg] = data;
        }
    }

    /// Finds the register number for a register name.
    ///
    /// This accepts ABI names (`sp`, `a0`), numeric names (`x2`, `x10`), and `0` for `zero`.
    /// `fp` is accepted as an alias of `s0`.
    pub fn index_of(name: &str) -> Option<usize> {
        match name {
            "0"  => return Some(0),
            "fp" => return Some(8),
            _ => {}
        }
        if let Some(i) = REG_NAMES.iter().position(|&n| n == name) {
            return Some(i);
        }

        name.strip_prefix('x')
            .filter(|n| !n.starts_with('0') || *n == "0")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&i| i < 32)
    }

    /// Iterates over each register's name and value.
    pub fn iter(&self) -> impl Iterator<Item=(&'static str, Word)> + '_ {
        REG_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}
impl std::ops::Index<usize> for RegFile {
    type Output = Word;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}
