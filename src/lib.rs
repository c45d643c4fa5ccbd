//! A simple debugger monitor (SDB) for an RV32 instruction-set simulator.
//!
//! The monitor lets a user stop and resume a simulated program, inspect its registers and memory,
//! evaluate expressions against the machine's state, and set watchpoints which
//! stop execution when the value of an expression changes.
//!
//! # Usage
//!
//! Expressions can be evaluated against any machine state (see [`expr::EvalContext`]),
//! including the bundled [`sim::Simulator`]:
//! ```
//! use sdb::expr::evaluate;
//! use sdb::sim::Simulator;
//!
//! let sim = Simulator::new(Default::default());
//! assert_eq!(evaluate("$pc", &sim), Ok(0x8000_0000));
//! assert_eq!(evaluate("(10 - 3 - 2) * 2 == 10", &sim), Ok(1));
//! ```
//!
//! The monitor itself ([`sdb::Sdb`]) executes debugger commands against a simulator:
//! ```
//! use sdb::sdb::{Control, Sdb};
//! use sdb::sim::Simulator;
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_default_image().unwrap();
//! let mut sdb = Sdb::new(sim);
//!
//! let mut out = Vec::new();
//! sdb.execute_line("w *0x80000010", &mut out).unwrap();
//! sdb.execute_line("c", &mut out).unwrap(); // stops when the watched word changes
//! assert_eq!(sdb.execute_line("q", &mut out).unwrap(), Control::Exit);
//!
//! let out = String::from_utf8(out).unwrap();
//! assert!(out.contains("Watchpoint 0: *0x80000010"));
//! ```
//!
//! See the [`sdb`] module for the available commands.
#![warn(missing_docs)]

pub mod expr;
pub mod sim;
pub mod sdb;
pub mod err;

/// The machine word of the simulated machine (the width of its registers).
pub type Word = u32;
/// The signed interpretation of a [`Word`], used for intermediate arithmetic.
pub type SWord = i32;
