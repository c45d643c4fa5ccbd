//! The debugger monitor.
//!
//! [`Sdb`] owns a [`Simulator`] and a [`WatchPool`], and executes debugger commands
//! (see [`cmd`] for the list of commands) against them.
//!
//! Each command is one line of text, executed with [`Sdb::execute_line`].
//! Command output is written to any [`Write`] sink,
//! so the monitor can be driven by a terminal, a script, or a test.
//!
//! ```
//! use sdb::sdb::{Control, Sdb};
//! use sdb::sim::Simulator;
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_default_image().unwrap();
//! let mut sdb = Sdb::new(sim);
//!
//! let mut out = Vec::new();
//! sdb.execute_line("si 2", &mut out).unwrap();
//! sdb.execute_line("p $pc", &mut out).unwrap();
//! assert_eq!(out, b"2147483656\n");
//! ```
pub mod cmd;
pub mod watch;

use std::io::Write;

use crossbeam_channel as cbc;

use crate::sim::{SimState, Simulator};
use watch::{PollErr, WatchEvent, WatchPool};

/// Whether the session should continue after a command.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Control {
    /// Keep reading commands.
    Continue,
    /// End the session.
    Exit,
}

/// Errors which end the debugging session.
#[derive(Debug)]
pub enum SdbErr {
    /// Output could not be written.
    Io(std::io::Error),
    /// A watchpoint could not be re-evaluated during execution.
    Poll(PollErr),
}
impl From<std::io::Error> for SdbErr {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
impl From<PollErr> for SdbErr {
    fn from(value: PollErr) -> Self {
        Self::Poll(value)
    }
}
impl std::fmt::Display for SdbErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdbErr::Io(e)   => write!(f, "could not write output: {e}"),
            SdbErr::Poll(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for SdbErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SdbErr::Io(e)   => Some(e),
            SdbErr::Poll(e) => Some(e),
        }
    }
}
impl crate::err::Error for SdbErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            SdbErr::Io(_)   => None,
            SdbErr::Poll(e) => crate::err::Error::help(e),
        }
    }
}

/// The debugger monitor.
#[derive(Debug)]
pub struct Sdb {
    /// The simulator being debugged.
    pub sim: Simulator,
    /// The active watchpoints.
    pub watchpoints: WatchPool,
    serial: Option<cbc::Receiver<u8>>,
}
impl Sdb {
    /// Creates a monitor for a simulator.
    ///
    /// If the simulator has a serial port, the monitor takes its output
    /// and writes it to the command output after each run.
    pub fn new(mut sim: Simulator) -> Self {
        let serial = sim.take_serial_receiver();
        Self { sim, watchpoints: WatchPool::new(), serial }
    }

    /// Executes one line of input.
    ///
    /// The first word of the line is the command, and the rest is its argument.
    /// Empty lines do nothing.
    ///
    /// Errors in the command itself (such as an invalid expression) are written to `out`,
    /// so the only errors returned are the ones which end the session.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Control, SdbErr> {
        let line = line.trim();
        if line.is_empty() { return Ok(Control::Continue) };

        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, args)) => (name, Some(args.trim_start())),
            None => (line, None),
        };
        cmd::dispatch(self, name, args, out)
    }

    /// Executes up to `n` instructions (or until the program ends if `n` is `None`).
    ///
    /// Watchpoints are checked after each instruction, and execution stops if any changed.
    /// Afterwards, serial output, watchpoint changes, and the program's end (if it ended)
    /// are reported to `out`.
    ///
    /// # Errors
    /// This fails if a watchpoint can no longer be evaluated (or if `out` cannot be written to).
    pub fn exec(&mut self, n: Option<u64>, out: &mut dyn Write) -> Result<(), SdbErr> {
        if self.sim.state().has_ended() {
            writeln!(out, "Program execution has ended. To restart the program, exit and run again.")?;
            return Ok(());
        }
        if n == Some(0) { return Ok(()) };

        let start = self.sim.instructions_run;
        let watchpoints = &mut self.watchpoints;
        let mut events: Vec<WatchEvent> = vec![];
        let mut poll_err = None;

        let result = self.sim.run_while(|sim| {
            match watchpoints.poll(&*sim) {
                Ok(ev) if ev.is_empty() => {},
                Ok(ev) => {
                    events = ev;
                    return false;
                },
                Err(e) => {
                    poll_err = Some(e);
                    return false;
                }
            }
            n.map_or(true, |n| sim.instructions_run.wrapping_sub(start) < n)
        });
        tracing::debug!("executed {} instructions", self.sim.instructions_run - start);

        self.drain_serial(out)?;
        if let Some(e) = poll_err {
            tracing::error!("{e}");
            self.sim.set_state(SimState::Quit);
            return Err(e.into());
        }
        for ev in events {
            writeln!(out, "Watchpoint {}: {}", ev.id, ev.expr)?;
            writeln!(out, "\tOld value = {}", ev.old)?;
            writeln!(out, "\tNew value = {}", ev.new)?;
        }

        match (result, self.sim.state()) {
            (Err(e), SimState::Abort { pc }) => writeln!(out, "ABORT at pc = 0x{pc:08x}: {e}")?,
            (Err(e), _) => writeln!(out, "ABORT: {e}")?,
            (Ok(()), SimState::End { pc, code: 0 }) => writeln!(out, "HIT GOOD TRAP at pc = 0x{pc:08x}")?,
            (Ok(()), SimState::End { pc, .. })      => writeln!(out, "HIT BAD TRAP at pc = 0x{pc:08x}")?,
            (Ok(()), _) => {}
        }
        Ok(())
    }

    /// Writes out everything sent to the serial port.
    fn drain_serial(&mut self, out: &mut dyn Write) -> std::io::Result<()> {
        if let Some(rx) = &self.serial {
            let bytes: Vec<u8> = rx.try_iter().collect();
            out.write_all(&bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::mem::MBASE;
    use crate::sim::{SimFlags, SimState, Simulator};
    use crate::Word;

    use super::{Control, Sdb, SdbErr};

    fn sdb_with(program: &[Word]) -> Sdb {
        let mut sim = Simulator::new(SimFlags { msize: 0x1000, ..Default::default() });
        let image: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
        sim.load_image(&image).unwrap();
        Sdb::new(sim)
    }

    fn run(sdb: &mut Sdb, line: &str) -> String {
        let mut out = vec![];
        sdb.execute_line(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_traps() {
        // addi a0, zero, 0; ebreak
        let mut sdb = sdb_with(&[0x00000513, 0x00100073]);
        assert_eq!(run(&mut sdb, "c"), "HIT GOOD TRAP at pc = 0x80000004\n");

        // addi a0, zero, 1; ebreak
        let mut sdb = sdb_with(&[0x00100513, 0x00100073]);
        assert_eq!(run(&mut sdb, "c"), "HIT BAD TRAP at pc = 0x80000004\n");
        assert_eq!(sdb.sim.state(), SimState::End { pc: MBASE + 4, code: 1 });

        assert_eq!(run(&mut sdb, "c"), "Program execution has ended. To restart the program, exit and run again.\n");
        assert_eq!(run(&mut sdb, "si"), "Program execution has ended. To restart the program, exit and run again.\n");
    }

    #[test]
    fn test_abort() {
        let mut sdb = sdb_with(&[0x00000513, 0xffffffff]);
        assert_eq!(run(&mut sdb, "c"), "ABORT at pc = 0x80000004: illegal instruction 0xffffffff\n");
        assert_eq!(run(&mut sdb, "c"), "Program execution has ended. To restart the program, exit and run again.\n");
    }

    #[test]
    fn test_serial_passthrough() {
        let mut sdb = sdb_with(&[
            0xa00002b7, // lui  t0, 0xa0000
            0x06f00313, // addi t1, zero, 'o'
            0x3e628c23, // sb   t1, 0x3f8(t0)
            0x06b00313, // addi t1, zero, 'k'
            0x3e628c23, // sb   t1, 0x3f8(t0)
            0x00000513, // addi a0, zero, 0
            0x00100073, // ebreak
        ]);
        assert_eq!(run(&mut sdb, "si 3"), "o");
        assert_eq!(run(&mut sdb, "c"), "kHIT GOOD TRAP at pc = 0x80000018\n");
    }

    #[test]
    fn test_step_counts() {
        let mut sdb = sdb_with(&[0x00150513, 0x00150513, 0x00150513, 0x00100073]);
        assert_eq!(run(&mut sdb, "si 0"), "");
        assert_eq!(sdb.sim.pc, MBASE);
        assert_eq!(run(&mut sdb, "si"), "");
        assert_eq!(sdb.sim.pc, MBASE + 4);
        assert_eq!(run(&mut sdb, "si 2"), "");
        assert_eq!(sdb.sim.pc, MBASE + 12);
        assert_eq!(sdb.sim.state(), SimState::Stop);
        assert_eq!(run(&mut sdb, "si 5"), "HIT BAD TRAP at pc = 0x8000000c\n");
    }

    #[test]
    fn test_watchpoint_stops() {
        let mut sim = Simulator::new(SimFlags { msize: 0x1000, ..Default::default() });
        sim.load_default_image().unwrap();
        let mut sdb = Sdb::new(sim);

        assert_eq!(run(&mut sdb, "w *0x80000010"), "Watchpoint 0: *0x80000010\n");
        assert_eq!(run(&mut sdb, "c"), concat!(
            "Watchpoint 0: *0x80000010\n",
            "\tOld value = 3735928559\n",
            "\tNew value = 3735928320\n",
        ));
        assert_eq!(sdb.sim.state(), SimState::Stop);
        assert_eq!(sdb.sim.pc, MBASE + 8);

        assert_eq!(run(&mut sdb, "c"), "HIT GOOD TRAP at pc = 0x8000000c\n");
        assert_eq!(run(&mut sdb, "q").len(), 0);
    }

    #[test]
    fn test_poll_failure_is_fatal() {
        let mut sim = Simulator::new(SimFlags { msize: 0x1000, ..Default::default() });
        sim.load_default_image().unwrap();
        let mut sdb = Sdb::new(sim);

        // valid while t0 == 0, then t0 becomes 0x80000000
        run(&mut sdb, "w *($t0 + 0x80000000)");
        let err = sdb.execute_line("c", &mut vec![]).unwrap_err();
        let SdbErr::Poll(e) = err else { panic!("expected poll error, got {err:?}") };
        assert_eq!(e.id, 0);
        assert_eq!(sdb.sim.state(), SimState::Quit);
    }

    #[test]
    fn test_quit() {
        let mut sdb = sdb_with(&[0x00100073]);
        assert_eq!(sdb.execute_line("q", &mut vec![]).unwrap(), Control::Exit);
        assert_eq!(sdb.sim.state(), SimState::Quit);
        assert_eq!(sdb.execute_line("   ", &mut vec![]).unwrap(), Control::Continue);
    }
}
