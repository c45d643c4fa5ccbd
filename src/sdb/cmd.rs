//! Debugger commands.
//!
//! | command | description |
//! |---|---|
//! | `help [CMD]` | list the commands, or describe one |
//! | `c` | continue until the program ends |
//! | `q` | quit |
//! | `si [N]` | execute `N` instructions (default 1, negative runs freely) |
//! | `info r` / `info w` | print the registers / the watchpoints |
//! | `x N EXPR` | print `N` bytes of memory starting at `EXPR` |
//! | `p EXPR` | print the value of `EXPR` |
//! | `w EXPR` | stop when the value of `EXPR` changes |
//! | `d N` | delete watchpoint `N` |
//! | `test [FILE]` | check expression results against a fixture file |
//!
//! Problems with a command (such as bad arguments or an invalid expression)
//! are reported to the output and never end the session.
use std::io::Write;
use std::path::Path;

use crate::expr::{evaluate, EvalErr};
use crate::sim::SimState;
use crate::Word;

use super::watch::WpErr;
use super::{Control, Sdb, SdbErr};

/// The fixture file read by `test` when none is given.
pub const DEFAULT_FIXTURE: &str = "/tmp/rand-input.txt";

/// A command handler.
///
/// Handlers take the monitor, the command's argument (if one was given), and the output sink.
pub type Handler = fn(&mut Sdb, Option<&str>, &mut dyn Write) -> Result<Control, SdbErr>;

/// A debugger command.
#[derive(Clone, Copy)]
pub struct Command {
    /// The word which invokes the command.
    pub name: &'static str,
    /// Usage and description (printed by `help`).
    pub description: &'static str,
    /// The function executing the command.
    pub handler: Handler,
}
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// All commands.
pub const COMMANDS: &[Command] = &[
    Command { name: "help", description: "Display information about all supported commands", handler: cmd_help },
    Command { name: "c",    description: "Continue the execution of the program", handler: cmd_c },
    Command { name: "q",    description: "Exit SDB", handler: cmd_q },
    Command { name: "si",   description: "si [N]: Execute N instructions (1 by default, negative to run freely), then pause", handler: cmd_si },
    Command { name: "info", description: "info r: Print the registers; info w: Print the watchpoints", handler: cmd_info },
    Command { name: "x",    description: "x N EXPR: Print N bytes of memory starting at the value of EXPR", handler: cmd_x },
    Command { name: "p",    description: "p EXPR: Print the value of EXPR", handler: cmd_p },
    Command { name: "w",    description: "w EXPR: Pause execution when the value of EXPR changes", handler: cmd_w },
    Command { name: "d",    description: "d N: Delete watchpoint N", handler: cmd_d },
    Command { name: "test", description: "test [FILE]: Check expression evaluation against a file of `<expected> <expr>` lines", handler: cmd_test },
];

/// Finds a command by name.
pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub(super) fn dispatch(sdb: &mut Sdb, name: &str, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    match find(name) {
        Some(cmd) => (cmd.handler)(sdb, args, out),
        None => {
            writeln!(out, "Unknown command '{name}'")?;
            Ok(Control::Continue)
        }
    }
}

/// Prints an expression error, pointing at the failing part of the expression if possible.
fn report_eval_err(out: &mut dyn Write, text: &str, e: &EvalErr) -> std::io::Result<()> {
    writeln!(out, "Invalid expression: {e}")?;
    if let Some(span) = crate::err::Error::span(e) {
        let col = text.get(..span.start).map_or(span.start, |s| s.chars().count());
        writeln!(out, "    {text}")?;
        writeln!(out, "    {:col$}^", "")?;
    }
    if let Some(help) = crate::err::Error::help(e) {
        writeln!(out, "help: {help}")?;
    }
    Ok(())
}

/// Evaluates an expression against the simulator, reporting any error.
fn eval_reported(sdb: &Sdb, text: &str, out: &mut dyn Write) -> std::io::Result<Option<Word>> {
    match evaluate(text, &sdb.sim) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            report_eval_err(out, text, &e)?;
            Ok(None)
        }
    }
}

fn cmd_help(_sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    match args.and_then(|a| a.split_whitespace().next()) {
        None => {
            for cmd in COMMANDS {
                writeln!(out, "{} - {}", cmd.name, cmd.description)?;
            }
        },
        Some(name) => match find(name) {
            Some(cmd) => writeln!(out, "{} - {}", cmd.name, cmd.description)?,
            None => writeln!(out, "Unknown command '{name}'")?,
        }
    }
    Ok(Control::Continue)
}

fn cmd_c(sdb: &mut Sdb, _args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    sdb.exec(None, out)?;
    Ok(Control::Continue)
}

fn cmd_q(sdb: &mut Sdb, _args: Option<&str>, _out: &mut dyn Write) -> Result<Control, SdbErr> {
    sdb.sim.set_state(SimState::Quit);
    Ok(Control::Exit)
}

fn cmd_si(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    let n = match args.and_then(|a| a.split_whitespace().next()) {
        None => 1,
        Some(s) => match s.parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                writeln!(out, "Invalid step count '{s}'")?;
                return Ok(Control::Continue);
            }
        }
    };

    // a negative count runs without a limit
    sdb.exec(u64::try_from(n).ok(), out)?;
    Ok(Control::Continue)
}

fn cmd_info(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    match args.and_then(|a| a.split_whitespace().next()) {
        Some("r") => {
            for (name, value) in sdb.sim.reg_file.iter() {
                writeln!(out, "{name:<8}0x{value:08x}    {value}")?;
            }
            let pc = sdb.sim.pc;
            writeln!(out, "{:<8}0x{pc:08x}    {pc}", "pc")?;
        },
        Some("w") if sdb.watchpoints.is_empty() => writeln!(out, "No watchpoints.")?,
        Some("w") => {
            writeln!(out, "{:<8}{:<12}What", "Num", "Value")?;
            for wp in sdb.watchpoints.iter() {
                writeln!(out, "{:<8}{:<12}{}", wp.id(), wp.value(), wp.expr())?;
            }
        },
        _ => writeln!(out, "Usage: info r | info w")?,
    }
    Ok(Control::Continue)
}

fn cmd_x(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    let Some((n, expr)) = args.and_then(|a| a.split_once(char::is_whitespace)) else {
        writeln!(out, "Usage: x N EXPR")?;
        return Ok(Control::Continue);
    };
    let Ok(n) = n.parse::<usize>() else {
        writeln!(out, "Invalid byte count '{n}'")?;
        return Ok(Control::Continue);
    };
    let expr = expr.trim();
    let Some(base) = eval_reported(sdb, expr, out)? else { return Ok(Control::Continue) };

    for i in 0..n {
        let addr = base.wrapping_add(i as Word);
        let Some(byte) = sdb.sim.paddr_read(addr, 1) else {
            if i % 16 != 0 {
                writeln!(out)?;
            }
            writeln!(out, "Cannot access memory at address 0x{addr:08x}")?;
            return Ok(Control::Continue);
        };

        write!(out, "{byte:02x} ")?;
        if i % 16 == 15 {
            writeln!(out)?;
        }
    }
    if n % 16 != 0 {
        writeln!(out)?;
    }
    Ok(Control::Continue)
}

fn cmd_p(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    let Some(expr) = args else {
        writeln!(out, "Usage: p EXPR")?;
        return Ok(Control::Continue);
    };
    if let Some(value) = eval_reported(sdb, expr, out)? {
        writeln!(out, "{value}")?;
    }
    Ok(Control::Continue)
}

fn cmd_w(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    let Some(expr) = args else {
        writeln!(out, "Usage: w EXPR")?;
        return Ok(Control::Continue);
    };

    match sdb.watchpoints.add(expr, &sdb.sim) {
        Ok(id) => writeln!(out, "Watchpoint {id}: {expr}")?,
        Err(WpErr::InvalidExpression(e)) => report_eval_err(out, expr, &e)?,
        Err(e) => writeln!(out, "Cannot add watchpoint: {e}")?,
    }
    Ok(Control::Continue)
}

fn cmd_d(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    let Some(arg) = args else {
        writeln!(out, "Usage: d N")?;
        return Ok(Control::Continue);
    };
    let Ok(id) = arg.parse::<u8>() else {
        writeln!(out, "Invalid watchpoint number '{arg}'")?;
        return Ok(Control::Continue);
    };

    match sdb.watchpoints.remove(id) {
        Ok(()) => writeln!(out, "Deleted watchpoint {id}")?,
        Err(_) => writeln!(out, "No watchpoint number {id}.")?,
    }
    Ok(Control::Continue)
}

fn cmd_test(sdb: &mut Sdb, args: Option<&str>, out: &mut dyn Write) -> Result<Control, SdbErr> {
    let path = Path::new(args.and_then(|a| a.split_whitespace().next()).unwrap_or(DEFAULT_FIXTURE));
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            writeln!(out, "Cannot read {}: {e}", path.display())?;
            return Ok(Control::Continue);
        }
    };

    let (mut passed, mut failed) = (0usize, 0usize);
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let case = line.split_once(char::is_whitespace)
            .and_then(|(expected, expr)| Some((expected.parse::<Word>().ok()?, expr)));
        let Some((expected, expr)) = case else {
            writeln!(out, "Fail: malformed line '{line}'")?;
            failed += 1;
            continue;
        };

        match evaluate(expr, &sdb.sim) {
            Ok(got) if got == expected => {
                writeln!(out, "Pass")?;
                passed += 1;
            },
            Ok(got) => {
                writeln!(out, "Fail: expected {expected}, got {got} ({expr})")?;
                failed += 1;
            },
            Err(e) => {
                writeln!(out, "Fail: expected {expected}, got error: {e} ({expr})")?;
                failed += 1;
            }
        }
    }

    tracing::info!("fixture {}: {passed} passed, {failed} failed", path.display());
    writeln!(out, "{passed} passed, {failed} failed")?;
    Ok(Control::Continue)
}
