use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use sdb::sdb::{Control, Sdb};
use sdb::sim::mem::{MemInitStrategy, DEFAULT_MSIZE};
use sdb::sim::{SimFlags, SimState, Simulator};

const PROMPT: &str = "(sdb) ";

/// A simple debugger for RV32I programs.
#[derive(Parser, Debug)]
#[command(name = "sdb", version, about)]
struct Args {
    /// Raw program image, loaded at 0x80000000 (a built-in program is used if absent)
    image: Option<PathBuf>,

    /// Run the program to completion without entering the monitor
    #[arg(short, long)]
    batch: bool,

    /// Logging verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Size of physical memory in bytes (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_size, default_value_t = DEFAULT_MSIZE)]
    msize: usize,

    /// How memory is filled before loading: zero, random, fill=BYTE, or a numeric seed
    #[arg(long, default_value = "zero")]
    mem_init: MemInitStrategy,

    /// Do not map the serial port
    #[arg(long)]
    no_serial: bool,

    /// File to load and save command history
    #[arg(long)]
    history: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}
impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info  => tracing::Level::INFO,
            LogLevel::Warn  => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Logs as `LEVEL message` on stderr, so logs never mix with command output.
fn init_logger(level: LogLevel) {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_level(true)
        .compact()
        .with_filter(filter);

    Registry::default().with(layer).init();
}

fn parse_size(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(0) => Err("memory size must be positive".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn repl(sdb: &mut Sdb, history: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .build();
    let mut editor = DefaultEditor::with_config(config)?;
    if let Some(history) = history {
        if history.exists() {
            let _ = editor.load_history(history);
        }
    }

    println!("Welcome to SDB! Type `help` for the list of commands.");
    let mut stdout = std::io::stdout();

    let result = loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }

                let control = sdb.execute_line(&line, &mut stdout);
                stdout.flush()?;
                match control {
                    Ok(Control::Continue) => {},
                    Ok(Control::Exit) => break Ok(()),
                    Err(e) => break Err(anyhow::Error::new(e).context("debugging session ended")),
                }
            },
            // Ctrl-C discards the line
            Err(ReadlineError::Interrupted) => continue,
            // Ctrl-D
            Err(ReadlineError::Eof) => {
                sdb.sim.set_state(SimState::Quit);
                break Ok(());
            },
            Err(e) => break Err(e.into()),
        }
    };

    if let Some(history) = history {
        if let Err(e) = editor.save_history(history) {
            tracing::warn!("could not save history to {}: {e}", history.display());
        }
    }
    result
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logger(args.log_level);

    let flags = SimFlags {
        msize: args.msize,
        serial: !args.no_serial,
        mem_init: args.mem_init,
    };
    let mut sim = Simulator::new(flags);
    match &args.image {
        Some(path) => {
            let image = std::fs::read(path)
                .with_context(|| format!("cannot read image {}", path.display()))?;
            sim.load_image(&image)
                .with_context(|| format!("cannot load image {}", path.display()))?;
        },
        None => sim.load_default_image().context("cannot load the built-in image")?,
    }

    let mut sdb = Sdb::new(sim);
    match args.batch {
        true  => {
            let mut stdout = std::io::stdout();
            sdb.execute_line("c", &mut stdout).context("debugging session ended")?;
            stdout.flush()?;
        },
        false => repl(&mut sdb, args.history.as_deref())?,
    }

    let code = match sdb.sim.state() {
        SimState::End { code: 0, .. } | SimState::Quit => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    };
    Ok(code)
}
