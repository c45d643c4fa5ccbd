//! Writes random expression fixtures (`<expected> <expression>` lines) to stdout,
//! for use with the monitor's `test` command.
use std::io::{BufWriter, Write};

use clap::Parser;

use sdb::expr::gen::ExprGen;

/// Generates random expressions along with their expected values.
#[derive(Parser, Debug)]
#[command(name = "gen-expr", version, about)]
struct Args {
    /// Number of expressions to generate
    #[arg(default_value_t = 100)]
    count: usize,

    /// Seed for the generator (a random seed is used if absent)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut gen = ExprGen::seeded(seed);

    let mut out = BufWriter::new(std::io::stdout().lock());
    for _ in 0..args.count {
        writeln!(out, "{}", gen.generate().fixture_line())?;
    }
    out.flush()?;
    Ok(())
}
