//! Stream text through a ring between two host processes and time it.

use anyhow::Result;
use clap::Parser;
use magring_bench::{run, BenchConfig};

#[derive(Parser, Debug)]
#[command(name = "magring-bench")]
#[command(about = "Producer/consumer throughput through a magring ring")]
struct Args {
    /// MiB to stream per run
    #[arg(long, default_value_t = 100)]
    mib: usize,

    /// Seed of the byte generator
    #[arg(long, default_value_t = 12)]
    data_seed: u32,

    /// Seed of the write-size generator
    #[arg(long, default_value_t = 555)]
    send_seed: u32,

    /// Ring name
    #[arg(long, default_value = "magic!")]
    name: String,

    /// Number of runs
    #[arg(long, default_value_t = 1)]
    runs: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = BenchConfig {
        total_bytes: args.mib * 1024 * 1024,
        data_seed: args.data_seed,
        send_seed: args.send_seed,
        name: args.name,
    };
    log::info!("{:?}", config);

    for i in 1..=args.runs {
        let report = run(&config)?;
        println!("run {}: {}", i, report);
    }
    Ok(())
}
