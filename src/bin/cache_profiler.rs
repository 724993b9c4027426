//! Cache and Memory Latency Profiler
//!
//! Sweeps working-set sizes, prints a live latency table and saves the results as CSV.
use cache_profiler_rs::config::{SweepConfig, doubling_sizes, fine_sizes};
use cache_profiler_rs::output::{self, format_row, table_header};
use cache_profiler_rs::{SizeResult, Sweep};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const KB: usize = 1024;
const MB: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(about = "Measure memory access latency across working-set sizes")]
struct Args {
    /// Smallest working set in KiB (doubling sweep)
    #[arg(long, default_value_t = 4)]
    min_kb: usize,

    /// Largest working set in KiB (doubling sweep)
    #[arg(long, default_value_t = 8 * 1024)]
    max_kb: usize,

    /// Explicit comma-separated sizes in KiB, overrides --min-kb/--max-kb
    #[arg(long, value_delimiter = ',', conflicts_with = "fine")]
    sizes_kb: Option<Vec<usize>>,

    /// Sweep 4 KiB to 8 MiB in 1.5x steps (21 sizes) instead of doubling
    #[arg(long)]
    fine: bool,

    /// Accesses timed per sample
    #[arg(short, long, default_value_t = cache_profiler_rs::config::DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Samples per size, reduced to their median
    #[arg(short, long, default_value_t = cache_profiler_rs::config::DEFAULT_SAMPLES)]
    samples: usize,

    /// Eviction buffer size in MiB
    #[arg(long, default_value_t = 32)]
    evict_mb: usize,

    /// CPU core to pin the measuring thread to
    #[arg(short, long, default_value_t = cache_profiler_rs::config::DEFAULT_CORE)]
    core: usize,

    /// Don't pin the measuring thread
    #[arg(long)]
    no_pin: bool,

    /// Sizes at or above this (MiB) use batched random offsets instead of a pointer chain
    #[arg(long, default_value_t = 64)]
    batch_threshold_mb: usize,

    /// Accesses per timed batch
    #[arg(long, default_value_t = cache_profiler_rs::harness::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Fixed RNG seed for reproducible chain layouts
    #[arg(long)]
    seed: Option<u64>,

    /// Directory results are written to
    #[arg(short, long, default_value = "measurements")]
    output_dir: PathBuf,

    /// Don't write a results file
    #[arg(long)]
    no_save: bool,
}

impl Args {
    fn sweep_config(&self) -> SweepConfig {
        let sizes = match &self.sizes_kb {
            Some(kb) => kb.iter().map(|k| k * KB).collect(),
            None if self.fine => fine_sizes(),
            None => doubling_sizes(self.min_kb * KB, self.max_kb * KB),
        };
        SweepConfig {
            sizes,
            iterations: self.iterations,
            samples_per_size: self.samples,
            eviction_bytes: self.evict_mb * MB,
            core: (!self.no_pin).then_some(self.core),
            batch_threshold_bytes: self.batch_threshold_mb * MB,
            batch_size: self.batch_size,
            seed: self.seed,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.sweep_config();
    if let Err(err) = config.validate() {
        error!("{}", err);
        return ExitCode::FAILURE;
    }

    println!("Cache & Memory Latency Measurement");
    println!("===================================");
    println!("Method: Pointer chasing with randomized permutation");
    println!(
        "Samples per size: {}, accesses per sample: {}\n",
        config.samples_per_size, config.iterations
    );

    // Rows are printed off the measuring thread so console I/O never lands inside a sample
    let (mut producer, mut consumer) = rtrb::RingBuffer::<SizeResult>::new(config.sizes.len());
    let presenter = thread::Builder::new()
        .name("presenter".to_string())
        .spawn(move || {
            println!("{}", table_header());
            let mut prev_latency = None;
            loop {
                match consumer.pop() {
                    Ok(result) => {
                        println!("{}", format_row(&result, prev_latency));
                        prev_latency = Some(result.latency_ns);
                    }
                    Err(_) if consumer.is_abandoned() && consumer.is_empty() => break,
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            }
        });
    let presenter = match presenter {
        Ok(handle) => handle,
        Err(err) => {
            error!("Couldn't spawn presenter thread: {}", err);
            return ExitCode::FAILURE;
        }
    };

    info!("Running tests...");
    let mut sweep = Sweep::new(config);
    let outcome = sweep.run_configured(&mut producer);
    drop(producer);

    if presenter.join().is_err() {
        error!("Presenter thread panicked");
    }

    let results = match outcome {
        Ok(results) => results,
        Err(err) => {
            error!("Sweep aborted: {}", err);
            return ExitCode::FAILURE;
        }
    };

    println!("\n← indicates significant latency jump (cache level transition)");

    if !args.no_save {
        // measurements are already on screen, so a failed save is reported but not fatal
        if let Err(err) = output::write_csv(&results, &args.output_dir) {
            error!("{}", err);
        }
    }

    ExitCode::SUCCESS
}
