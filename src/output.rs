//! Result presentation: the console table streamed during a sweep and the CSV file written after.
use crate::error::{ProfilerError, Result};
use crate::format_size_fixed_int;
use crate::sweep::SizeResult;
use chrono::Local;
use log::info;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "Size_KB,Latency_ns,Throughput_MBps";

/// day_month_year-hour_minute_second
const TIMESTAMP_FORMAT: &str = "%d_%m_%Y-%H_%M_%S";

/// Heuristic cache level from latency. Thresholds fit a typical modern desktop part.
pub fn estimate_level(latency_ns: f64) -> &'static str {
    if latency_ns < 2.0 {
        "L1d"
    } else if latency_ns < 6.0 {
        "L1d/L2"
    } else if latency_ns < 15.0 {
        "L2"
    } else if latency_ns < 50.0 {
        "L3"
    } else {
        "DRAM"
    }
}

/// Table header matching [`format_row`]
pub fn table_header() -> String {
    format!(
        "{:>10} {:>15} {:>20} {:>10}\n{:-<10} {:-<15} {:-<20} {:-<10}",
        "Size", "Latency (ns)", "Throughput (MB/s)", "Est. Level", "", "", "", ""
    )
}

/// One console row. `prev_latency` flags jumps of more than 1.5x, which usually mark a cache
/// level transition.
pub fn format_row(result: &SizeResult, prev_latency: Option<f64>) -> String {
    let jump = match prev_latency {
        Some(prev) if prev > 0.0 && result.latency_ns > prev * 1.5 => " ←",
        _ => "",
    };
    let degraded = if result.degraded { " (degraded)" } else { "" };
    format!(
        "{:>10} {:>12.2} ns {:>20.2} {:>10}{}{}",
        format_size_fixed_int(result.size_bytes as u64),
        result.latency_ns,
        result.throughput_mbps(),
        estimate_level(result.latency_ns),
        jump,
        degraded
    )
}

/// CSV body: header plus one row per result, sizes in KiB
pub fn write_rows<W: Write>(mut out: W, results: &[SizeResult]) -> std::io::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for r in results {
        writeln!(out, "{},{},{}", r.size_kb(), r.latency_ns, r.throughput_mbps())?;
    }
    out.flush()
}

/// Local-time stamp embedded in result filenames
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Create `<dir>/<stem>.csv`, or `<stem>_1.csv`, `<stem>_2.csv`, ... if taken. Never truncates.
fn create_unique(dir: &Path, stem: &str) -> std::io::Result<(PathBuf, File)> {
    let mut suffix = 0usize;
    loop {
        let name = if suffix == 0 {
            format!("{stem}.csv")
        } else {
            format!("{stem}_{suffix}.csv")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(err) => return Err(err),
        }
    }
}

/// Write `results` to `<dir>/results_<timestamp>.csv`, creating `dir` if needed.
/// Returns the written path.
pub fn write_csv(results: &[SizeResult], dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| ProfilerError::OutputWrite {
            path: dir.to_path_buf(),
            source,
        })?;
        info!("Created directory: {}", dir.display());
    }

    let stem = format!("results_{}", timestamp());
    let (path, file) =
        create_unique(dir, &stem).map_err(|source| ProfilerError::OutputWrite {
            path: dir.join(format!("{stem}.csv")),
            source,
        })?;
    write_rows(BufWriter::new(file), results).map_err(|source| ProfilerError::OutputWrite {
        path: path.clone(),
        source,
    })?;

    info!("Results saved to {}", path.display());
    Ok(path)
}
