//! # CLI - SensorFold interactive shell
//!
//! A REPL-style driver for the ingestion pipeline. Reads commands from
//! stdin, runs them against a filesystem object store and prints results
//! to stdout. Works interactively or scripted (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! INGEST container name  Merge one raw upload into the merged stream
//! FILLGAPS               Run gap filling over the merged stream
//! ECG name               Convert one gap-filled segment to an ECG object
//! CAT container name     Print an object
//! LS container           List a container
//! STATS                  Print session counters and configuration
//! EXIT / QUIT            Drain the merge queue and shut down
//! ```
//!
//! ## Configuration
//!
//! All settings come from `SENSORFOLD_*` environment variables, see
//! [`config::IngestConfig::from_env`]. `SENSORFOLD_ROOT` (default `data`)
//! is the storage directory: container `c`, object `n` lives at
//! `$SENSORFOLD_ROOT/c/n`. Log verbosity follows `RUST_LOG`.
//!
//! ## Example
//!
//! ```text
//! $ mkdir -p data/raw-uploads && printf '16,3000\n8,3000\n' > data/raw-uploads/a.csv
//! $ cargo run -p cli
//! SensorFold started (root=data, merged=merged-formatted-csv-file/merged.csv, order=Lexicographic)
//! > INGEST raw-uploads a.csv
//! OK merged 2 new records (0 existing, 2 total)
//! > CAT merged-formatted-csv-file merged.csv
//! 16,1011
//! 8,1011
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::IngestConfig;
use engine::{IngestReport, Ingestor, MergeQueue, RawEvent};
use log::info;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use storage::{FsStore, ObjectStore};

#[derive(Debug, Default)]
struct SessionStats {
    ingested: usize,
    duplicates: usize,
    failed: usize,
    records: usize,
}

fn describe(report: &IngestReport) -> String {
    if report.skipped_duplicate {
        return format!("OK skipped duplicate (crc={:08x})", report.fingerprint);
    }
    let mut msg = format!(
        "OK merged {} new records ({} existing, {} total)",
        report.batch_lines, report.existing_lines, report.written_lines
    );
    if report.attempts > 1 {
        msg.push_str(&format!(" after {} attempts", report.attempts));
    }
    msg
}

fn cat(store: &dyn ObjectStore, container: &str, name: &str) -> Result<()> {
    let mut reader = store.open_reader(container, name)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut reader, &mut out)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let config = IngestConfig::from_env()?;
    let store = Arc::new(
        FsStore::open(&config.root)
            .with_context(|| format!("failed to open storage root {}", config.root.display()))?,
    );
    let store_dyn: Arc<dyn ObjectStore> = store.clone();
    let queue = MergeQueue::start(Ingestor::new(store_dyn, config.clone())?)?;
    let mut stats = SessionStats::default();

    println!(
        "SensorFold started (root={}, merged={}/{}, order={:?})",
        config.root.display(),
        config.output_container,
        config.merged_name,
        config.order
    );
    println!("Commands: INGEST container name | FILLGAPS | ECG name");
    println!("          CAT container name | LS container | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "INGEST" => match (parts.next(), parts.next()) {
                    (Some(container), Some(name)) => {
                        match queue.ingest(RawEvent::new(container, name)) {
                            Ok(report) => {
                                if report.skipped_duplicate {
                                    stats.duplicates += 1;
                                } else {
                                    stats.ingested += 1;
                                    stats.records += report.batch_lines;
                                }
                                println!("{}", describe(&report));
                            }
                            Err(e) => {
                                stats.failed += 1;
                                println!("ERR ingest failed: {:#}", e);
                            }
                        }
                    }
                    _ => println!("ERR usage: INGEST container name"),
                },
                "FILLGAPS" => {
                    match postprocess::fill_gaps(
                        store.as_ref(),
                        &config,
                        &config.output_container,
                        &config.merged_name,
                    ) {
                        Ok(Some(report)) => {
                            for seg in &report.segments {
                                println!("{}", seg);
                            }
                            println!(
                                "OK {} segments ({} records, {} filled)",
                                report.segments.len(),
                                report.records,
                                report.filled
                            );
                        }
                        Ok(None) => println!("OK nothing to do"),
                        Err(e) => println!("ERR gap fill failed: {:#}", e),
                    }
                }
                "ECG" => {
                    if let Some(name) = parts.next() {
                        match postprocess::convert_to_ecg(
                            store.as_ref(),
                            &config,
                            &config.gaps_container,
                            name,
                        ) {
                            Ok(out) => println!("OK {}/{}", config.ecg_container, out),
                            Err(e) => println!("ERR ecg conversion failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: ECG name");
                    }
                }
                "CAT" => match (parts.next(), parts.next()) {
                    (Some(container), Some(name)) => {
                        if let Err(e) = cat(store.as_ref(), container, name) {
                            println!("ERR read failed: {:#}", e);
                        }
                    }
                    _ => println!("ERR usage: CAT container name"),
                },
                "LS" => {
                    if let Some(container) = parts.next() {
                        match store.list(container) {
                            Ok(names) if names.is_empty() => println!("(empty)"),
                            Ok(names) => {
                                for name in &names {
                                    println!("{}", name);
                                }
                                println!("({} objects)", names.len());
                            }
                            Err(e) => println!("ERR list failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: LS container");
                    }
                }
                "STATS" => {
                    println!("{:?}", stats);
                    println!("{:?}", config);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    queue.shutdown()?;
    info!(
        "session done: {} ingested, {} duplicates, {} failed",
        stats.ingested, stats.duplicates, stats.failed
    );
    Ok(())
}
