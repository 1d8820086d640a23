use super::helpers::{memory_ingestor, merged_lines, RAW};
use crate::*;
use anyhow::Result;
use config::IngestConfig;
use std::sync::Arc;
use std::thread;

#[test]
fn queue_runs_ingestions_in_order() -> Result<()> {
    let cfg = IngestConfig::default();
    let (store, ingestor) = memory_ingestor(cfg.clone());
    store.put(RAW, "a.csv", b"10,0\n")?;
    store.put(RAW, "b.csv", b"20,0\n")?;

    let queue = MergeQueue::start(ingestor)?;
    let first = queue.submit(RawEvent::new(RAW, "a.csv"))?;
    let second = queue.submit(RawEvent::new(RAW, "b.csv"))?;

    let r1 = first.recv()??;
    let r2 = second.recv()??;
    assert_eq!(r1.written_lines, 1);
    assert_eq!(r2.existing_lines, 1);
    assert_eq!(r2.written_lines, 2);
    queue.shutdown()?;

    assert_eq!(merged_lines(&store, &cfg), vec!["10,511\n", "20,511\n"]);
    Ok(())
}

#[test]
fn concurrent_submitters_lose_no_records() -> Result<()> {
    let cfg = IngestConfig::default();
    let (store, ingestor) = memory_ingestor(cfg.clone());
    for i in 0..16 {
        store.put(RAW, &format!("{:02}.csv", i), format!("{:04},0,{:04},6\n", i, 100 + i).as_bytes())?;
    }

    let queue = Arc::new(MergeQueue::start(ingestor)?);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let q = Arc::clone(&queue);
            thread::spawn(move || q.ingest(RawEvent::new(RAW, format!("{:02}.csv", i))))
        })
        .collect();
    for h in handles {
        h.join().expect("submitter panicked")?;
    }

    let lines = merged_lines(&store, &cfg);
    assert_eq!(lines.len(), 32);
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);
    Ok(())
}

#[test]
fn failed_ingest_is_reported_and_queue_keeps_running() -> Result<()> {
    let (store, ingestor) = memory_ingestor(IngestConfig::default());
    store.put(RAW, "ok.csv", b"1,0\n")?;

    let queue = MergeQueue::start(ingestor)?;
    assert!(queue.ingest(RawEvent::new(RAW, "missing.csv")).is_err());
    assert_eq!(queue.ingest(RawEvent::new(RAW, "ok.csv"))?.batch_lines, 1);
    Ok(())
}

#[test]
fn submit_after_shutdown_fails() -> Result<()> {
    let (_store, ingestor) = memory_ingestor(IngestConfig::default());
    let mut queue = MergeQueue::start(ingestor)?;
    queue.stop()?;
    assert!(queue.submit(RawEvent::new(RAW, "a.csv")).is_err());
    Ok(())
}
