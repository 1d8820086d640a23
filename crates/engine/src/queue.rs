//! Single-writer merge queue.
//!
//! Only one merge may be in flight against a merged stream at a time. The
//! queue owns the [`Ingestor`] on a dedicated thread and feeds it events in
//! submission order; callers get the result back on a per-event channel.
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::{IngestReport, Ingestor, RawEvent};

type Job = (RawEvent, Sender<Result<IngestReport>>);

/// Serializes ingestions onto one worker thread.
pub struct MergeQueue {
    /// `None` after shutdown.
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl MergeQueue {
    /// Spawns the writer thread.
    pub fn start(ingestor: Ingestor) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("merge-writer".to_string())
            .spawn(move || {
                for (event, reply) in rx {
                    let result = ingestor.ingest(&event);
                    if let Err(e) = &result {
                        warn!("ingest of {}/{} failed: {:#}", event.container, event.name, e);
                    }
                    // The submitter may have stopped waiting.
                    let _ = reply.send(result);
                }
                debug!("merge writer stopped");
            })
            .context("failed to spawn merge writer thread")?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queues `event` and returns the channel its result will arrive on.
    pub fn submit(&self, event: RawEvent) -> Result<Receiver<Result<IngestReport>>> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("merge queue is shut down"))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send((event, reply_tx))
            .map_err(|_| anyhow!("merge writer thread has exited"))?;
        Ok(reply_rx)
    }

    /// Queues `event` and blocks until it has been merged.
    pub fn ingest(&self, event: RawEvent) -> Result<IngestReport> {
        self.submit(event)?
            .recv()
            .map_err(|_| anyhow!("merge writer dropped the result"))?
    }

    /// Stops accepting events, drains the queue and joins the writer.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    pub(crate) fn stop(&mut self) -> Result<()> {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("merge writer thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for MergeQueue {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
