//! Background writer thread
//!
//! Picks framed records off the hand-off slot, writes them at their
//! reserved offset and resolves each job's completion signal.

use std::io;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};

use crate::storage::{self, SharedFile};

/// Completion signal: bytes written, or the write's failure
pub type Completion = io::Result<usize>;

/// One value write handed to the worker
pub struct WriteJob {
    /// Prefix position of the record
    pub offset: u64,

    /// Prefix + payload, ready to write
    pub framed: Bytes,

    /// Resolved once the bytes are in the file
    pub done: Sender<Completion>,
}

/// Handle to a running writer thread
pub struct Worker {
    /// Hand-off slot; `None` is the shutdown sentinel
    slot: Sender<Option<WriteJob>>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn the writer thread over `file`.
    ///
    /// The slot holds a single job: a second hand-off blocks until the
    /// worker has picked up the first.
    pub fn spawn(file: SharedFile) -> io::Result<Self> {
        let (slot, jobs) = channel::bounded::<Option<WriteJob>>(1);
        let handle = thread::Builder::new()
            .name("chestkv-writer".to_string())
            .spawn(move || run(file, jobs))?;

        Ok(Self { slot, handle })
    }

    /// Hand a job to the worker. Returns false if the thread is gone.
    pub fn hand_off(&self, job: WriteJob) -> bool {
        self.slot.send(Some(job)).is_ok()
    }

    /// Send the sentinel and join. Jobs already handed off are written first.
    ///
    /// Returns false if the thread panicked.
    pub fn stop(self) -> bool {
        // A send error means the thread already exited; join still reports how.
        let _ = self.slot.send(None);
        self.handle.join().is_ok()
    }
}

fn run(file: SharedFile, jobs: Receiver<Option<WriteJob>>) {
    tracing::debug!("Writer thread started");
    let mut written = 0u64;

    while let Ok(Some(job)) = jobs.recv() {
        let result = {
            let mut file = file.lock();
            storage::write_all_at(&mut file, job.offset, &job.framed)
        };
        if let Ok(n) = result {
            written += n as u64;
        }
        // The caller may have stopped caring about this signal.
        let _ = job.done.send(result);
    }

    tracing::debug!(bytes = written, "Writer thread stopped");
}
