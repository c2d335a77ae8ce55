//! Write-back Module
//!
//! Takes data-file value writes off the caller's critical path while keeping
//! read-your-writes.
//!
//! ## Protocol
//! ```text
//!  caller                      slot (cap 1)              writer thread
//!  ──────                      ────────────              ─────────────
//!  reserve offset, update index
//!  submit(job) ───────────────► [job] ──────────────────► write at offset
//!  keep Receiver ◄──────────────────────── done.send(bytes | io error)
//!  wait() before touching the file
//! ```
//! - The caller blocks on `submit` only while the slot still holds an
//!   unconsumed job.
//! - Jobs are written in hand-off order (one slot, one worker).
//! - A failed write surfaces on the next `check`, `wait` or `submit` after it
//!   resolves.

mod worker;

use std::collections::VecDeque;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, TryRecvError};

use crate::config::WriteMode;
use crate::error::{ChestError, Result};
use crate::storage::{self, SharedFile};

pub use worker::{Completion, WriteJob};
use worker::Worker;

/// Value writer: background thread or inline on the caller
pub struct WriteBack {
    mode: WriteMode,
    file: SharedFile,

    /// Running writer thread (Background mode, until shutdown)
    worker: Option<Worker>,

    /// Completion signals not yet observed, oldest first
    in_flight: VecDeque<Receiver<Completion>>,

    /// Bytes confirmed written
    bytes_written: u64,
}

impl WriteBack {
    /// Start the writer for `file` in the given mode
    pub fn start(mode: WriteMode, file: SharedFile) -> Result<Self> {
        let worker = match mode {
            WriteMode::Background => Some(Worker::spawn(SharedFile::clone(&file))?),
            WriteMode::Inline => None,
        };

        Ok(Self {
            mode,
            file,
            worker,
            in_flight: VecDeque::new(),
            bytes_written: 0,
        })
    }

    /// Write `framed` (prefix + payload) at `offset`.
    ///
    /// In Background mode this returns as soon as the job sits in the slot.
    /// Earlier writes that already failed are reported here.
    pub fn submit(&mut self, offset: u64, framed: Bytes) -> Result<()> {
        self.check()?;

        match (&self.worker, self.mode) {
            (Some(worker), _) => {
                let (done, signal) = channel::bounded(1);
                let job = WriteJob {
                    offset,
                    framed,
                    done,
                };
                if !worker.hand_off(job) {
                    return Err(ChestError::WriterClosed);
                }
                self.in_flight.push_back(signal);
                Ok(())
            }
            (None, WriteMode::Inline) => {
                let mut file = self.file.lock();
                let n = storage::write_all_at(&mut file, offset, &framed)?;
                self.bytes_written += n as u64;
                Ok(())
            }
            (None, WriteMode::Background) => Err(ChestError::WriterClosed),
        }
    }

    /// Block until every submitted write has resolved.
    ///
    /// All signals are drained even when one fails; the first failure is
    /// returned.
    pub fn wait(&mut self) -> Result<()> {
        let mut first_err = None;

        while let Some(signal) = self.in_flight.pop_front() {
            let outcome = match signal.recv() {
                Ok(completion) => self.observe(completion),
                Err(_) => Err(ChestError::WriterClosed),
            };
            if let Err(e) = outcome {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Observe signals that already resolved, without blocking.
    ///
    /// Returns the first failure among them. Callers check before reserving
    /// space for a new write so a stale failure cannot strand the reservation.
    pub fn check(&mut self) -> Result<()> {
        while let Some(signal) = self.in_flight.front() {
            let outcome = match signal.try_recv() {
                Ok(completion) => self.observe(completion),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => Err(ChestError::WriterClosed),
            };
            self.in_flight.pop_front();
            outcome?;
        }
        Ok(())
    }

    fn observe(&mut self, completion: Completion) -> Result<()> {
        let n = completion?;
        self.bytes_written += n as u64;
        Ok(())
    }

    /// Stop the writer thread after it has written everything handed off.
    ///
    /// Idempotent; Inline mode only drains (there is nothing to stop).
    pub fn shutdown(&mut self) -> Result<()> {
        let clean = match self.worker.take() {
            Some(worker) => worker.stop(),
            None => true,
        };
        self.wait()?;
        if !clean {
            return Err(ChestError::WriterClosed);
        }
        Ok(())
    }

    /// Writes handed off whose outcome has not been observed
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// True while a writer thread is accepting jobs
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Bytes confirmed written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for WriteBack {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Write-back shutdown failed during drop");
        }
    }
}
