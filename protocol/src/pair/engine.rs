//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::thread;

use common::files::record_writer;
use common::files::BoxedWriter;
use common::permutations;
use common::timer;
use crypto::prelude::PairCipher;
use crypto::prelude::PairPrivateKey;

use super::cancel::recv;
use super::cancel::CancelToken;
use super::reader::BatchReader;
use super::EngineConfig;
use super::FirstError;
use super::PairError;
use super::Transform;

/// Optional extras of a read-writer
#[derive(Default)]
pub struct ReadWriterOptions {
    /// Receives a copy of everything written to the primary output
    pub secondary_output: Option<BoxedWriter>,
}

/// Counters of a finished run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformSummary {
    pub read: u64,
    pub written: u64,
}

/// Streams records from an input through one PAIR transform into an output
///
/// The input is read by a background thread as soon as the read-writer is
/// created. A run consumes the read-writer.
pub struct PairReadWriter {
    reader: BatchReader,
    writer: Mutex<csv::Writer<BoxedWriter>>,
    written: AtomicU64,
    config: EngineConfig,
    token: CancelToken,
}

impl PairReadWriter {
    pub fn new<R>(
        input: R,
        output: BoxedWriter,
        options: ReadWriterOptions,
        config: EngineConfig,
        token: &CancelToken,
    ) -> Result<PairReadWriter, PairError>
    where
        R: Read + Send + 'static,
    {
        let token = token.child_with_timeout(config.timeout);
        let output: BoxedWriter = match options.secondary_output {
            Some(secondary) => Box::new(TeeWriter {
                primary: output,
                secondary,
            }),
            None => output,
        };

        Ok(PairReadWriter {
            reader: BatchReader::spawn(input, token.clone())?,
            writer: Mutex::new(record_writer(output)),
            written: AtomicU64::new(0),
            config,
            token,
        })
    }

    pub fn hash_encrypt(
        self,
        workers: usize,
        salt: &str,
        private_key: &str,
    ) -> Result<TransformSummary, PairError> {
        self.run(Transform::HashEncrypt, workers, salt, private_key)
    }

    pub fn re_encrypt(
        self,
        workers: usize,
        salt: &str,
        private_key: &str,
    ) -> Result<TransformSummary, PairError> {
        self.run(Transform::ReEncrypt, workers, salt, private_key)
    }

    pub fn decrypt(
        self,
        workers: usize,
        salt: &str,
        private_key: &str,
    ) -> Result<TransformSummary, PairError> {
        self.run(Transform::Decrypt, workers, salt, private_key)
    }

    pub fn run(
        self,
        transform: Transform,
        workers: usize,
        salt: &str,
        private_key: &str,
    ) -> Result<TransformSummary, PairError> {
        let key = match PairPrivateKey::new(salt, private_key) {
            Ok(k) => k,
            Err(e) => {
                self.token.cancel();
                return Err(e.into());
            }
        };
        self.run_with(transform, workers, &key)
    }

    /// Runs `transform` with `workers` threads pulling batches from the
    /// shared queue
    ///
    /// The first failing worker cancels the others and its error is
    /// returned; output already written is left in place. Runs that read
    /// fewer than the configured minimum of records fail with
    /// `InputBelowThreshold` after the fact.
    pub fn run_with<C: PairCipher>(
        self,
        transform: Transform,
        workers: usize,
        cipher: &C,
    ) -> Result<TransformSummary, PairError> {
        let workers = match self.config.workers(workers) {
            Ok(w) => w,
            Err(e) => {
                self.token.cancel();
                return Err(e);
            }
        };
        let t = timer::Timer::new_silent(&transform.to_string());

        let exhausted = AtomicBool::new(false);
        let errors = FirstError::default();
        let panicked = thread::scope(|s| {
            let (this, exhausted, errors) = (&self, &exhausted, &errors);
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move || {
                        if let Err(e) = this.work(transform, cipher, exhausted) {
                            errors.set(e);
                            this.token.cancel();
                        }
                    })
                })
                .collect();
            handles.into_iter().any(|h| h.join().is_err())
        });

        if panicked {
            self.token.cancel();
            return Err(PairError::Panicked("worker"));
        }
        if let Some(e) = errors.take() {
            return Err(e);
        }

        let read = self.reader.read_count();
        let written = self.written.load(Ordering::SeqCst);
        debug!(
            "{}: read {} IDs, written {} PAIR IDs in {:?}",
            transform,
            read,
            written,
            t.elapsed()
        );
        t.qps(&transform.to_string(), written as usize);

        self.config.check_threshold(read)?;
        Ok(TransformSummary { read, written })
    }

    fn work<C: PairCipher>(
        &self,
        transform: Transform,
        cipher: &C,
        exhausted: &AtomicBool,
    ) -> Result<(), PairError> {
        loop {
            let mut batch = match recv(self.reader.batches(), &self.token)? {
                Some(b) => b,
                None => {
                    // the first worker to see the end collects the reader
                    if exhausted
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        debug!("{}: reader exhausted", transform);
                        self.reader.finish()?;
                    }
                    return Ok(());
                }
            };

            if transform.shuffles() {
                permutations::shuffle(&mut batch);
            }

            let records = batch
                .iter()
                .map(|id| transform.apply(cipher, id))
                .collect::<Result<Vec<_>, _>>()?;

            let mut w = self
                .writer
                .lock()
                .map_err(|_| PairError::Poisoned("output writer"))?;
            for r in &records {
                w.write_record([r])?;
            }
            w.flush()?;
            self.written.fetch_add(records.len() as u64, Ordering::SeqCst);
        }
    }
}

/// Writes everything to two outputs
struct TeeWriter {
    primary: BoxedWriter,
    secondary: BoxedWriter,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.secondary.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}
