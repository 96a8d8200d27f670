//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::thread;

use common::files::is_dir;
use common::files::is_stdio;
use common::files::record_reader;
use common::files::record_writer;
use common::files::BoxedWriter;
use common::files::MultiReader;
use common::metrics::MatchMetrics;
use common::timer;
use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;
use crypto::prelude::PairCipher;
use crypto::prelude::PairPrivateKey;
use crypto::prelude::TRecord;
use rayon::prelude::*;

use super::cancel::recv;
use super::cancel::send;
use super::cancel::CancelToken;
use super::reader::BatchReader;
use super::EngineConfig;
use super::FirstError;
use super::PairError;
use super::BATCH_SIZE;

/// Where decrypted matches go
pub enum MatchOutput {
    /// Every worker writes to the same stream
    Stream(BoxedWriter),
    /// Worker `i` writes `result_<i>.csv` in this directory
    Dir(PathBuf),
}

impl MatchOutput {
    /// Stdout for an empty path or `-`, otherwise a directory created on
    /// demand
    pub fn from_path(path: &str) -> Result<MatchOutput, PairError> {
        if is_stdio(path) {
            return Ok(MatchOutput::Stream(Box::new(std::io::stdout())));
        }
        let dir = PathBuf::from(path);
        if dir.exists() && !is_dir(&dir)? {
            return Err(PairError::InvalidOutput(format!(
                "{} is not a directory",
                path
            )));
        }
        fs::create_dir_all(&dir)?;
        Ok(MatchOutput::Dir(dir))
    }
}

enum Shard<'a> {
    Own(csv::Writer<File>),
    Shared(&'a Mutex<csv::Writer<BoxedWriter>>),
}

impl Shard<'_> {
    fn write(&mut self, record: &[u8]) -> Result<(), PairError> {
        match self {
            Shard::Own(w) => w.write_record([record])?,
            Shard::Shared(m) => m
                .lock()
                .map_err(|_| PairError::Poisoned("match output"))?
                .write_record([record])?,
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PairError> {
        match self {
            Shard::Own(w) => w.flush()?,
            Shard::Shared(m) => m
                .lock()
                .map_err(|_| PairError::Poisoned("match output"))?
                .flush()?,
        }
        Ok(())
    }
}

/// Consume-once intersection of advertiser and publisher PAIR IDs
///
/// The advertiser side is held in memory, the publisher side is streamed.
/// A publisher record present in the advertiser set is removed from it and
/// handed to the decrypting workers, so a match is emitted at most once.
pub struct Matcher {
    advertiser: HashSet<TRecord>,
    advertiser_read: u64,
    publisher: BatchReader,
    output: MatchOutput,
    config: EngineConfig,
    token: CancelToken,
}

impl Matcher {
    /// Reads every advertiser stream in parallel, then starts streaming the
    /// publisher side
    pub fn new<A, P>(
        advertiser: Vec<A>,
        publisher: Vec<P>,
        output: MatchOutput,
        config: EngineConfig,
        token: &CancelToken,
    ) -> Result<Matcher, PairError>
    where
        A: Read + Send,
        P: Read + Send + 'static,
    {
        let token = token.child_with_timeout(config.timeout);
        let t = timer::Timer::new_silent("read advertiser PAIR IDs");

        let sets = advertiser
            .into_par_iter()
            .map(|r| ingest(r, &token))
            .collect::<Result<Vec<_>, PairError>>()?;

        let advertiser_read: u64 = sets.iter().map(|(_, n)| n).sum();
        let mut sets: Vec<HashSet<TRecord>> = sets.into_iter().map(|(s, _)| s).collect();
        // grow the largest set
        sets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        let mut sets = sets.into_iter();
        let mut merged = sets.next().unwrap_or_default();
        for s in sets {
            merged.extend(s);
        }
        t.qps("advertiser", advertiser_read as usize);

        Ok(Matcher {
            advertiser: merged,
            advertiser_read,
            publisher: BatchReader::spawn(MultiReader::new(publisher), token.clone())?,
            output,
            config,
            token,
        })
    }

    pub fn run(
        self,
        workers: usize,
        salt: &str,
        private_key: &str,
    ) -> Result<MatchMetrics, PairError> {
        let key = match PairPrivateKey::new(salt, private_key) {
            Ok(k) => k,
            Err(e) => {
                self.token.cancel();
                return Err(e.into());
            }
        };
        self.run_with(workers, &key)
    }

    /// One producer looks publisher records up and forwards hits, `workers`
    /// consumers decrypt them into their output shard
    pub fn run_with<C: PairCipher>(
        self,
        workers: usize,
        cipher: &C,
    ) -> Result<MatchMetrics, PairError> {
        let Matcher {
            advertiser,
            advertiser_read,
            publisher,
            output,
            config,
            token,
        } = self;

        let workers = match config.workers(workers) {
            Ok(w) => w,
            Err(e) => {
                token.cancel();
                return Err(e);
            }
        };
        let t = timer::Timer::new_silent("match");
        let advertiser_distinct = advertiser.len() as u64;

        let (shared, mut shards) = match output {
            MatchOutput::Stream(w) => (Some(Mutex::new(record_writer(w))), Vec::new()),
            MatchOutput::Dir(dir) => {
                let mut shards = Vec::with_capacity(workers);
                for i in 0..workers {
                    let f = File::create(dir.join(format!("result_{}.csv", i)));
                    match f {
                        Ok(f) => shards.push(record_writer(f)),
                        Err(e) => {
                            token.cancel();
                            return Err(e.into());
                        }
                    }
                }
                (None, shards)
            }
        };

        let written = AtomicU64::new(0);
        let errors = FirstError::default();
        let (tx, rx) = bounded::<TRecord>(BATCH_SIZE);

        let panicked = thread::scope(|s| {
            let (publisher, token, errors, written, shared) =
                (&publisher, &token, &errors, &written, shared.as_ref());

            let mut handles = Vec::with_capacity(workers + 1);
            handles.push(s.spawn(move || {
                if let Err(e) = produce(advertiser, publisher, tx, token) {
                    errors.set(e);
                    token.cancel();
                }
            }));

            for _ in 0..workers {
                let mut shard = match shared {
                    Some(m) => Shard::Shared(m),
                    None => match shards.pop() {
                        Some(w) => Shard::Own(w),
                        None => break,
                    },
                };
                let rx = rx.clone();
                handles.push(s.spawn(move || {
                    if let Err(e) = consume(&rx, &mut shard, cipher, written, token) {
                        errors.set(e);
                        token.cancel();
                    }
                }));
            }
            drop(rx);

            handles.into_iter().any(|h| h.join().is_err())
        });

        if panicked {
            token.cancel();
            return Err(PairError::Panicked("match worker"));
        }
        if let Some(e) = errors.take() {
            return Err(e);
        }
        publisher.finish()?;

        let publisher_read = publisher.read_count();
        let written = written.load(Ordering::SeqCst);
        let metrics = MatchMetrics::new(advertiser_read, publisher_read, written);
        debug!(
            "Match: read {} IDs, written {} PAIR IDs in {:?}",
            publisher_read,
            written,
            t.elapsed()
        );
        info!(
            "Matched {} of {} advertiser PAIR IDs against {} publisher PAIR IDs, match rate {:.2}%",
            written, advertiser_read, publisher_read, metrics.match_rate
        );

        config.check_threshold(advertiser_distinct)?;
        Ok(metrics)
    }
}

fn ingest<R: Read>(reader: R, token: &CancelToken) -> Result<(HashSet<TRecord>, u64), PairError> {
    let mut reader = record_reader(reader);
    let mut record = csv::ByteRecord::new();
    let mut set = HashSet::new();
    let mut line = 0u64;

    while reader.read_byte_record(&mut record)? {
        line += 1;
        if line % BATCH_SIZE as u64 == 0 {
            token.check()?;
        }
        if record.len() != 1 {
            return Err(PairError::Parse {
                line,
                found: record.len(),
            });
        }
        set.insert(trim(&record[0]).to_vec());
    }
    Ok((set, line))
}

fn produce(
    mut advertiser: HashSet<TRecord>,
    publisher: &BatchReader,
    tx: Sender<TRecord>,
    token: &CancelToken,
) -> Result<(), PairError> {
    while let Some(batch) = recv(publisher.batches(), token)? {
        for id in batch {
            let key = trim(&id);
            if advertiser.remove(key) {
                send(&tx, key.to_vec(), token)?;
            }
        }
    }
    Ok(())
}

fn consume<C: PairCipher>(
    rx: &Receiver<TRecord>,
    shard: &mut Shard<'_>,
    cipher: &C,
    written: &AtomicU64,
    token: &CancelToken,
) -> Result<(), PairError> {
    while let Some(matched) = recv(rx, token)? {
        let decrypted = cipher.decrypt(&matched)?;
        shard.write(&decrypted)?;
        written.fetch_add(1, Ordering::SeqCst);
    }
    shard.flush()
}

fn trim(id: &[u8]) -> &[u8] {
    let start = id
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(id.len());
    let end = id
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &id[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(trim(b"  abc \r"), b"abc");
        assert_eq!(trim(b"abc"), b"abc");
        assert_eq!(trim(b"   "), b"");
        assert_eq!(trim(b""), b"");
    }

    #[test]
    fn output_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("taken");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            MatchOutput::from_path(file.to_str().unwrap()),
            Err(PairError::InvalidOutput(_))
        ));

        let fresh = dir.path().join("a/b");
        assert!(matches!(
            MatchOutput::from_path(fresh.to_str().unwrap()),
            Ok(MatchOutput::Dir(_))
        ));
        assert!(fresh.is_dir());
    }
}
