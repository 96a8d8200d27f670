//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::io::Read;
use std::mem;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use common::files::record_reader;
use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;

use super::cancel::send;
use super::cancel::CancelToken;
use super::Batch;
use super::PairError;
use super::BATCH_SIZE;

/// Background producer turning a record stream into batches
///
/// The reader thread owns the input. It closes the queue when it stops,
/// whether on a clean end of input, a parse error or cancellation; the
/// terminal condition is returned by [`BatchReader::finish`].
pub struct BatchReader {
    batches: Receiver<Batch>,
    read: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<Result<(), PairError>>>>,
}

impl BatchReader {
    pub fn spawn<R>(reader: R, token: CancelToken) -> Result<BatchReader, PairError>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded(BATCH_SIZE);
        let read = Arc::new(AtomicU64::new(0));

        let counter = read.clone();
        let handle = thread::Builder::new()
            .name("pair-reader".to_string())
            .spawn(move || read_batches(reader, tx, &counter, &token))?;

        Ok(BatchReader {
            batches: rx,
            read,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn batches(&self) -> &Receiver<Batch> {
        &self.batches
    }

    /// Records handed over so far, counted per emitted batch
    pub fn read_count(&self) -> u64 {
        self.read.load(Ordering::SeqCst)
    }

    /// Waits for the reader thread and returns how it stopped
    ///
    /// Only the first call joins the thread, later calls return `Ok`.
    pub fn finish(&self) -> Result<(), PairError> {
        let handle = self
            .handle
            .lock()
            .map_err(|_| PairError::Poisoned("reader handle"))?
            .take();
        match handle {
            Some(h) => h.join().map_err(|_| PairError::Panicked("reader"))?,
            None => Ok(()),
        }
    }
}

fn read_batches<R: Read>(
    reader: R,
    tx: Sender<Batch>,
    read: &AtomicU64,
    token: &CancelToken,
) -> Result<(), PairError> {
    let mut reader = record_reader(reader);
    let mut record = csv::ByteRecord::new();
    let mut batch: Batch = Vec::with_capacity(BATCH_SIZE);
    let mut line = 0;

    while reader.read_byte_record(&mut record)? {
        line += 1;
        if record.len() != 1 {
            return Err(PairError::Parse {
                line,
                found: record.len(),
            });
        }
        batch.push(record[0].to_vec());

        if batch.len() == BATCH_SIZE {
            let full = mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
            send(&tx, full, token)?;
            read.fetch_add(BATCH_SIZE as u64, Ordering::SeqCst);
        }
    }

    if !batch.is_empty() {
        let n = batch.len() as u64;
        send(&tx, batch, token)?;
        read.fetch_add(n, Ordering::SeqCst);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(r: &BatchReader) -> Vec<Batch> {
        r.batches().iter().collect()
    }

    #[test]
    fn batches_and_final_partial_batch() {
        let input: String = (0..2500).map(|i| format!("id{}\n", i)).collect();
        let r = BatchReader::spawn(std::io::Cursor::new(input), CancelToken::new()).unwrap();

        let batches = drain(&r);
        r.finish().unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(r.read_count(), 2500);
        assert_eq!(batches[0][0], b"id0".to_vec());
    }

    #[test]
    fn quoted_records_are_unquoted() {
        let input = "\"a,b\"\nc\n";
        let r = BatchReader::spawn(std::io::Cursor::new(input), CancelToken::new()).unwrap();
        let batches = drain(&r);
        r.finish().unwrap();
        assert_eq!(batches, vec![vec![b"a,b".to_vec(), b"c".to_vec()]]);
    }

    #[test]
    fn extra_column_is_a_parse_error() {
        let input = "a\nb\nc,d\n";
        let r = BatchReader::spawn(std::io::Cursor::new(input), CancelToken::new()).unwrap();
        assert!(drain(&r).is_empty());
        assert!(matches!(
            r.finish(),
            Err(PairError::Parse { line: 3, found: 2 })
        ));
        assert_eq!(r.read_count(), 0);
    }

    #[test]
    fn cancelled_reader_stops() {
        let input: String = (0..(BATCH_SIZE * (BATCH_SIZE + 4)))
            .map(|i| format!("{}\n", i))
            .collect();
        let token = CancelToken::new();
        let r = BatchReader::spawn(std::io::Cursor::new(input), token.clone()).unwrap();

        // nobody consumes, so the queue fills up and the reader blocks
        std::thread::sleep(std::time::Duration::from_millis(50));
        token.cancel();
        assert!(matches!(r.finish(), Err(PairError::Cancelled)));
    }
}
