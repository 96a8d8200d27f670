//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Batched streaming transforms over PAIR identifier records.
//!
//! Every stage reads newline delimited, single column records, applies one
//! of the PAIR operations with a pool of worker threads and writes the
//! results in the same format. Records are moved from a reader thread to
//! the workers in batches of [`BATCH_SIZE`].

use std::fmt;
use std::time::Duration;

use crypto::prelude::CipherError;
use crypto::prelude::PairCipher;
use crypto::prelude::TRecord;

pub mod cancel;
pub mod engine;
pub mod matcher;
pub mod reader;

/// Number of records moved between threads at once, also the capacity in
/// batches of the reader queue
pub const BATCH_SIZE: usize = 1024;

/// Inputs with fewer records are rejected once a run completes
///
/// Transforms count the records they read. A match counts the distinct
/// advertiser PAIR IDs, since repeated lines add nothing to the set.
pub const MIN_ID_COUNT: u64 = 1000;

/// Wall clock bound of a single transform or match
pub const MAX_OPERATION_RUN_TIME: Duration = Duration::from_secs(4 * 60 * 60);

pub type Batch = Vec<TRecord>;

#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error("record {line}: expected exactly one column, found {found}")]
    Parse { line: u64, found: usize },
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("input has {read} records, the minimum is {minimum}")]
    InputBelowThreshold { read: u64, minimum: u64 },
    #[error("operation timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("number of workers must be at least 1")]
    InvalidWorkers,
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

/// The per-record operation applied by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    HashEncrypt,
    ReEncrypt,
    Decrypt,
}

impl Transform {
    pub fn apply<C: PairCipher + ?Sized>(
        &self,
        cipher: &C,
        record: &[u8],
    ) -> Result<TRecord, CipherError> {
        match self {
            Transform::HashEncrypt => cipher.encrypt(record),
            Transform::ReEncrypt => cipher.re_encrypt(record),
            Transform::Decrypt => cipher.decrypt(record),
        }
    }

    /// Re-encrypted batches are shuffled before they are written so that
    /// output order reveals nothing about input order
    pub fn shuffles(&self) -> bool {
        matches!(self, Transform::ReEncrypt)
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transform::HashEncrypt => "HashEncrypt",
            Transform::ReEncrypt => "ReEncrypt",
            Transform::Decrypt => "Decrypt",
        };
        write!(f, "{}", name)
    }
}

/// Worker pool and policy limits of a run
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_workers: usize,
    pub min_id_count: u64,
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            min_id_count: MIN_ID_COUNT,
            timeout: MAX_OPERATION_RUN_TIME,
        }
    }
}

impl EngineConfig {
    /// Validates a requested worker count, capping it at `max_workers`
    pub fn workers(&self, requested: usize) -> Result<usize, PairError> {
        if requested == 0 {
            return Err(PairError::InvalidWorkers);
        }
        let max = self.max_workers.max(1);
        if requested > max {
            warn!("Number of workers is limited to {}", max);
            return Ok(max);
        }
        Ok(requested)
    }

    pub(crate) fn check_threshold(&self, read: u64) -> Result<(), PairError> {
        if read < self.min_id_count {
            return Err(PairError::InputBelowThreshold {
                read,
                minimum: self.min_id_count,
            });
        }
        Ok(())
    }
}

/// Keeps the first error reported by any worker of a run
#[derive(Default)]
pub(crate) struct FirstError {
    slot: std::sync::Mutex<Option<PairError>>,
}

impl FirstError {
    pub fn set(&self, e: PairError) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.is_none() {
                *slot = Some(e);
            }
        }
    }

    pub fn take(self) -> Option<PairError> {
        match self.slot.into_inner() {
            Ok(e) => e,
            Err(_) => Some(PairError::Poisoned("error slot")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_validated() {
        let config = EngineConfig {
            max_workers: 4,
            ..EngineConfig::default()
        };
        assert!(matches!(config.workers(0), Err(PairError::InvalidWorkers)));
        assert_eq!(config.workers(1).unwrap(), 1);
        assert_eq!(config.workers(4).unwrap(), 4);
        assert_eq!(config.workers(64).unwrap(), 4);
    }

    #[test]
    fn threshold_is_inclusive() {
        let config = EngineConfig::default();
        assert!(matches!(
            config.check_threshold(999),
            Err(PairError::InputBelowThreshold {
                read: 999,
                minimum: 1000
            })
        ));
        assert!(config.check_threshold(1000).is_ok());
    }

    #[test]
    fn first_error_wins() {
        let errors = FirstError::default();
        errors.set(PairError::Timeout);
        errors.set(PairError::Cancelled);
        assert!(matches!(errors.take(), Some(PairError::Timeout)));
    }

    #[test]
    fn only_reencrypt_shuffles() {
        assert!(Transform::ReEncrypt.shuffles());
        assert!(!Transform::HashEncrypt.shuffles());
        assert!(!Transform::Decrypt.shuffles());
        assert_eq!(Transform::HashEncrypt.to_string(), "HashEncrypt");
    }
}
