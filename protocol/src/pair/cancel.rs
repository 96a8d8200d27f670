//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crossbeam::channel::Receiver;
use crossbeam::channel::RecvTimeoutError;
use crossbeam::channel::SendTimeoutError;
use crossbeam::channel::Sender;

use super::PairError;

/// How long a blocked channel operation waits before it looks at the token
/// again
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cooperative cancellation with an optional deadline
///
/// Tokens form a tree: cancelling a token, or letting its deadline pass,
/// stops it and every child derived from it, never its parent.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use protocol::pair::cancel::CancelToken;
///
/// let root = CancelToken::new();
/// let run = root.child_with_timeout(Duration::from_secs(60));
/// assert!(run.check().is_ok());
///
/// root.cancel();
/// assert!(run.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancelToken>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn child(&self) -> CancelToken {
        self.derive(None)
    }

    pub fn child_with_timeout(&self, timeout: Duration) -> CancelToken {
        self.derive(Instant::now().checked_add(timeout))
    }

    fn derive(&self, deadline: Option<Instant>) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// `Timeout` once any deadline on the chain passed, `Cancelled` once any
    /// token on the chain was cancelled
    pub fn check(&self) -> Result<(), PairError> {
        let now = Instant::now();
        let mut cancelled = false;
        let mut token = Some(self);
        while let Some(t) = token {
            if matches!(t.inner.deadline, Some(d) if now >= d) {
                return Err(PairError::Timeout);
            }
            cancelled |= t.inner.cancelled.load(Ordering::SeqCst);
            token = t.inner.parent.as_ref();
        }
        if cancelled {
            Err(PairError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Time left before the nearest deadline on the chain
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut nearest: Option<Duration> = None;
        let mut token = Some(self);
        while let Some(t) = token {
            if let Some(d) = t.inner.deadline {
                let left = d.saturating_duration_since(now);
                nearest = Some(nearest.map_or(left, |n| n.min(left)));
            }
            token = t.inner.parent.as_ref();
        }
        nearest
    }
}

/// Sends on a bounded channel, giving up when the token stops or every
/// receiver is gone
pub fn send<T>(tx: &Sender<T>, mut msg: T, token: &CancelToken) -> Result<(), PairError> {
    loop {
        token.check()?;
        match tx.send_timeout(msg, POLL_INTERVAL) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(m)) => msg = m,
            Err(SendTimeoutError::Disconnected(_)) => return Err(PairError::Cancelled),
        }
    }
}

/// Receives from a channel, `None` once it is closed and drained
pub fn recv<T>(rx: &Receiver<T>, token: &CancelToken) -> Result<Option<T>, PairError> {
    loop {
        token.check()?;
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(m) => return Ok(Some(m)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        }
    }
}
