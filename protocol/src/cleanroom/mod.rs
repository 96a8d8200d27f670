//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Advertiser side of a PAIR clean room: the participant state model, the
//! coordination service interface and the step orchestrator.

pub mod orchestrator;
pub mod state;
pub mod traits;

/// Errors of the coordination service
#[derive(Debug, thiserror::Error)]
pub enum CleanroomError {
    #[error("unexpected status code: {0}")]
    Status(u16),
    #[error("cleanroom request failed: {0}")]
    Transport(String),
    #[error("malformed cleanroom response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cleanroom has no PAIR configuration")]
    MissingConfig,
    #[error("storage token not found")]
    MissingToken,
    #[error("timed out after {0:?} waiting for the publisher")]
    WaitTimeout(std::time::Duration),
    #[error("cancelled while waiting for the publisher")]
    Cancelled,
}
