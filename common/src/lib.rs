//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

/// Simple timer
pub mod timer;

/// Line oriented file and stream io
pub mod files;

/// Shuffle utils
pub mod permutations;

/// GCS path parsing and object io
pub mod gcs_path;

/// Match metrics
pub mod metrics;
