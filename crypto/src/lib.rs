//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![crate_name = "crypto"]

#[macro_use]
extern crate log;

/// Commutative PAIR cipher on Ristretto255
pub mod pair;

/// Private key configuration file
pub mod keys;

pub mod prelude;
