//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![crate_name = "protocol"]

#[macro_use]
extern crate log;

pub mod cleanroom;
pub mod pair;
pub mod storage;
