//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

pub use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};

pub use crate::pair::{CipherError, PairCipher, PairPrivateKey};

/// One identifier record, exactly as it appears on a line of input
pub type TRecord = Vec<u8>;
pub type TPoint = RistrettoPoint;
pub type TScalar = Scalar;
