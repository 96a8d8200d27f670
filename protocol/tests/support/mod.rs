//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crypto::pair::gen_private_key;
use crypto::prelude::PairCipher;
use crypto::prelude::PairPrivateKey;

pub const SALT: &str = "c2FsdHNhbHRzYWx0c2FsdHNhbHRzYWx0c2FsdHNhbHQ=";

/// One side of the protocol with its own key
pub struct Party {
    pub private_key: String,
    pub cipher: PairPrivateKey,
}

impl Party {
    pub fn new() -> Party {
        let private_key = gen_private_key();
        let cipher = PairPrivateKey::new(SALT, &private_key).unwrap();
        Party {
            private_key,
            cipher,
        }
    }

    pub fn encrypt_all(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .map(|id| String::from_utf8(self.cipher.encrypt(id.as_bytes()).unwrap()).unwrap())
            .collect()
    }

    pub fn re_encrypt_all(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .map(|id| String::from_utf8(self.cipher.re_encrypt(id.as_bytes()).unwrap()).unwrap())
            .collect()
    }
}

pub fn emails(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("user{}@example.com", i)).collect()
}

pub fn write_lines<P: AsRef<Path>>(path: P, lines: &[String]) {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).unwrap();
}

/// Writes `lines` as a single data object and completes the directory
pub fn write_completed_dir<P: AsRef<Path>>(dir: P, lines: &[String]) {
    write_lines(dir.as_ref().join("data_00000000.csv"), lines);
    fs::write(dir.as_ref().join(".Completed"), "v1").unwrap();
}

/// Every non-empty line of every file in `dir`, the marker excluded
pub fn read_dir_lines<P: AsRef<Path>>(dir: P) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() || path.ends_with(".Completed") {
            continue;
        }
        let content = fs::read_to_string(&path).unwrap();
        lines.extend(
            content
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string()),
        );
    }
    lines
}

pub fn as_set(lines: &[String]) -> HashSet<String> {
    lines.iter().cloned().collect()
}
