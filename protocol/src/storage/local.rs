//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use common::files::file_readers;
use common::files::is_data_name;
use common::files::BoxedReader;

use super::StorageError;
use super::COMPLETED_FILE;
use super::COMPLETED_MARKER_VERSION;

/// A single file, or every data file of a directory in name order
pub(super) fn open_readers(path: &Path) -> Result<Vec<BoxedReader>, StorageError> {
    Ok(file_readers(&path.to_string_lossy())?)
}

/// Whether `path` is written as one file rather than as a directory of
/// objects: an existing file, or a missing path with an extension
pub(super) fn is_file_target(path: &Path) -> bool {
    if path.is_dir() {
        return false;
    }
    path.is_file() || path.extension().is_some()
}

pub(super) fn create(path: &Path, name: &str) -> Result<(File, PathBuf), StorageError> {
    if is_file_target(path) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        return Ok((File::create(path)?, path.to_path_buf()));
    }

    fs::create_dir_all(path)?;
    let path = path.join(name);
    Ok((File::create(&path)?, path))
}

/// Removes the marker, then every data file of a directory location
pub(super) fn clear(dir: &Path) -> Result<(), StorageError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let marker = dir.join(COMPLETED_FILE);
    if marker.is_file() {
        fs::remove_file(&marker)?;
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_data_name(&entry.file_name().to_string_lossy()) {
            debug!("removing stale {}", entry.path().display());
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

pub(super) fn complete(path: &Path) -> Result<(), StorageError> {
    if is_file_target(path) {
        debug!("{} is a single file, no completion marker", path.display());
        return Ok(());
    }
    fs::create_dir_all(path)?;
    fs::write(path.join(COMPLETED_FILE), COMPLETED_MARKER_VERSION)?;
    info!("marked {} as completed", path.display());
    Ok(())
}
