//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::io::Seek;
use std::io::SeekFrom;

use common::files::BoxedReader;
use common::gcs_path::GCSClient;
use common::gcs_path::GCSPath;

use super::StorageError;
use super::COMPLETED_FILE;

/// Downloads every data object under `prefix` and opens it
///
/// Downloads are unlinked temporary files, gone once their reader is
/// dropped.
pub(super) async fn open_readers(
    client: &GCSClient,
    prefix: &GCSPath,
) -> Result<Vec<BoxedReader>, StorageError> {
    let objects = client.list(prefix).await?;

    let mut readers: Vec<BoxedReader> = Vec::with_capacity(objects.len());
    for object in objects {
        debug!("downloading {} ({} bytes)", object.path, object.size);
        let staged = client.copy_to_local(&object.path).await?;
        let mut file = staged.into_file();
        file.seek(SeekFrom::Start(0))?;
        readers.push(Box::new(file));
    }
    Ok(readers)
}

/// Deletes the completion marker, then every data object under `prefix`
pub(super) async fn clear(client: &GCSClient, prefix: &GCSPath) -> Result<(), StorageError> {
    client.delete(&prefix.join(COMPLETED_FILE)).await?;
    for object in client.list(prefix).await? {
        debug!("removing stale {}", object.path);
        client.delete(&object.path).await?;
    }
    Ok(())
}
