//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Readers and writers over the places PAIR IDs live: local files and
//! directories, stdio and GCS bucket prefixes.
//!
//! A location is finished once its completion marker exists. The marker is
//! always written after every data object of the location was committed.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use common::files::BoxedReader;
use common::files::BoxedWriter;
use common::gcs_path::GCSClient;
use common::gcs_path::GCSError;
use common::gcs_path::GCSPath;
use common::gcs_path::GCSPathError;

mod gcs;
mod local;

pub use common::files::COMPLETED_FILE;

/// Content of the completion marker
pub const COMPLETED_MARKER_VERSION: &str = "v1";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Gcs(#[from] GCSError),
    #[error(transparent)]
    Path(#[from] GCSPathError),
    #[error("a storage token is required to access {0}")]
    TokenRequired(String),
    #[error("{0} has no completion marker")]
    NotCompleted(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// A file, or a directory holding one object per file
    Local(PathBuf),
    /// stdin or stdout
    Stdio,
    /// `gs://bucket/prefix`
    Gcs(GCSPath),
}

impl FromStr for Location {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if common::files::is_stdio(s) {
            Ok(Location::Stdio)
        } else if s.starts_with("gs://") {
            Ok(Location::Gcs(GCSPath::from_str(s)?))
        } else {
            Ok(Location::Local(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::Stdio => write!(f, "-"),
            Location::Gcs(p) => write!(f, "{}", p),
        }
    }
}

/// Name of a new data object, `data_<8 hex digits>.csv`
pub fn data_object_name() -> String {
    format!("data_{:08x}.csv", rand::random::<u32>())
}

/// An object being written
///
/// Output goes to a local file first. Committing makes it visible at its
/// destination, which for a bucket means uploading it.
pub struct ObjectWriter {
    file: File,
    target: WriteTarget,
}

enum WriteTarget {
    Local(PathBuf),
    Stdio,
    Gcs {
        client: GCSClient,
        path: GCSPath,
        staged: tempfile::NamedTempFile,
    },
}

impl ObjectWriter {
    /// A writer handle to pass to a transform
    pub fn writer(&self) -> Result<BoxedWriter, StorageError> {
        match self.target {
            WriteTarget::Stdio => Ok(Box::new(io::stdout())),
            _ => Ok(Box::new(self.file.try_clone()?)),
        }
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        match self.target {
            WriteTarget::Stdio => Ok(()),
            WriteTarget::Local(path) => {
                self.file.sync_all()?;
                debug!("committed {}", path.display());
                Ok(())
            }
            WriteTarget::Gcs {
                client,
                path,
                staged,
            } => {
                self.file.sync_all()?;
                client.copy_from_local(&path, staged.path()).await?;
                Ok(())
            }
        }
    }
}

/// Entry point to every location kind
///
/// Bucket locations need the scoped access token of the clean room; local
/// ones work without it.
#[derive(Clone, Debug, Default)]
pub struct Storage {
    gcs: Option<GCSClient>,
}

impl Storage {
    pub fn local() -> Storage {
        Storage { gcs: None }
    }

    pub fn with_gcs_token(token: &str) -> Result<Storage, StorageError> {
        Ok(Storage {
            gcs: Some(GCSClient::new(token)?),
        })
    }

    fn gcs(&self, location: &Location) -> Result<&GCSClient, StorageError> {
        self.gcs
            .as_ref()
            .ok_or_else(|| StorageError::TokenRequired(location.to_string()))
    }

    /// Opens every data object of a location, in name order
    pub async fn open_readers(&self, location: &Location) -> Result<Vec<BoxedReader>, StorageError> {
        match location {
            Location::Stdio => Ok(vec![Box::new(io::stdin())]),
            Location::Local(path) => local::open_readers(path),
            Location::Gcs(path) => gcs::open_readers(self.gcs(location)?, path).await,
        }
    }

    /// Starts writing the object `name` under a location
    ///
    /// A local location naming a file (an existing one, or a missing path
    /// with an extension) is written in place and `name` is ignored. Any
    /// other local location is a directory, created when missing.
    pub async fn create_writer(
        &self,
        location: &Location,
        name: &str,
    ) -> Result<ObjectWriter, StorageError> {
        match location {
            Location::Stdio => Ok(ObjectWriter {
                file: tempfile::tempfile()?,
                target: WriteTarget::Stdio,
            }),
            Location::Local(dir) => {
                let (file, path) = local::create(dir, name)?;
                Ok(ObjectWriter {
                    file,
                    target: WriteTarget::Local(path),
                })
            }
            Location::Gcs(prefix) => {
                let client = self.gcs(location)?.clone();
                let staged = tempfile::NamedTempFile::new()?;
                Ok(ObjectWriter {
                    file: staged.reopen()?,
                    target: WriteTarget::Gcs {
                        client,
                        path: prefix.join(name),
                        staged,
                    },
                })
            }
        }
    }

    /// Drops the completion marker and every data object of a location
    ///
    /// Run before rewriting a location so that output of an earlier, failed
    /// attempt never ends up under a new marker. Single files and stdio are
    /// left alone; they are truncated when written.
    pub async fn clear(&self, location: &Location) -> Result<(), StorageError> {
        match location {
            Location::Stdio => Ok(()),
            Location::Local(path) => local::clear(path),
            Location::Gcs(prefix) => gcs::clear(self.gcs(location)?, prefix).await,
        }
    }

    /// Writes the completion marker of a location
    ///
    /// A single local file gets no marker.
    pub async fn complete(&self, location: &Location) -> Result<(), StorageError> {
        match location {
            Location::Stdio => Ok(()),
            Location::Local(dir) => local::complete(dir),
            Location::Gcs(prefix) => {
                self.gcs(location)?
                    .upload_bytes(
                        &prefix.join(COMPLETED_FILE),
                        COMPLETED_MARKER_VERSION.as_bytes().to_vec(),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    pub async fn has_completed(&self, location: &Location) -> Result<bool, StorageError> {
        match location {
            Location::Stdio => Ok(false),
            Location::Local(dir) => Ok(dir.join(COMPLETED_FILE).is_file()),
            Location::Gcs(prefix) => Ok(self
                .gcs(location)?
                .exists(&prefix.join(COMPLETED_FILE))
                .await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::io::Write;

    #[test]
    fn parse_locations() {
        assert_eq!(Location::from_str("").unwrap(), Location::Stdio);
        assert_eq!(Location::from_str("-").unwrap(), Location::Stdio);
        assert_eq!(
            Location::from_str("/data/in").unwrap(),
            Location::Local(PathBuf::from("/data/in"))
        );
        match Location::from_str("gs://bucket/adv/twice").unwrap() {
            Location::Gcs(p) => {
                assert_eq!(p.get_bucket_name(), "bucket");
                assert_eq!(p.get_key(), "adv/twice");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn data_object_names() {
        let name = data_object_name();
        assert!(name.starts_with("data_") && name.ends_with(".csv"));
        assert_eq!(name.len(), "data_00000000.csv".len());
    }

    #[tokio::test]
    async fn gcs_requires_token() {
        let storage = Storage::local();
        let location = Location::from_str("gs://bucket/prefix").unwrap();
        assert!(matches!(
            storage.open_readers(&location).await,
            Err(StorageError::TokenRequired(_))
        ));
        assert!(matches!(
            storage.complete(&location).await,
            Err(StorageError::TokenRequired(_))
        ));
    }

    #[tokio::test]
    async fn local_write_complete_read() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::Local(dir.path().join("twice"));
        let storage = Storage::local();

        assert!(!storage.has_completed(&location).await.unwrap());

        let object = storage.create_writer(&location, "data_1.csv").await.unwrap();
        let mut w = object.writer().unwrap();
        w.write_all(b"a\nb\n").unwrap();
        w.flush().unwrap();
        drop(w);
        object.commit().await.unwrap();
        storage.complete(&location).await.unwrap();

        assert!(storage.has_completed(&location).await.unwrap());
        let mut readers = storage.open_readers(&location).await.unwrap();
        assert_eq!(readers.len(), 1);
        let mut content = String::new();
        readers[0].read_to_string(&mut content).unwrap();
        assert_eq!(content, "a\nb\n");
    }

    #[tokio::test]
    async fn local_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::local();

        // an existing file is overwritten in place
        let existing = dir.path().join("out.csv");
        std::fs::write(&existing, "stale\n").unwrap();
        let location = Location::Local(existing.clone());
        let object = storage.create_writer(&location, "data_1.csv").await.unwrap();
        let mut w = object.writer().unwrap();
        w.write_all(b"x\n").unwrap();
        drop(w);
        object.commit().await.unwrap();
        storage.complete(&location).await.unwrap();
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "x\n");
        assert!(!dir.path().join(COMPLETED_FILE).exists());

        // a missing path with an extension names a file, its parent is created
        let fresh = dir.path().join("nested/result.csv");
        let location = Location::Local(fresh.clone());
        let object = storage.create_writer(&location, "data_2.csv").await.unwrap();
        object.writer().unwrap().write_all(b"y\n").unwrap();
        object.commit().await.unwrap();
        assert!(fresh.is_file());
        assert_eq!(std::fs::read_to_string(&fresh).unwrap(), "y\n");
    }

    #[tokio::test]
    async fn clear_drops_marker_and_objects() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("triple");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("data_a.csv"), "a\n").unwrap();
        std::fs::write(root.join("data_b.csv"), "b\n").unwrap();
        std::fs::write(root.join(COMPLETED_FILE), COMPLETED_MARKER_VERSION).unwrap();
        let location = Location::Local(root.clone());
        let storage = Storage::local();

        assert!(storage.has_completed(&location).await.unwrap());
        storage.clear(&location).await.unwrap();
        assert!(!storage.has_completed(&location).await.unwrap());
        assert!(storage.open_readers(&location).await.unwrap().is_empty());
        assert!(root.join("nested").is_dir());

        // missing locations are fine
        storage
            .clear(&Location::Local(dir.path().join("missing")))
            .await
            .unwrap();
    }
}
