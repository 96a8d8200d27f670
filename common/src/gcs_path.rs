//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Google Cloud Storage locations and object io.
//!
//! Objects are moved through local temporary files: inputs are downloaded
//! before a transform runs and outputs are uploaded once it is done. Every
//! request is authenticated with a caller supplied (downscoped) access token.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::codec::BytesCodec;
use tokio_util::codec::FramedRead;

use crate::files::is_data_name;

lazy_static::lazy_static! {
    /// Constant regex that matches a GCS bucket URL
    /// format: gs://{bucket_name}/{prefix}
    static ref GCS_URL_REGEX: Regex = Regex::new(r"^gs://([^/]+)/?(.*)$")
        .expect("Failed to build GCS_URL_REGEX");

    /// format: https://storage.cloud.google.com/{bucket_name}/{key}
    static ref GCS_PATH_REGEX: Regex = Regex::new(r"^https?://storage\.cloud\.google\.com/(.*?)/(.*)$")
        .expect("Failed to build GCS_PATH_REGEX");
}

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Error that occurs if a path could not be parsed as an GCS path.
#[derive(Debug, thiserror::Error)]
pub enum GCSPathError {
    #[error("Failed to parse {0} as an GCS Path")]
    ParseError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GCSError {
    #[error("GCS request for {object} failed with status {status}")]
    Status { object: String, status: u16 },
    #[error("GCS transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid GCS endpoint {0}")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Struct which references a bucket prefix or a specific object on GCS.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GCSPath {
    bucket: String,
    key: String,
}

impl GCSPath {
    pub fn is_gcs_url(s: &str) -> bool {
        GCS_URL_REGEX.is_match(s)
    }

    pub fn get_bucket_name(&self) -> &String {
        &self.bucket
    }

    pub fn get_key(&self) -> &String {
        &self.key
    }

    /// Path of the object `name` under this prefix
    pub fn join(&self, name: &str) -> GCSPath {
        let prefix = self.key.trim_end_matches('/');
        let key = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };
        GCSPath {
            bucket: self.bucket.clone(),
            key,
        }
    }

    /// Listing prefix for the objects under this path
    fn list_prefix(&self) -> String {
        let prefix = self.key.trim_end_matches('/');
        if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        }
    }
}

impl fmt::Display for GCSPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for GCSPath {
    type Err = GCSPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(caps) = GCS_URL_REGEX
            .captures(s)
            .or_else(|| GCS_PATH_REGEX.captures(s))
        {
            Ok(GCSPath {
                bucket: caps[1].to_string(),
                key: caps[2].to_string(),
            })
        } else {
            let message = format!("Failed to parse {} as an GCSPath", &s);
            Err(GCSPathError::ParseError(message))
        }
    }
}

/// One listed object
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectInfo {
    pub path: GCSPath,
    pub size: u64,
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<RawObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RawObject {
    name: String,
    #[serde(default)]
    size: String,
}

/// Minimal client for the GCS JSON API
#[derive(Clone)]
pub struct GCSClient {
    http: reqwest::Client,
    token: String,
    endpoint: Url,
}

impl fmt::Debug for GCSClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GCSClient {{ endpoint: {} }}", self.endpoint)
    }
}

impl GCSClient {
    pub fn new(token: &str) -> Result<GCSClient, GCSError> {
        GCSClient::with_endpoint(token, DEFAULT_GCS_ENDPOINT)
    }

    pub fn with_endpoint(token: &str, endpoint: &str) -> Result<GCSClient, GCSError> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| GCSError::InvalidEndpoint(endpoint.to_string()))?;
        Ok(GCSClient {
            http: reqwest::Client::new(),
            token: token.to_string(),
            endpoint,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, GCSError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| GCSError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn metadata_url(&self, path: &GCSPath) -> Result<Url, GCSError> {
        self.url(&["storage", "v1", "b", &path.bucket, "o", &path.key])
    }

    fn check(path: &GCSPath, resp: reqwest::Response) -> Result<reqwest::Response, GCSError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(GCSError::Status {
                object: path.to_string(),
                status: resp.status().as_u16(),
            })
        }
    }

    /// Lists the data objects under a prefix, in name order
    ///
    /// The completion marker, zero-byte objects and directory placeholders
    /// are skipped.
    pub async fn list(&self, prefix: &GCSPath) -> Result<Vec<ObjectInfo>, GCSError> {
        let url = self.url(&["storage", "v1", "b", &prefix.bucket, "o"])?;
        let list_prefix = prefix.list_prefix();

        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .http
                .get(url.clone())
                .bearer_auth(&self.token)
                .query(&[("prefix", list_prefix.as_str())]);
            if let Some(t) = &page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }

            let list: ObjectList = GCSClient::check(prefix, req.send().await?)?
                .json()
                .await?;
            for item in list.items {
                let size = item.size.parse::<u64>().unwrap_or(0);
                if size == 0 || !is_data_name(&item.name) {
                    continue;
                }
                objects.push(ObjectInfo {
                    path: GCSPath {
                        bucket: prefix.bucket.clone(),
                        key: item.name,
                    },
                    size,
                });
            }

            match list.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.path.key.cmp(&b.path.key));
        debug!("listed {} objects under {}", objects.len(), prefix);
        Ok(objects)
    }

    pub async fn exists(&self, path: &GCSPath) -> Result<bool, GCSError> {
        let resp = self
            .http
            .get(self.metadata_url(path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        GCSClient::check(path, resp)?;
        Ok(true)
    }

    /// Deletes an object, `false` when it did not exist
    pub async fn delete(&self, path: &GCSPath) -> Result<bool, GCSError> {
        let resp = self
            .http
            .delete(self.metadata_url(path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        GCSClient::check(path, resp)?;
        debug!("deleted {}", path);
        Ok(true)
    }

    /// Downloads an object into a temporary file removed on drop
    pub async fn copy_to_local(
        &self,
        path: &GCSPath,
    ) -> Result<tempfile::NamedTempFile, GCSError> {
        let mut url = self.metadata_url(path)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let mut resp = GCSClient::check(
            path,
            self.http.get(url).bearer_auth(&self.token).send().await?,
        )?;

        let mut gcs_tempfile = tempfile::NamedTempFile::new()?;
        while let Some(chunk) = resp.chunk().await? {
            gcs_tempfile.write_all(&chunk)?;
        }
        gcs_tempfile.flush()?;
        Ok(gcs_tempfile)
    }

    /// Uploads a local file as the object `path`
    pub async fn copy_from_local(
        &self,
        path: &GCSPath,
        local: impl AsRef<Path>,
    ) -> Result<(), GCSError> {
        let file = File::open(local).await?;
        let stream = FramedRead::new(file, BytesCodec::new());
        self.upload(path, reqwest::Body::wrap_stream(stream)).await
    }

    /// Uploads a small in-memory object
    pub async fn upload_bytes(&self, path: &GCSPath, data: Vec<u8>) -> Result<(), GCSError> {
        self.upload(path, reqwest::Body::from(data)).await
    }

    async fn upload(&self, path: &GCSPath, body: reqwest::Body) -> Result<(), GCSError> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &path.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &path.key);

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await?;
        GCSClient::check(path, resp)?;
        debug!("uploaded {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_str_gs_url() {
        let path = GCSPath::from_str("gs://pair-bucket/cleanroom/advertiser/twice").unwrap();
        assert_eq!(path.get_bucket_name(), "pair-bucket");
        assert_eq!(path.get_key(), "cleanroom/advertiser/twice");
        assert_eq!(path.to_string(), "gs://pair-bucket/cleanroom/advertiser/twice");
        assert!(GCSPath::is_gcs_url("gs://pair-bucket/x"));
    }

    #[test]
    fn test_from_str_gcs_path() {
        let path = "https://storage.cloud.google.com/test-bucket/pair/publisher/input.csv";
        let path = GCSPath::from_str(path).expect("Failed to read GCSPath from str");
        assert_eq!(path.get_bucket_name(), "test-bucket");
        assert_eq!(path.get_key(), "pair/publisher/input.csv");
    }

    #[test]
    fn test_gcs_path_from_str_local_path() {
        assert!(GCSPath::from_str("/tmp/local_path.txt").is_err());
        assert!(!GCSPath::is_gcs_url("/tmp/local_path.txt"));
    }

    #[test]
    fn test_join_and_prefix() {
        let p = GCSPath::from_str("gs://b/prefix/").unwrap();
        assert_eq!(p.join(".Completed").get_key(), "prefix/.Completed");
        assert_eq!(p.list_prefix(), "prefix/");

        let root = GCSPath::from_str("gs://b").unwrap();
        assert_eq!(root.join("data.csv").get_key(), "data.csv");
        assert_eq!(root.list_prefix(), "");
    }

    #[test]
    fn test_object_urls_escape_names() {
        let client = GCSClient::with_endpoint("token", "http://localhost:4443").unwrap();
        let p = GCSPath::from_str("gs://b/prefix/data.csv").unwrap();
        assert_eq!(
            client.metadata_url(&p).unwrap().as_str(),
            "http://localhost:4443/storage/v1/b/b/o/prefix%2Fdata.csv"
        );
    }
}
