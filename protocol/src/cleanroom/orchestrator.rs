//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Drives the advertiser through the three PAIR steps:
//!
//! 1. hash and encrypt the advertiser identifiers into the advertiser-twice
//!    location,
//! 2. re-encrypt the publisher-twice identifiers into the publisher-triple
//!    location,
//! 3. once the publisher is done, match both triple encrypted sets locally.
//!
//! Where to start is derived from the participant states, so a failed run
//! can be started again and resumes after the last finished step.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use common::files::BoxedReader;
use common::files::file_writer;
use common::files::BoxedWriter;
use common::files::MultiReader;
use common::metrics::MatchMetrics;
use common::timer;

use super::state::Action;
use super::state::Locations;
use super::state::ParticipantState;
use super::traits::CleanroomService;
use super::traits::View;
use super::CleanroomError;
use crate::pair::cancel::CancelToken;
use crate::pair::engine::PairReadWriter;
use crate::pair::engine::ReadWriterOptions;
use crate::pair::engine::TransformSummary;
use crate::pair::matcher::MatchOutput;
use crate::pair::matcher::Matcher;
use crate::pair::EngineConfig;
use crate::pair::PairError;
use crate::pair::Transform;
use crate::storage::data_object_name;
use crate::storage::Location;
use crate::storage::Storage;
use crate::storage::StorageError;

/// Interval between two publisher state checks before matching
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the publisher before matching
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    HashEncrypt,
    ReEncrypt,
    Match,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::HashEncrypt => write!(f, "Step 1: hash-encrypt"),
            Step::ReEncrypt => write!(f, "Step 2: re-encrypt"),
            Step::Match => write!(f, "Step 3: match"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Pair(#[from] PairError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Cleanroom(#[from] CleanroomError),
    #[error("step task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        StepError::Storage(StorageError::Io(e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{step}: {source}")]
    Step { step: Step, source: StepError },
    #[error("unexpected advertiser state: {advertiser} and publisher state: {publisher}")]
    UnexpectedStates {
        publisher: ParticipantState,
        advertiser: ParticipantState,
    },
    #[error("GetCleanroom: {0}")]
    Cleanroom(#[from] CleanroomError),
    #[error("invalid cleanroom location: {0}")]
    Location(#[from] StorageError),
}

fn in_step(step: Step) -> impl FnOnce(StepError) -> OrchestratorError {
    move |source| OrchestratorError::Step { step, source }
}

/// Settings of a clean room run
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// base64 hash salt shared by both parties
    pub salt: String,
    /// base64 advertiser private key
    pub private_key: String,
    pub workers: usize,
    /// Raw advertiser identifiers: a file, a directory or stdin
    pub input: String,
    /// Directory receiving the decrypted matches; no matching without it
    pub output: Option<String>,
    /// Keeps a local copy of the re-encrypted publisher IDs, which then
    /// replaces the publisher-triple location as the match input
    pub publisher_ids_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub engine: EngineConfig,
}

impl RunConfig {
    pub fn new(salt: &str, private_key: &str) -> RunConfig {
        let engine = EngineConfig::default();
        RunConfig {
            salt: salt.to_string(),
            private_key: private_key.to_string(),
            workers: engine.max_workers,
            input: String::new(),
            output: None,
            publisher_ids_dir: None,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
            engine,
        }
    }
}

/// What a run did
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub action: Action,
    pub metrics: Option<MatchMetrics>,
}

pub struct Orchestrator<S> {
    service: S,
    storage: Storage,
    config: RunConfig,
    token: CancelToken,
}

impl<S: CleanroomService> Orchestrator<S> {
    pub fn new(service: S, storage: Storage, config: RunConfig, token: CancelToken) -> Self {
        Orchestrator {
            service,
            storage,
            config,
            token,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Runs every step the current participant states call for
    ///
    /// Any failing step aborts the run. Nothing is retried.
    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        let cleanroom = self.service.get_cleanroom(View::Full).await?;
        let (publisher, advertiser) = cleanroom.states();
        let action = Action::from_states(publisher, advertiser).ok_or(
            OrchestratorError::UnexpectedStates {
                publisher,
                advertiser,
            },
        )?;
        let locations = cleanroom.pair_config()?.locations()?;
        info!(
            "publisher is {}, advertiser is {}, starting with {:?}",
            publisher, advertiser, action
        );

        if action == Action::ContributeAdvertiserData {
            self.hash_encrypt(&locations)
                .await
                .map_err(in_step(Step::HashEncrypt))?;
        }

        if action != Action::MatchData {
            self.re_encrypt(&locations)
                .await
                .map_err(in_step(Step::ReEncrypt))?;
        }

        let metrics = match &self.config.output {
            Some(output) => Some(
                self.match_ids(&locations, output)
                    .await
                    .map_err(in_step(Step::Match))?,
            ),
            None => {
                info!("No output given, skipping the match");
                None
            }
        };

        Ok(RunReport { action, metrics })
    }

    async fn hash_encrypt(&self, locations: &Locations) -> Result<(), StepError> {
        info!("Step 1: Hash and encrypt the advertiser data.");
        let _t = timer::Timer::new("Step 1");

        let input: Location = self.config.input.parse()?;
        let readers = self.storage.open_readers(&input).await?;

        let destination = &locations.advertiser_twice;
        self.storage.clear(destination).await?;
        let object = self
            .storage
            .create_writer(destination, &data_object_name())
            .await?;
        let summary = self
            .transform(
                Transform::HashEncrypt,
                readers,
                object.writer()?,
                ReadWriterOptions::default(),
            )
            .await?;
        object.commit().await?;

        self.storage.complete(destination).await?;
        self.service.advance_state().await?;
        info!(
            "Step 1: Hash and encrypt the advertiser data completed, {} PAIR IDs written to {}.",
            summary.written, destination
        );
        Ok(())
    }

    async fn re_encrypt(&self, locations: &Locations) -> Result<(), StepError> {
        info!("Step 2: Re-encrypt the publisher's hashed and encrypted PAIR IDs.");
        let _t = timer::Timer::new("Step 2");

        let readers = self
            .storage
            .open_readers(&locations.publisher_twice)
            .await?;

        let options = match &self.config.publisher_ids_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let copy = dir.join("pair_ids_0.csv");
                ReadWriterOptions {
                    secondary_output: Some(file_writer(&copy.to_string_lossy())?),
                }
            }
            None => ReadWriterOptions::default(),
        };

        let destination = &locations.publisher_triple;
        self.storage.clear(destination).await?;
        let object = self
            .storage
            .create_writer(destination, &data_object_name())
            .await?;
        let summary = self
            .transform(Transform::ReEncrypt, readers, object.writer()?, options)
            .await?;
        object.commit().await?;

        self.storage.complete(destination).await?;
        self.service.advance_state().await?;
        info!(
            "Step 2: Re-encrypt the publisher's hashed and encrypted PAIR IDs completed, {} PAIR IDs written to {}.",
            summary.written, destination
        );
        Ok(())
    }

    async fn match_ids(
        &self,
        locations: &Locations,
        output: &str,
    ) -> Result<MatchMetrics, StepError> {
        info!("waiting for publisher to re-encrypt advertiser data");
        self.service
            .wait_ready_for_match(
                self.config.poll_interval,
                self.config.wait_timeout,
                &self.token,
            )
            .await?;

        info!("Step 3: Match the two sets of triple encrypted PAIR IDs.");
        let _t = timer::Timer::new("Step 3");

        let advertiser_triple = &locations.advertiser_triple;
        if !self.storage.has_completed(advertiser_triple).await? {
            return Err(StorageError::NotCompleted(advertiser_triple.to_string()).into());
        }
        let advertiser = self.storage.open_readers(advertiser_triple).await?;

        let publisher_source = match &self.config.publisher_ids_dir {
            Some(dir) => Location::Local(dir.clone()),
            None => locations.publisher_triple.clone(),
        };
        let publisher = self.storage.open_readers(&publisher_source).await?;
        let out = MatchOutput::from_path(output)?;

        let (salt, key) = (self.config.salt.clone(), self.config.private_key.clone());
        let (workers, engine, token) = (
            self.config.workers,
            self.config.engine.clone(),
            self.token.clone(),
        );
        let metrics = tokio::task::spawn_blocking(move || {
            Matcher::new(advertiser, publisher, out, engine, &token)?.run(workers, &salt, &key)
        })
        .await??;

        info!(
            "Step 3: Match the two sets of triple encrypted PAIR IDs completed, decrypted PAIR IDs are written to {}.",
            output
        );
        Ok(metrics)
    }

    /// Runs one engine pass on a blocking thread
    async fn transform(
        &self,
        transform: Transform,
        readers: Vec<BoxedReader>,
        output: BoxedWriter,
        options: ReadWriterOptions,
    ) -> Result<TransformSummary, StepError> {
        let (salt, key) = (self.config.salt.clone(), self.config.private_key.clone());
        let (workers, engine, token) = (
            self.config.workers,
            self.config.engine.clone(),
            self.token.clone(),
        );

        let summary = tokio::task::spawn_blocking(move || {
            PairReadWriter::new(MultiReader::new(readers), output, options, engine, &token)?
                .run(transform, workers, &salt, &key)
        })
        .await??;
        Ok(summary)
    }
}
