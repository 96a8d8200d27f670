//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use clap::ArgMatches;
use common::files::MultiReader;
use common::metrics::MatchMetrics;
use crypto::keys::read_private_key;
use crypto::keys::KeyConfig;
use crypto::prelude::PairPrivateKey;
use protocol::cleanroom::orchestrator::Orchestrator;
use protocol::cleanroom::orchestrator::RunConfig;
use protocol::cleanroom::traits::CleanroomService;
use protocol::cleanroom::traits::View;
use protocol::pair::cancel::CancelToken;
use protocol::pair::engine::PairReadWriter;
use protocol::pair::engine::ReadWriterOptions;
use protocol::pair::matcher::MatchOutput;
use protocol::pair::matcher::Matcher;
use protocol::pair::EngineConfig;
use protocol::pair::Transform;
use protocol::storage::data_object_name;
use protocol::storage::Location;
use protocol::storage::Storage;
use rpc::connect::create_client::create_client;
use rpc::connect::token::CleanroomToken;

type CmdResult = Result<(), Box<dyn Error>>;

pub struct Context {
    /// Bound of every clean room request
    pub timeout: Duration,
    pub config_path: PathBuf,
    pub key_config: Option<KeyConfig>,
    /// Cancelled on Ctrl-C
    pub token: CancelToken,
}

/// Re-encryption, decryption and matching never hash, any salt will do
fn unused_salt() -> String {
    STANDARD.encode([0u8; 32])
}

fn private_key(m: &ArgMatches, ctx: &Context) -> Result<String, Box<dyn Error>> {
    if let Some(k) = m.value_of("advertiser-key") {
        return Ok(k.to_string());
    }
    Ok(read_private_key(
        m.value_of("key-file").map(Path::new),
        ctx.key_config.as_ref(),
    )?)
}

fn num_threads(m: &ArgMatches) -> Result<usize, Box<dyn Error>> {
    match m.value_of("num-threads") {
        Some(n) => Ok(n.parse()?),
        None => Ok(EngineConfig::default().max_workers),
    }
}

fn storage(m: &ArgMatches) -> Result<Storage, Box<dyn Error>> {
    match m.value_of("gcs-token") {
        Some(t) => Ok(Storage::with_gcs_token(t)?),
        None => Ok(Storage::local()),
    }
}

fn location(m: &ArgMatches, name: &str) -> Result<Location, Box<dyn Error>> {
    Ok(m.value_of(name).unwrap_or("").parse()?)
}

fn parse_token(m: &ArgMatches) -> Result<CleanroomToken, Box<dyn Error>> {
    let token = CleanroomToken::parse(m.value_of("token").unwrap_or(""))?;
    token.validate(Utc::now().timestamp())?;
    Ok(token)
}

fn report(metrics: &MatchMetrics, output: &str, path: Option<&str>) -> CmdResult {
    if !common::files::is_stdio(output) {
        metrics.print_metrics()?;
    }
    if let Some(p) = path {
        metrics.save_metrics(p)?;
        info!("Metrics saved to {}", p);
    }
    Ok(())
}

pub async fn run(m: &ArgMatches<'_>, ctx: &Context) -> CmdResult {
    let key = private_key(m, ctx)?;
    let token = parse_token(m)?;
    PairPrivateKey::new(&token.hash_salt, &key)?;

    let client = create_client(&token, ctx.timeout)?;
    let gcs_token = client.get_downscoped_token().await?;

    let mut config = RunConfig::new(&token.hash_salt, &key);
    config.workers = num_threads(m)?;
    config.input = m.value_of("input").unwrap_or("").to_string();
    config.output = m.value_of("output").map(String::from);
    config.publisher_ids_dir = m.value_of("save-publisher-pair-ids").map(PathBuf::from);

    let orchestrator = Orchestrator::new(
        client,
        Storage::with_gcs_token(&gcs_token)?,
        config,
        ctx.token.clone(),
    );
    let done = orchestrator.run().await?;
    info!("PAIR operation finished, started with {:?}", done.action);

    if let (Some(metrics), Some(output)) = (done.metrics, m.value_of("output")) {
        report(&metrics, output, m.value_of("metrics"))?;
    }
    Ok(())
}

pub async fn get(m: &ArgMatches<'_>, ctx: &Context) -> CmdResult {
    let token = parse_token(m)?;
    let client = create_client(&token, ctx.timeout)?;

    let view = match m.value_of("view") {
        Some("sensitive") => View::Sensitive,
        _ => View::Full,
    };
    let mut cleanroom = client.get_cleanroom(view).await?;

    if view == View::Sensitive {
        let stale = match cleanroom.pair_config()?.token.as_ref() {
            Some(t) => t.is_expired(Utc::now()),
            None => true,
        };
        if stale {
            debug!("refreshing the storage token");
            cleanroom = client.refresh_token().await?;
        }
    }

    println!("{}", serde_json::to_string_pretty(&cleanroom)?);
    Ok(())
}

pub fn generate_key(m: &ArgMatches, ctx: &Context) -> CmdResult {
    let config = match &ctx.key_config {
        Some(existing) if !m.is_present("force") => {
            println!("Key already exists. Use --force to overwrite.");
            existing.clone()
        }
        _ => {
            let generated = KeyConfig::generate();
            generated.save(&ctx.config_path)?;
            println!(
                "The following key has been generated and saved to: {}",
                ctx.config_path.display()
            );
            generated
        }
    };

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn encrypt(m: &ArgMatches<'_>, ctx: &Context) -> CmdResult {
    let token = parse_token(m)?;
    transform(m, ctx, Transform::HashEncrypt, token.hash_salt).await
}

pub async fn re_encrypt(m: &ArgMatches<'_>, ctx: &Context) -> CmdResult {
    transform(m, ctx, Transform::ReEncrypt, unused_salt()).await
}

pub async fn decrypt(m: &ArgMatches<'_>, ctx: &Context) -> CmdResult {
    transform(m, ctx, Transform::Decrypt, unused_salt()).await
}

async fn transform(
    m: &ArgMatches<'_>,
    ctx: &Context,
    transform: Transform,
    salt: String,
) -> CmdResult {
    let key = private_key(m, ctx)?;
    PairPrivateKey::new(&salt, &key)?;
    let workers = num_threads(m)?;
    let storage = storage(m)?;
    let input = location(m, "input")?;
    let output = location(m, "output")?;

    let readers = storage.open_readers(&input).await?;
    let object = storage.create_writer(&output, &data_object_name()).await?;
    let writer = object.writer()?;
    let token = ctx.token.clone();

    let summary = tokio::task::spawn_blocking(move || {
        PairReadWriter::new(
            MultiReader::new(readers),
            writer,
            ReadWriterOptions::default(),
            EngineConfig::default(),
            &token,
        )?
        .run(transform, workers, &salt, &key)
    })
    .await??;
    object.commit().await?;

    if transform == Transform::ReEncrypt {
        storage.complete(&output).await?;
    }
    info!(
        "{}: read {} IDs, wrote {} PAIR IDs to {}",
        transform, summary.read, summary.written, output
    );
    Ok(())
}

pub async fn match_ids(m: &ArgMatches<'_>, ctx: &Context) -> CmdResult {
    let key = private_key(m, ctx)?;
    let salt = unused_salt();
    PairPrivateKey::new(&salt, &key)?;
    let workers = num_threads(m)?;
    let storage = storage(m)?;

    let advertiser = storage
        .open_readers(&location(m, "advertiser-input")?)
        .await?;
    let publisher = storage
        .open_readers(&location(m, "publisher-input")?)
        .await?;
    let output_path = m.value_of("output").unwrap_or("");
    let output = MatchOutput::from_path(output_path)?;
    let token = ctx.token.clone();

    let metrics = tokio::task::spawn_blocking(move || {
        Matcher::new(advertiser, publisher, output, EngineConfig::default(), &token)?
            .run(workers, &salt, &key)
    })
    .await??;

    report(&metrics, output_path, m.value_of("metrics"))
}
