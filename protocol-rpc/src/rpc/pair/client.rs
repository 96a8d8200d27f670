//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#[macro_use]
extern crate log;
extern crate clap;
extern crate ctrlc;

use std::path::PathBuf;
use std::time::Duration;

use clap::App;
use clap::AppSettings;
use clap::Arg;
use clap::SubCommand;
use crypto::keys::KeyConfig;
use protocol::pair::cancel::CancelToken;

mod commands;

const ABOUT: &str = "pair runs the advertiser side of a PAIR (Publisher Advertiser Identity \
Reconciliation) operation in a dual data clean room, where the publisher clean room \
coordinates the exchange of encrypted identifiers.";

/// Key configuration below the user configuration directory
const KEY_CONFIG_PATH: &str = ".config/opair/key/key.json";

fn key_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("advertiser-key")
            .long("advertiser-key")
            .short("k")
            .takes_value(true)
            .help(
                "The advertiser private key to use for the operation. \
                 If not provided, the key saved in the configuration file will be used.",
            ),
        Arg::with_name("key-file")
            .long("key-file")
            .takes_value(true)
            .conflicts_with("advertiser-key")
            .help("Path to a key configuration file to read the advertiser private key from"),
        Arg::with_name("num-threads")
            .long("num-threads")
            .short("n")
            .takes_value(true)
            .help("The number of threads to use, defaults to the number of cores"),
    ]
}

fn gcs_token_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("gcs-token")
        .long("gcs-token")
        .takes_value(true)
        .help("Scoped GCS access token, required for gs:// locations")
}

fn init_logger(verbosity: u64) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn default_config_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(KEY_CONFIG_PATH),
        None => PathBuf::from(KEY_CONFIG_PATH),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let token_arg = Arg::with_name("token")
        .required(true)
        .index(1)
        .help("The PAIR clean room token to use for the operation");

    let matches = App::new("pair")
        .version(env!("CARGO_PKG_VERSION"))
        .about(ABOUT)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .args(&[
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Enable debug logging, -vv for trace"),
            Arg::with_name("timeout")
                .long("timeout")
                .takes_value(true)
                .default_value("5")
                .global(true)
                .help("Timeout in seconds of every clean room request"),
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .global(true)
                .help("Path to the key configuration, defaults to $HOME/.config/opair/key/key.json"),
        ])
        .subcommand(
            SubCommand::with_name("run")
                .about(
                    "Runs the whole PAIR operation: hash and encrypt the advertiser data, \
                     re-encrypt the publisher data and optionally match both. \
                     Resumes after the last finished step.",
                )
                .arg(token_arg.clone())
                .args(&key_args())
                .args(&[
                    Arg::with_name("input")
                        .long("input")
                        .short("i")
                        .takes_value(true)
                        .help(
                            "File with the advertiser identifiers to hash and encrypt. \
                             Every file of a directory is read, stdin when not provided.",
                        ),
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help(
                            "Directory to write the matched PAIR IDs to. \
                             The match is skipped when not provided.",
                        ),
                    Arg::with_name("save-publisher-pair-ids")
                        .long("save-publisher-pair-ids")
                        .short("s")
                        .takes_value(true)
                        .help(
                            "Directory to keep a copy of the re-encrypted publisher PAIR IDs in, \
                             the match then reads them from there",
                        ),
                    Arg::with_name("metrics")
                        .long("metrics")
                        .takes_value(true)
                        .help("Path to save the match metrics to as JSON"),
                ]),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("Prints the clean room")
                .arg(token_arg.clone())
                .arg(
                    Arg::with_name("view")
                        .long("view")
                        .takes_value(true)
                        .possible_values(&["full", "sensitive"])
                        .default_value("full")
                        .help("The view of the clean room"),
                ),
        )
        .subcommand(
            SubCommand::with_name("generate-key")
                .about("Generates a private key and saves it to the key configuration")
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .short("f")
                        .help(
                            "Overwrite an existing key. \
                             A rotated key invalidates ongoing PAIR operations.",
                        ),
                ),
        )
        .subcommand(
            SubCommand::with_name("encrypt")
                .about("Hashes and encrypts identifiers with the clean room salt")
                .arg(token_arg)
                .args(&key_args())
                .arg(gcs_token_arg())
                .args(&[
                    Arg::with_name("input")
                        .long("input")
                        .short("i")
                        .takes_value(true)
                        .help("File, directory or gs:// prefix to read, stdin when not provided"),
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help("File, directory or gs:// prefix to write to, stdout when not provided"),
                ]),
        )
        .subcommand(
            SubCommand::with_name("re-encrypt")
                .about("Re-encrypts encrypted PAIR IDs and completes the output location")
                .args(&key_args())
                .arg(gcs_token_arg())
                .args(&[
                    Arg::with_name("input")
                        .long("input")
                        .short("i")
                        .takes_value(true)
                        .help("File, directory or gs:// prefix to read, stdin when not provided"),
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help("File, directory or gs:// prefix to write to, stdout when not provided"),
                ]),
        )
        .subcommand(
            SubCommand::with_name("decrypt")
                .about("Removes the advertiser encryption layer from PAIR IDs")
                .args(&key_args())
                .arg(gcs_token_arg())
                .args(&[
                    Arg::with_name("input")
                        .long("input")
                        .short("i")
                        .takes_value(true)
                        .help("File, directory or gs:// prefix to read, stdin when not provided"),
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help("File, directory or gs:// prefix to write to, stdout when not provided"),
                ]),
        )
        .subcommand(
            SubCommand::with_name("match")
                .about("Matches triple encrypted advertiser and publisher PAIR IDs")
                .args(&key_args())
                .arg(gcs_token_arg())
                .args(&[
                    Arg::with_name("advertiser-input")
                        .long("advertiser-input")
                        .short("a")
                        .takes_value(true)
                        .required(true)
                        .help("File, directory or gs:// prefix of the advertiser triple encrypted PAIR IDs"),
                    Arg::with_name("publisher-input")
                        .long("publisher-input")
                        .short("p")
                        .takes_value(true)
                        .required(true)
                        .help("File, directory or gs:// prefix of the publisher triple encrypted PAIR IDs"),
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help(
                            "Directory to write one result file per thread to, \
                             stdout when not provided",
                        ),
                    Arg::with_name("metrics")
                        .long("metrics")
                        .takes_value(true)
                        .help("Path to save the match metrics to as JSON"),
                ]),
        )
        .subcommand(SubCommand::with_name("version").about("Prints the version"))
        .get_matches();

    // global flags may be given before or after the subcommand
    let sub = matches.subcommand().1;
    let global = |name: &str| {
        sub.and_then(|m| m.value_of(name))
            .or_else(|| matches.value_of(name))
    };

    init_logger(
        matches
            .occurrences_of("verbose")
            .max(sub.map_or(0, |m| m.occurrences_of("verbose"))),
    );

    let timeout = global("timeout")
        .unwrap_or("5")
        .parse::<u64>()
        .map(Duration::from_secs)?;
    let config_path = global("config")
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let key_config = KeyConfig::load(&config_path)?;

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping");
        handler_token.cancel();
    })?;

    let ctx = commands::Context {
        timeout,
        config_path,
        key_config,
        token,
    };

    match matches.subcommand() {
        ("run", Some(m)) => commands::run(m, &ctx).await,
        ("get", Some(m)) => commands::get(m, &ctx).await,
        ("generate-key", Some(m)) => commands::generate_key(m, &ctx),
        ("encrypt", Some(m)) => commands::encrypt(m, &ctx).await,
        ("re-encrypt", Some(m)) => commands::re_encrypt(m, &ctx).await,
        ("decrypt", Some(m)) => commands::decrypt(m, &ctx).await,
        ("match", Some(m)) => commands::match_ids(m, &ctx).await,
        ("version", Some(_)) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => Ok(()),
    }
}
