//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use clap::App;
use clap::Arg;
use log::info;
use rand::distributions;
use rand::thread_rng;
use rand::Rng;

pub mod gen {
    use super::*;
    use rand::prelude::SliceRandom;
    use rayon::iter::IntoParallelIterator;
    use rayon::iter::ParallelIterator;
    use sha2::Digest;
    use sha2::Sha256;

    pub struct Data {
        pub publisher: Vec<String>,
        pub advertiser: Vec<String>,
    }

    /// Two sets of hashed emails of `size` each sharing `overlap` entries
    pub fn random_data(size: usize, overlap: usize) -> Data {
        let overlap = overlap.min(size);
        let shared = par_hashed_emails(overlap);

        let mut rng = rand::thread_rng();
        let mut publisher = par_hashed_emails(size - overlap);
        publisher.extend_from_slice(&shared);
        publisher.shuffle(&mut rng);

        let mut advertiser = par_hashed_emails(size - overlap);
        advertiser.extend_from_slice(&shared);
        advertiser.shuffle(&mut rng);

        Data {
            publisher,
            advertiser,
        }
    }

    pub fn par_hashed_emails(size: usize) -> Vec<String> {
        (0..size)
            .into_par_iter()
            .map(|_| hashed_email())
            .collect::<Vec<String>>()
    }

    /// Hex encoded SHA-256 of a random lowercase email
    ///
    /// Uses instance of ThreadRng which has CryptoRng marker on it.
    fn hashed_email() -> String {
        let local: String = thread_rng()
            .sample_iter(&distributions::Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let email = format!("{}@example.com", local.to_lowercase());
        hex::encode(Sha256::digest(email.as_bytes()))
    }

    pub fn write_slice_to_file(source: &[String], path: &str) -> Result<(), csv::Error> {
        use indicatif::ProgressBar;

        let mut wr = csv::WriterBuilder::new()
            .has_headers(false)
            .buffer_capacity(1024)
            .from_path(path)?;
        let progress_bar = ProgressBar::new(source.len() as u64);
        for (i, line) in source.iter().enumerate() {
            wr.write_record([line])?;
            if i % 100 == 0 {
                progress_bar.inc(100);
            }
        }
        progress_bar.finish();
        wr.flush()?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let matches = App::new("PAIR test data")
        .version("0.1")
        .about("Generates hashed email inputs for both sides of a match")
        .arg(
            Arg::with_name("dir")
                .short("d")
                .long("dir")
                .value_name("DIR")
                .help("output dir")
                .takes_value(true)
                .default_value("./"),
        )
        .arg(
            Arg::with_name("size")
                .short("n")
                .long("size")
                .value_name("SIZE")
                .help("records per side")
                .takes_value(true)
                .default_value("10000"),
        )
        .arg(
            Arg::with_name("overlap")
                .short("o")
                .long("overlap")
                .value_name("OVERLAP")
                .help("records present on both sides")
                .takes_value(true)
                .default_value("5000"),
        )
        .get_matches();

    let size = matches.value_of("size").unwrap_or("10000").parse::<usize>()?;
    let overlap = matches.value_of("overlap").unwrap_or("5000").parse::<usize>()?;
    let dir = matches.value_of("dir").unwrap_or("./");

    let fn_pub = format!("{}/publisher_size_{}.csv", dir, size);
    let fn_adv = format!("{}/advertiser_size_{}.csv", dir, size);

    info!("Generating {} records per side, {} shared", size, overlap);
    let data = gen::random_data(size, overlap);
    info!("Data generation done, writing to files");

    gen::write_slice_to_file(&data.publisher, &fn_pub)?;
    info!("File {} finished", fn_pub);

    gen::write_slice_to_file(&data.advertiser, &fn_adv)?;
    info!("File {} finished", fn_adv);

    Ok(())
}
