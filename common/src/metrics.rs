//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0
use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

/// Summary of one match run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchMetrics {
    pub protocol_name: String,
    pub advertiser_input_size: u64,
    pub publisher_input_size: u64,
    pub matched: u64,
    /// Percentage of advertiser records that matched, in [0, 100]
    pub match_rate: f64,
}

impl MatchMetrics {
    pub fn new(advertiser_input_size: u64, publisher_input_size: u64, matched: u64) -> MatchMetrics {
        MatchMetrics {
            protocol_name: "pair".to_string(),
            advertiser_input_size,
            publisher_input_size,
            matched,
            match_rate: match_rate(matched, advertiser_input_size),
        }
    }

    pub fn save_metrics<T: AsRef<Path>>(&self, path: T) -> Result<(), std::io::Error> {
        let f = File::create(path)?;
        serde_json::to_writer(f, &self)?;
        Ok(())
    }

    pub fn print_metrics(&self) -> Result<(), serde_json::Error> {
        println!("-----BEGIN METRIC VIEW-----");
        println!("{}", serde_json::to_string(&self)?);
        println!("-----END METRIC VIEW-----");
        Ok(())
    }
}

/// `matched / total * 100` clamped to [0, 100], 0 for an empty total
pub fn match_rate(matched: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (matched as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_rate_is_clamped() {
        assert_eq!(match_rate(0, 0), 0.0);
        assert_eq!(match_rate(450, 900), 50.0);
        assert_eq!(match_rate(1200, 1000), 100.0);
    }

    #[test]
    fn test_metrics_save() {
        use std::io::Read;

        use tempfile::NamedTempFile;

        let m = MatchMetrics::new(1000, 900, 800);
        assert_eq!(m.match_rate, 80.0);

        let mut file = NamedTempFile::new().unwrap();
        m.save_metrics(file.path()).unwrap();
        m.print_metrics().unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(
            buf,
            "{\"protocol_name\":\"pair\",\"advertiser_input_size\":1000,\"publisher_input_size\":900,\"matched\":800,\"match_rate\":80.0}"
        );
        drop(file);
    }
}
