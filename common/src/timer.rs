//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt::Error;
use std::fmt::Formatter;
use std::time::Duration;
use std::time::Instant;

use log::info;

/// A simple struct that allows to do naive timing outputs
///
/// Logger is used as an output source, make sure logger backend is configured
///
/// Log output may look like
/// `[2024-06-04T20:14:59Z INFO  protocol::pair::engine] [re-encrypt | records size: 10000]
/// elapsed: 0.62500 sec [qps: 16004]`
///
/// # Example
///
/// ```
/// use common::timer;
/// {
///     let mut t = timer::Timer::new("re-encrypt");
///     t.set_extra_label("records");
///     t.set_size(3);
/// } // the timer fires when it goes out of scope
/// ```
pub struct Timer {
    start: Instant,
    label: String,
    extra_label: Option<String>,
    size: Option<usize>,
    silent: bool,
}

impl Timer {
    pub fn new(label: &str) -> Timer {
        Timer {
            start: Instant::now(),
            label: String::from(label),
            extra_label: None,
            size: None,
            silent: false,
        }
    }

    /// A silent timer does not fire on exiting the execution block
    pub fn new_silent(label: &str) -> Timer {
        let mut t = Timer::new(label);
        t.silent = true;
        t
    }

    pub fn set_size(&mut self, sz: usize) {
        self.size = Some(sz);
    }

    pub fn set_extra_label(&mut self, label: &str) {
        self.extra_label = Some(String::from(label));
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Restarts the clock, useful when reusing the timer
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Returns a formatted string with labels, elapsed time and, when a size
    /// is given, the throughput
    pub fn qps_str(&self, label: Option<&str>, size: Option<usize>) -> String {
        let e = self.elapsed().as_secs_f64();

        let fixed_label = label.map(|x| format!(" | {}", x)).unwrap_or_default();
        let fixed_size = size.map(|x| format!(" size: {}", x)).unwrap_or_default();
        let fixed_qps = match size {
            Some(x) if e > 0.0 => format!(" [qps: {:.0}]", (x as f64) / e),
            _ => String::new(),
        };

        format!(
            "[{}{}{}] elapsed: {:.5} sec{}",
            self.label, fixed_label, fixed_size, e, fixed_qps
        )
    }

    /// Sends formatted string without QPS to `log.info`
    pub fn elapsed_log(&self, label: Option<&str>) {
        info!("{}", self.qps_str(label, None))
    }

    /// Sends formatted string with QPS to `log.info`
    pub fn qps(&self, label: &str, size: usize) {
        info!("{}", self.qps_str(Some(label), Some(size)));
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "timer, label: {}", self.label)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.silent {
            info!(
                "{}",
                self.qps_str(self.extra_label.as_deref(), self.size)
            );
        }
    }
}
