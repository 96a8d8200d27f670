//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

extern crate csv;

use std::collections::VecDeque;
use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// Name of the marker object written last under a finished location
pub const COMPLETED_FILE: &str = ".Completed";

pub type BoxedReader = Box<dyn Read + Send>;
pub type BoxedWriter = Box<dyn Write + Send>;

/// An empty path or `-` stands for stdin or stdout
pub fn is_stdio(path: &str) -> bool {
    path.is_empty() || path == "-"
}

pub fn is_dir<T>(path: T) -> io::Result<bool>
where
    T: AsRef<Path>,
{
    Ok(fs::metadata(path)?.is_dir())
}

/// Whether an object or file name carries data, as opposed to the
/// completion marker or a directory placeholder
pub fn is_data_name(name: &str) -> bool {
    !name.ends_with(COMPLETED_FILE) && !name.ends_with('/')
}

/// Lists the data files directly under `dir`, sorted by name
///
/// Subdirectories, the completion marker and empty files are skipped.
pub fn list_data_files<T>(dir: T) -> io::Result<Vec<PathBuf>>
where
    T: AsRef<Path>,
{
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        let name = entry.file_name();
        if meta.is_dir() || meta.len() == 0 || !is_data_name(&name.to_string_lossy()) {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// Opens every input behind `path`: stdin, a single file, or the data
/// files of a directory
pub fn file_readers(path: &str) -> io::Result<Vec<BoxedReader>> {
    if is_stdio(path) {
        return Ok(vec![Box::new(io::stdin())]);
    }

    if !is_dir(path)? {
        return Ok(vec![Box::new(File::open(path)?)]);
    }

    let mut readers: Vec<BoxedReader> = Vec::new();
    for f in list_data_files(path)? {
        debug!("opening {}", f.display());
        readers.push(Box::new(File::open(f)?));
    }
    Ok(readers)
}

/// Creates the output behind `path`, stdout when empty
pub fn file_writer(path: &str) -> io::Result<BoxedWriter> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdout()));
    }
    Ok(Box::new(File::create(path)?))
}

/// CSV reader for the single column, header-less record format
pub fn record_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

/// CSV writer for the single column, header-less record format
pub fn record_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .buffer_capacity(1024)
        .from_writer(writer)
}

/// Concatenates several readers into one stream
///
/// A newline is inserted between two inputs when the first one does not end
/// with one, so the last record of a stream never merges with the first
/// record of the next.
pub struct MultiReader<R> {
    readers: VecDeque<R>,
    last: Option<u8>,
    pending_newline: bool,
}

impl<R: Read> MultiReader<R> {
    pub fn new(readers: Vec<R>) -> MultiReader<R> {
        MultiReader {
            readers: readers.into(),
            last: None,
            pending_newline: false,
        }
    }
}

impl<R: Read> Read for MultiReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pending_newline {
                self.pending_newline = false;
                self.last = Some(b'\n');
                buf[0] = b'\n';
                return Ok(1);
            }

            let reader = match self.readers.front_mut() {
                Some(r) => r,
                None => return Ok(0),
            };

            let n = reader.read(buf)?;
            if n > 0 {
                self.last = Some(buf[n - 1]);
                return Ok(n);
            }

            self.readers.pop_front();
            if !self.readers.is_empty() && matches!(self.last, Some(b) if b != b'\n') {
                self.pending_newline = true;
            }
        }
    }
}

/// Returns true as soon as `reader` holds more than `threshold` records
pub fn read_above_count<R: Read>(reader: R, threshold: usize) -> Result<bool, csv::Error> {
    let mut reader = record_reader(reader);
    let mut record = csv::ByteRecord::new();
    let mut count = 0;
    while reader.read_byte_record(&mut record)? {
        count += 1;
        if count > threshold {
            return Ok(true);
        }
    }
    Ok(false)
}
