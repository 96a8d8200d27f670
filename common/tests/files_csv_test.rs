//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::Read;
use std::io::Write;

use common::files::file_readers;
use common::files::file_writer;
use common::files::list_data_files;
use common::files::read_above_count;
use common::files::MultiReader;
use common::files::COMPLETED_FILE;
use tempfile::tempdir;

#[test]
fn test_list_data_files_skips_markers() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b.csv"), "3\n4\n").unwrap();
    fs::write(dir.path().join("a.csv"), "1\n2").unwrap();
    fs::write(dir.path().join("empty.csv"), "").unwrap();
    fs::write(dir.path().join(COMPLETED_FILE), "v1").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested/c.csv"), "5\n").unwrap();

    let files = list_data_files(dir.path()).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
}

#[test]
fn test_read_directory_as_one_stream() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.csv"), "1\n2").unwrap();
    fs::write(dir.path().join("b.csv"), "3\n4\n").unwrap();

    let readers = file_readers(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(readers.len(), 2);

    let mut out = String::new();
    MultiReader::new(readers).read_to_string(&mut out).unwrap();
    assert_eq!(out, "1\n2\n3\n4\n");
}

#[test]
fn test_write_then_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let path = path.to_str().unwrap();

    {
        let mut w = file_writer(path).unwrap();
        for i in 0..1001 {
            writeln!(w, "id{}", i).unwrap();
        }
    }

    let mut readers = file_readers(path).unwrap();
    assert!(read_above_count(readers.remove(0), 1000).unwrap());

    let mut readers = file_readers(path).unwrap();
    assert!(!read_above_count(readers.remove(0), 1001).unwrap());
}
