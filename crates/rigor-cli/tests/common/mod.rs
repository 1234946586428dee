//! Shared helpers for the CLI integration tests.

#![allow(dead_code)]

use clap::Parser;
use rigor_cli::Args;
use rigor_core::{RigorConfig, TestCaseEntry};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// In-memory sink that can be read back after the run consumed its clone.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn args(argv: &[&str]) -> Args {
    let mut full = vec!["rigor", "--no-color"];
    full.extend_from_slice(argv);
    Args::parse_from(full)
}

pub fn config() -> RigorConfig {
    RigorConfig {
        bundle_name: "Demo".into(),
        measure_iterations: 2,
        ..RigorConfig::default()
    }
}

/// Runs `entries` as the command line `argv` asks and returns the exit code
/// with everything written to stdout.
pub fn run(argv: &[&str], entries: &[TestCaseEntry]) -> (i32, String) {
    let out = SharedBuffer::default();
    let code = rigor_cli::run_with_args(&args(argv), entries, config(), out.clone()).unwrap();
    (code, out.contents())
}

pub fn entries() -> Vec<TestCaseEntry> {
    vec![
        TestCaseEntry::new("Math")
            .test("test_add", |ctx| ctx.assert_eq(1 + 1, 2, ""))
            .test("test_sub", |ctx| ctx.assert_eq(2 - 1, 0, "subtraction")),
        TestCaseEntry::new("Network")
            .module("Net")
            .test("test_fetch", |ctx| Err(ctx.skip("offline"))),
    ]
}
