//! Comma-separated customer file reader
//!
//! Columns are positional (`name, email, phoneNumber, aadhaarNumber, panNumber,
//! state, city`). The first line is a header and is skipped without being
//! checked. Lines are non-strict: short lines are padded, extra fields ignored.
//! A blank line becomes a record with every field empty, which then fails
//! validation like any other incomplete row.

use crate::customer::Customer;
use crate::error::{BatchError, FatalError, ReadError, Result};
use crate::framework::item::ItemReader;
use async_trait::async_trait;
use csv::{ErrorKind, StringRecord, Terminator};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct CsvCustomerReader {
    path: PathBuf,
    reader: Option<csv::Reader<NewlineTerminated<File>>>,
    record: StringRecord,
    /// Blank lines found ahead of `held`, not yet handed out
    blank_lines: u64,
    held: Option<Customer>,
}

impl CsvCustomerReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
            record: StringRecord::new(),
            blank_lines: 0,
            held: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn input_error(&self, source: csv::Error) -> BatchError {
        FatalError::InputRead {
            path: self.path.clone(),
            source,
        }
        .into()
    }
}

/// Yields a final `\n` when the input does not already end with one.
///
/// With every record newline-terminated, the lines a read consumes are exactly
/// the blank lines before the record, its embedded newlines and its terminator.
struct NewlineTerminated<R> {
    inner: R,
    last: Option<u8>,
    done: bool,
}

impl<R> NewlineTerminated<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            last: None,
            done: false,
        }
    }
}

impl<R: Read> Read for NewlineTerminated<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        let n = self.inner.read(buf)?;
        if n > 0 {
            self.last = Some(buf[n - 1]);
            return Ok(n);
        }

        self.done = true;
        match self.last {
            Some(b'\n') | None => Ok(0),
            Some(_) => {
                buf[0] = b'\n';
                Ok(1)
            },
        }
    }
}

/// Record fields with the `\r` of a CRLF line ending removed from the last one
fn record_fields(record: &StringRecord) -> impl Iterator<Item = &str> {
    let last = record.len().saturating_sub(1);
    record.iter().enumerate().map(move |(i, field)| {
        if i == last {
            field.strip_suffix('\r').unwrap_or(field)
        } else {
            field
        }
    })
}

fn blank_record() -> Customer {
    Customer::from_fields(std::iter::empty())
}

/// I/O failures are fatal; anything else concerns only the current line
fn classify(err: csv::Error, path: &Path, fallback_line: u64) -> BatchError {
    if matches!(err.kind(), ErrorKind::Io(_)) {
        return FatalError::InputRead {
            path: path.to_path_buf(),
            source: err,
        }
        .into();
    }

    let line = err.position().map(|p| p.line()).unwrap_or(fallback_line);
    ReadError {
        line,
        message: err.to_string(),
    }
    .into()
}

#[async_trait]
impl ItemReader<Customer> for CsvCustomerReader {
    async fn open(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|source| FatalError::ResourceOpen {
            path: self.path.clone(),
            source,
        })?;

        // Only `\n` ends a record so that line counts stay exact; a trailing
        // `\r` is stripped from the record instead
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .quote(b'"')
            .double_quote(true)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(true)
            .flexible(true)
            .from_reader(NewlineTerminated::new(file));

        match reader.headers() {
            Ok(header) => info!(
                path = %self.path.display(),
                header = %header.iter().collect::<Vec<_>>().join(","),
                "Skipping header line"
            ),
            Err(err) if matches!(err.kind(), ErrorKind::Io(_)) => {
                return Err(self.input_error(err))
            },
            Err(err) => debug!(error = %err, "Header line is not valid UTF-8, skipped anyway"),
        }

        self.reader = Some(reader);
        self.blank_lines = 0;
        self.held = None;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Customer>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(BatchError::step_configuration(format!(
                "reader for '{}' used before open",
                self.path.display()
            )));
        };

        if self.blank_lines > 0 {
            self.blank_lines -= 1;
            return Ok(Some(blank_record()));
        }
        if let Some(customer) = self.held.take() {
            return Ok(Some(customer));
        }

        let before = reader.position().line();
        let customer = match reader.read_record(&mut self.record) {
            Ok(true) => Some(Customer::from_fields(record_fields(&self.record))),
            Ok(false) => None,
            Err(err) => {
                let line = reader.position().line();
                return Err(classify(err, &self.path, line));
            },
        };

        let consumed = reader.position().line() - before;
        let own_lines = match &customer {
            Some(_) => {
                let embedded: usize = self.record.iter().map(|f| f.matches('\n').count()).sum();
                embedded as u64 + 1
            },
            None => 0,
        };
        let blanks = consumed.saturating_sub(own_lines);
        if blanks == 0 {
            return Ok(customer);
        }

        debug!(
            path = %self.path.display(),
            line = before,
            blanks,
            "Blank lines read as empty records"
        );
        self.blank_lines = blanks - 1;
        self.held = customer;
        Ok(Some(blank_record()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), "Closed input file");
        }
        self.blank_lines = 0;
        self.held = None;
        Ok(())
    }
}
