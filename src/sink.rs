use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

use crate::types::OutputRow;

/// Durable, append-only destination for output rows.
pub trait ResultSink: Send {
    /// Append `rows`. Previously written rows are never touched.
    fn write(&mut self, rows: &[OutputRow]) -> Result<()>;
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn write(&mut self, rows: &[OutputRow]) -> Result<()> {
        (**self).write(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Open the sink for `format` at `path`.
///
/// Unless `append` is set the file starts out empty, as each run records a
/// fresh set of results.
pub fn open_sink(format: OutputFormat, path: &Path, append: bool) -> Result<Box<dyn ResultSink>> {
    Ok(match format {
        OutputFormat::Csv => Box::new(CsvSink::create(path, append)?),
        OutputFormat::Json => Box::new(JsonSink::create(path, append)?),
    })
}

fn prepare(path: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(!append);
    options
        .open(path)
        .with_context(|| format!("failed to open output file: {}", path.display()))
}

/// CSV output with a single header line.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>, append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        prepare(&path, append)?;
        Ok(Self { path })
    }
}

impl ResultSink for CsvSink {
    fn write(&mut self, rows: &[OutputRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open output file: {}", self.path.display()))?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

const JSON_EMPTY: &[u8] = b"[\n]\n";
const JSON_TAIL: &[u8] = b"\n]\n";

/// JSON array output that stays a valid document after every write.
///
/// Appending only replaces the closing `\n]\n` terminator.
#[derive(Debug)]
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn create(path: impl AsRef<Path>, append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = prepare(&path, append)?;
        if file.metadata()?.len() == 0 {
            file.write_all(JSON_EMPTY)?;
            file.flush()?;
        }
        Ok(Self { path })
    }
}

impl ResultSink for JsonSink {
    fn write(&mut self, rows: &[OutputRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("failed to open output file: {}", self.path.display()))?;

        let len = file.metadata()?.len();
        let tail_len = JSON_TAIL.len() as u64;
        if len < tail_len + 1 {
            bail!("{} is not a JSON array written by this tool", self.path.display());
        }
        let mut tail = [0u8; 3];
        file.seek(SeekFrom::Start(len - tail_len))?;
        file.read_exact(&mut tail)?;
        if &tail[..] != JSON_TAIL {
            bail!("{} does not end with a closing bracket", self.path.display());
        }

        let body_len = len - tail_len;
        let mut out = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            // The body is just "[" until the first row lands.
            let sep: &[u8] = if body_len == 1 && idx == 0 { b"\n" } else { b",\n" };
            out.extend_from_slice(sep);
            out.extend_from_slice(b"  ");
            serde_json::to_writer(&mut out, row)?;
        }
        out.extend_from_slice(JSON_TAIL);

        file.set_len(body_len)?;
        file.seek(SeekFrom::Start(body_len))?;
        file.write_all(&out)?;
        file.flush()?;
        Ok(())
    }
}
