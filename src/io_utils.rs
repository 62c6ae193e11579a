//! I/O utilities for CSV reading, writing, encoding, and delimiter resolution.
//!
//! All file I/O in epi-canon flows through this module. It provides:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override from the dataset configuration.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//!   Canonical output is always UTF-8.
//! - **Staged replacement**: canonical files are written to a temp file next
//!   to the destination and renamed over it only once every destination of
//!   the run has staged its rows, so readers never see a partial table.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    has_headers: bool,
) -> Result<csv::Reader<BufReader<File>>> {
    let reader =
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?);
    Ok(open_csv_reader(reader, delimiter, has_headers))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

/// A canonical file written next to its destination but not yet visible
/// under the destination name. Dropping it removes the temp file.
#[derive(Debug)]
pub struct StagedCsv {
    file: NamedTempFile,
    digest: String,
}

impl StagedCsv {
    /// SHA-256 of the staged bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Renames the staged file over `path` in one step.
    pub fn persist(self, path: &Path) -> Result<String> {
        self.file
            .persist(path)
            .map_err(|err| anyhow!("Replacing {path:?}: {}", err.error))?;
        Ok(self.digest)
    }
}

/// Writes `headers` and `rows` to a temp file in the directory of `path`.
pub fn stage_csv<I, R>(path: &Path, headers: &[&str], rows: I) -> Result<StagedCsv>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Creating output directory {parent:?}"))?;
    let staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("Creating temp file in {parent:?}"))?;

    let mut hasher = Sha256::new();
    {
        let sink = HashingWriter {
            inner: BufWriter::new(staged.as_file()),
            hasher: &mut hasher,
        };
        let mut writer = csv::WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .from_writer(sink);
        writer
            .write_record(headers)
            .context("Writing output headers")?;
        for (idx, row) in rows.into_iter().enumerate() {
            writer
                .write_record(row)
                .with_context(|| format!("Writing output row {}", idx + 1))?;
        }
        writer.flush().context("Flushing output")?;
    }
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("Syncing temp file for {path:?}"))?;
    Ok(StagedCsv {
        file: staged,
        digest: format!("{:x}", hasher.finalize()),
    })
}

struct HashingWriter<'h, W: Write> {
    inner: W,
    hasher: &'h mut Sha256,
}

impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
