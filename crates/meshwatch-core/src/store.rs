//! Append-only CSV persistence for telemetry and traceroute records.
//!
//! # Storage format
//!
//! - `telemetry.csv`: one row per (node, cycle). The header is the base
//!   columns, then the known optional sensor columns, then any metric first
//!   seen later.
//! - `traceroute.csv`: `timestamp,source,destination,forward_path,backward_path,success`
//!
//! A file has exactly one header row. Reopening an existing file reuses its
//! header. A new column is added by rewriting the header line (temp file
//! + rename), never by reordering existing columns. Rows written before the
//! widening are shorter than the header, and [`read_table`] reports their
//! missing trailing columns as absent.
//!
//! Every append opens the file, writes one fully formatted line, syncs and
//! closes it. No handle outlives a single write.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record::{
    TelemetryRecord, TracerouteRecord, default_telemetry_columns, traceroute_columns,
};

// ---------------------------------------------------------------------------
// CSV table
// ---------------------------------------------------------------------------

/// One CSV file with a stable, additive header.
#[derive(Debug, Clone)]
pub struct CsvTable {
    path: PathBuf,
    columns: Vec<String>,
}

impl CsvTable {
    /// Open (or create) a table and make sure its header covers `declared`.
    pub fn open(path: impl Into<PathBuf>, declared: &[String]) -> Result<Self> {
        let mut table = Self {
            path: path.into(),
            columns: Vec::new(),
        };
        table.ensure_schema(declared)?;
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current header, in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Guarantee exactly one header row that contains every column in
    /// `columns`.
    ///
    /// - missing or blank file: the header is written once, as declared
    /// - existing header already covering `columns`: nothing is written
    /// - existing header lacking some columns: they are appended to the
    ///   header line; complete data rows are left byte-for-byte untouched
    ///
    /// Blank lines before the header are dropped. An unterminated last line,
    /// left behind by an interrupted write, is terminated when it holds a
    /// full row and dropped otherwise, so the next append starts on a line
    /// of its own.
    pub fn ensure_schema(&mut self, columns: &[String]) -> Result<()> {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::persistence(&self.path, e)),
        };

        let Some(span) = header_span(&content) else {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
            }
            fs::write(&self.path, format_line(columns))
                .map_err(|e| Error::persistence(&self.path, e))?;
            self.columns = columns.to_vec();
            return Ok(());
        };

        let header = String::from_utf8_lossy(&content[span.clone()]);
        let existing = split_line(header.trim_end_matches(['\r', '\n']));
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !existing.contains(c))
            .cloned()
            .collect();

        let mut rewrite = span.start > 0 || !content[..span.end].ends_with(b"\n");
        if span.start > 0 {
            log::warn!("dropping blank lines before the header of {}", self.path.display());
        }
        let mut body = content[span.end..].to_vec();
        match repair_tail(&mut body, existing.len()) {
            Tail::Intact => {}
            Tail::Terminated => {
                log::warn!("terminating unfinished last line of {}", self.path.display());
                rewrite = true;
            }
            Tail::Dropped(partial) => {
                log::warn!(
                    "dropping incomplete last row of {}: {partial}",
                    self.path.display()
                );
                rewrite = true;
            }
        }

        self.columns = existing;
        if !missing.is_empty() {
            log::info!(
                "widening header of {} with {}",
                self.path.display(),
                missing.join(", ")
            );
            self.columns.extend(missing);
            rewrite = true;
        }
        if rewrite {
            replace_file(&self.path, &self.columns, &body)
                .map_err(|e| Error::persistence(&self.path, e))?;
        }
        Ok(())
    }

    /// Append one row whose fields line up with [`columns`](Self::columns).
    pub fn append_row(&self, fields: &[String]) -> Result<()> {
        // Format completely before touching the file so a formatting problem
        // can never leave half a line behind.
        let line = format_line(fields);
        self.write_line(&line)
            .map_err(|e| Error::persistence(&self.path, e))
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // The file was removed or truncated behind our back: restore the header.
        if file.metadata()?.len() == 0 {
            file.write_all(format_line(&self.columns).as_bytes())?;
        }
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }
}

/// Byte range of the header: the first line with non-blank content,
/// including its terminator when it has one.
fn header_span(content: &[u8]) -> Option<Range<usize>> {
    let mut start = 0;
    while start < content.len() {
        let end = content[start..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(content.len(), |i| start + i + 1);
        if content[start..end].iter().any(|b| !b.is_ascii_whitespace()) {
            return Some(start..end);
        }
        start = end;
    }
    None
}

/// What [`repair_tail`] did to the rows after the header.
#[derive(Debug, PartialEq)]
enum Tail {
    Intact,
    /// The last line held a full row and only lacked its newline.
    Terminated,
    /// The last line was cut short and has been removed.
    Dropped(String),
}

/// Make `body` end on a line boundary. A trailing line with at least `width`
/// fields is terminated; a shorter one is a cut-off row and is removed.
fn repair_tail(body: &mut Vec<u8>, width: usize) -> Tail {
    if body.is_empty() || body.ends_with(b"\n") {
        return Tail::Intact;
    }
    let start = body
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    let last = String::from_utf8_lossy(&body[start..]).into_owned();
    if split_line(last.trim_end_matches('\r')).len() >= width {
        body.push(b'\n');
        Tail::Terminated
    } else {
        body.truncate(start);
        Tail::Dropped(last)
    }
}

/// Replace `path` with a header of `columns` followed by `body`, through a
/// temp file in the same directory and a rename.
fn replace_file(path: &Path, columns: &[String], body: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(format_line(columns).as_bytes())?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Destination for parsed records. Each call either persists the whole
/// record or returns an error and leaves the destination as it was.
pub trait RecordSink {
    fn append_telemetry(&mut self, record: &TelemetryRecord) -> Result<()>;
    fn append_traceroute(&mut self, record: &TracerouteRecord) -> Result<()>;
}

/// Append-only CSV files for the two record kinds.
#[derive(Debug)]
pub struct RecordStore {
    telemetry: CsvTable,
    traceroute: CsvTable,
}

impl RecordStore {
    /// Open both files, writing headers where needed. A fresh store holds
    /// exactly one header row per file even if nothing is ever appended.
    pub fn open(telemetry_path: impl Into<PathBuf>, traceroute_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            telemetry: CsvTable::open(telemetry_path, &default_telemetry_columns())?,
            traceroute: CsvTable::open(traceroute_path, &traceroute_columns())?,
        })
    }

    pub fn telemetry_path(&self) -> &Path {
        self.telemetry.path()
    }

    pub fn traceroute_path(&self) -> &Path {
        self.traceroute.path()
    }

    pub fn telemetry_columns(&self) -> &[String] {
        self.telemetry.columns()
    }

    /// Append one telemetry row, widening the header first if the record
    /// carries a metric the file has not seen.
    pub fn append_telemetry(&mut self, record: &TelemetryRecord) -> Result<()> {
        let unseen: Vec<String> = record
            .metrics
            .keys()
            .filter(|m| !self.telemetry.columns().contains(m))
            .cloned()
            .collect();
        if !unseen.is_empty() {
            self.telemetry.ensure_schema(&unseen)?;
        }
        let row = record.to_row(self.telemetry.columns());
        self.telemetry.append_row(&row)
    }

    pub fn append_traceroute(&mut self, record: &TracerouteRecord) -> Result<()> {
        let by_name: BTreeMap<&str, String> = crate::record::TRACEROUTE_COLUMNS
            .iter()
            .copied()
            .zip(record.to_row())
            .collect();
        let row: Vec<String> = self
            .traceroute
            .columns()
            .iter()
            .map(|c| by_name.get(c.as_str()).cloned().unwrap_or_default())
            .collect();
        self.traceroute.append_row(&row)
    }
}

impl RecordSink for RecordStore {
    fn append_telemetry(&mut self, record: &TelemetryRecord) -> Result<()> {
        RecordStore::append_telemetry(self, record)
    }

    fn append_traceroute(&mut self, record: &TracerouteRecord) -> Result<()> {
        RecordStore::append_traceroute(self, record)
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One data row keyed by column name. Empty and missing cells are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    values: BTreeMap<String, String>,
}

impl TableRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column)?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parsed contents of a CSV file written by [`CsvTable`].
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

/// Read a table back. Rows shorter than the header (written before a
/// widening) yield absent values for the trailing columns; extra fields
/// beyond the header are ignored.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|e| Error::persistence(path, e))?;
    let mut table = Table::default();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::persistence(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(&line);
        if table.columns.is_empty() {
            table.columns = fields;
            continue;
        }
        let values = table
            .columns
            .iter()
            .zip(fields)
            .filter(|(_, v)| !v.is_empty())
            .map(|(c, v)| (c.clone(), v))
            .collect();
        table.rows.push(TableRow { values });
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV helpers
// ---------------------------------------------------------------------------

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_line(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Split one CSV line, honouring double-quoted fields.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
