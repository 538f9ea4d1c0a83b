//! The historic benchmark results file.
//!
//! Every hap.py [`Row`] is also kept in a long-running CSV so that benchmark
//! results can be compared across runs. A sample is benchmarked against a
//! GiaB truth set at most once per run, so a row whose (`Sample_name`,
//! `Run_ID`, `GiaB_sample`) triple is already present is not appended again.

use std::fs;
use std::io;
use std::path::Path;

use csv::StringRecord;
use tracing::info;
use tracing::warn;

use crate::happy::Row;
use crate::happy::COMMENT_PREFIX;
use crate::happy::HEADER;

/// The columns that identify a row.
pub const KEY_COLUMNS: [&str; 3] = ["Sample_name", "Run_ID", "GiaB_sample"];

/// An error related to the historic results file.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// A CSV error.
    Csv(csv::Error),

    /// The historic file lacks one of the [`KEY_COLUMNS`].
    MissingColumn(&'static str),

    /// A record of the historic file does not have one field per column.
    RecordLength {
        /// The number of the record, starting at one.
        record: usize,

        /// The number of columns in the header.
        expected: usize,

        /// The number of fields in the record.
        found: usize,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Csv(err) => write!(f, "csv error: {err}"),
            Error::MissingColumn(column) => {
                write!(f, "historic file has no column: {column}")
            }
            Error::RecordLength {
                record,
                expected,
                found,
            } => write!(
                f,
                "historic file record {record} has {found} fields but the header has {expected}"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// What [`append()`] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The file did not exist and was created with the row.
    Created,

    /// The row was appended.
    Appended,

    /// A row with the same key already existed; nothing was written.
    Duplicate,
}

/// Adds `row` to the historic file at `path` unless a row with the same key
/// is already present.
///
/// When the file was written with a different set of columns, it is rewritten
/// with the union of both: the existing columns first, then any new ones.
/// Missing values are left empty. Lines starting with `##` are kept at the
/// top of the file. Records with more or fewer fields than the header are an
/// error and leave the file untouched.
pub fn append(path: impl AsRef<Path>, row: &Row) -> Result<Outcome> {
    let path = path.as_ref();

    if !path.exists() {
        write(path, &[], &StringRecord::from(HEADER.to_vec()), &[], row)?;
        info!("created historic file {}", path.display());
        return Ok(Outcome::Created);
    }

    let contents = fs::read_to_string(path).map_err(Error::Io)?;
    let (comments, data): (Vec<&str>, Vec<&str>) = contents
        .lines()
        .partition(|line| line.starts_with(COMMENT_PREFIX));
    let data = data.join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut headers = reader.headers().map_err(Error::Csv)?.clone();
    let records = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::Csv)?;

    for (i, record) in records.iter().enumerate() {
        if record.len() != headers.len() {
            return Err(Error::RecordLength {
                record: i + 1,
                expected: headers.len(),
                found: record.len(),
            });
        }
    }

    let key = KEY_COLUMNS
        .iter()
        .map(|&column| {
            headers
                .iter()
                .position(|header| header == column)
                .ok_or(Error::MissingColumn(column))
        })
        .collect::<Result<Vec<_>>>()?;
    let wanted = [row.sample_name(), row.run_id(), row.giab_sample()];

    let duplicate = records.iter().any(|record| {
        key.iter()
            .zip(wanted)
            .all(|(&i, value)| record.get(i) == Some(value))
    });

    if duplicate {
        warn!(
            "a row for sample {}, run {} and GiaB sample {} already exists in {}, not appending",
            row.sample_name(),
            row.run_id(),
            row.giab_sample(),
            path.display()
        );
        return Ok(Outcome::Duplicate);
    }

    for column in HEADER {
        if !headers.iter().any(|header| header == column) {
            headers.push_field(column);
        }
    }

    write(path, &comments, &headers, &records, row)?;
    info!("appended to historic file {}", path.display());

    Ok(Outcome::Appended)
}

/// Writes `comments`, then `records` followed by `row` under `headers`.
fn write(
    path: &Path,
    comments: &[&str],
    headers: &StringRecord,
    records: &[StringRecord],
    row: &Row,
) -> Result<()> {
    let mut buffer = Vec::new();

    for comment in comments {
        buffer.extend_from_slice(comment.as_bytes());
        buffer.push(b'\n');
    }

    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(headers).map_err(Error::Csv)?;

        for record in records {
            let padded = (0..headers.len()).map(|i| record.get(i).unwrap_or_default());
            writer.write_record(padded).map_err(Error::Csv)?;
        }

        let values = row.values();
        let fields = headers.iter().map(|header| {
            HEADER
                .iter()
                .position(|column| *column == header)
                .map(|i| values[i].as_str())
                .unwrap_or_default()
        });
        writer.write_record(fields).map_err(Error::Csv)?;
        writer.flush().map_err(Error::Io)?;
    }

    fs::write(path, buffer).map_err(Error::Io)
}
