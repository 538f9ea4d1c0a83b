//! Discovery of QC documents on the shared results filesystem.
//!
//! Sorted QC results are stored six levels below a root directory:
//!
//! ```text
//! <root>/<check>/<facility>/<NBA>/<shortname>/<samplename>/<file>
//! ```
//!
//! For example:
//!
//! ```text
//! <root>/passed/wgs_east/NBA2/200622_A00559_0210_AHTFHCDMXX/06sjyvj81-17RKG002918-01/qc.json
//! ```
//!
//! [`find()`] walks a root directory and returns a [`Candidate`] for every file
//! that follows this convention and passes a [`Filter`]. Candidate lists are
//! written to and read back from CSV so they can be reviewed (and edited)
//! before anything is pushed.

pub mod locate;

use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

/// The number of path components between the root and a QC document
/// (inclusive of the file name).
pub const DEPTH: usize = 6;

/// The default pipeline generation marker.
pub const DEFAULT_MARKER: &str = "NBA2";

/// The default substring that file names must contain.
pub const DEFAULT_FILE_MATCH: &str = ".json";

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to discovering QC documents.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// An error walking the directory tree.
    Walk(walkdir::Error),

    /// An error reading or writing a candidate list.
    Csv(csv::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Walk(err) => write!(f, "walk error: {err}"),
            Error::Csv(err) => write!(f, "csv error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Filters and candidates
////////////////////////////////////////////////////////////////////////////////////////

/// The criteria a file must meet to become a [`Candidate`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Filter {
    /// The required value of the `NBA` path component.
    marker: String,

    /// A substring the file name must contain (matched literally).
    file_match: String,
}

impl Filter {
    /// Creates a new [`Filter`].
    pub fn new(marker: impl Into<String>, file_match: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            file_match: file_match.into(),
        }
    }

    /// Returns whether a candidate passes the filter.
    pub fn matches(&self, candidate: &Candidate) -> bool {
        candidate.nba == self.marker && candidate.file.contains(&self.file_match)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, DEFAULT_FILE_MATCH)
    }
}

/// A discovered QC document and the components of its path.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Candidate {
    /// The full path to the file.
    pub path: String,

    /// The QC outcome the file was sorted under (`passed` or `failed`).
    pub check: String,

    /// The lab id of the facility.
    pub facility: String,

    /// The pipeline generation marker.
    #[serde(rename = "NBA")]
    pub nba: String,

    /// The short name of the run.
    pub shortname: String,

    /// The name of the sample directory.
    pub samplename: String,

    /// The file name.
    pub file: String,
}

impl Candidate {
    /// Splits a path into a [`Candidate`] if it lies exactly [`DEPTH`]
    /// components below `root`.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::discovery::Candidate;
    ///
    /// let candidate = Candidate::from_path(
    ///     "/qc",
    ///     "/qc/passed/wgs_east/NBA2/200622_A00559_0210_AHTFHCDMXX/06sjyvj81/qc.json",
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(candidate.check, "passed");
    /// assert_eq!(candidate.nba, "NBA2");
    /// assert_eq!(candidate.file, "qc.json");
    ///
    /// assert!(Candidate::from_path("/qc", "/qc/passed/wgs_east/qc.json").is_none());
    /// ```
    pub fn from_path(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let relative = path.strip_prefix(root.as_ref()).ok()?;

        let components = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        let [check, facility, nba, shortname, samplename, file]: [String; DEPTH] =
            components.try_into().ok()?;

        Some(Self {
            path: path.to_string_lossy().into_owned(),
            check,
            facility,
            nba,
            shortname,
            samplename,
            file,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Discovery
////////////////////////////////////////////////////////////////////////////////////////

/// Returns whether a file name is hidden.
fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Finds every file below `root` that follows the directory convention and
/// passes `filter`.
///
/// Hidden files are ignored. Candidates are returned in file name order
/// within each directory.
pub fn find(root: impl AsRef<Path>, filter: &Filter) -> Result<Vec<Candidate>> {
    let root = root.as_ref();
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(Error::Walk)?;

        if !entry.file_type().is_file() || is_hidden(entry.file_name()) {
            continue;
        }

        match Candidate::from_path(root, entry.path()) {
            Some(candidate) if filter.matches(&candidate) => {
                debug!("found candidate {}", candidate.path);
                candidates.push(candidate);
            }
            _ => debug!("skipping {}", entry.path().display()),
        }
    }

    Ok(candidates)
}

/// Writes a candidate list as CSV.
pub fn write_csv<W>(writer: W, candidates: &[Candidate]) -> Result<()>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);

    for candidate in candidates {
        writer.serialize(candidate).map_err(Error::Csv)?;
    }

    writer.flush().map_err(Error::Io)
}

/// Reads a candidate list written by [`write_csv()`].
pub fn read_csv<R>(reader: R) -> Result<Vec<Candidate>>
where
    R: Read,
{
    csv::Reader::from_reader(reader)
        .deserialize()
        .collect::<std::result::Result<Vec<Candidate>, _>>()
        .map_err(Error::Csv)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::fs::File;

    use tempdir::TempDir;

    use super::*;

    fn touch(root: &Path, relative: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap())?;
        File::create(path)?;
        Ok(())
    }

    #[test]
    fn it_finds_candidates_by_convention() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let dir = TempDir::new("qcpush")?;
        let root = dir.path();

        touch(root, "passed/wgs_east/NBA2/RUN1/S1/qc.json")?;
        touch(root, "failed/wgs_west/NBA2/RUN2/S2/summary.json")?;
        touch(root, "passed/wgs_east/NBA1/RUN0/S0/qc.json")?;
        touch(root, "passed/wgs_east/NBA2/RUN1/S1/.qc.json")?;
        touch(root, "passed/wgs_east/NBA2/RUN1/S1/qc.txt")?;
        touch(root, "passed/wgs_east/NBA2/RUN1/S1/nested/qc.json")?;
        touch(root, "passed/wgs_east/NBA2/RUN1/qc.json")?;

        let candidates = find(root, &Filter::default())?;
        let names = candidates
            .iter()
            .map(|candidate| (candidate.check.as_str(), candidate.samplename.as_str()))
            .collect::<Vec<_>>();

        assert_eq!(names, [("failed", "S2"), ("passed", "S1")]);
        assert_eq!(candidates[1].facility, "wgs_east");
        assert_eq!(candidates[1].shortname, "RUN1");
        assert!(candidates[1].path.ends_with("S1/qc.json"));

        Ok(())
    }

    #[test]
    fn it_matches_the_file_name_literally() {
        let filter = Filter::default();
        let mut candidate = Candidate::from_path("/r", "/r/a/b/NBA2/c/d/qcxjson").unwrap();
        assert!(!filter.matches(&candidate));

        candidate.file = String::from("qc.json.bak");
        assert!(filter.matches(&candidate));
    }

    #[test]
    fn it_round_trips_a_candidate_list() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let candidates = vec![
            Candidate::from_path("/r", "/r/passed/wgs_east/NBA2/RUN1/S1/qc.json").unwrap(),
            Candidate::from_path("/r", "/r/failed/wgs_west/NBA2/RUN2/S,2/qc.json").unwrap(),
        ];

        let mut buffer = Vec::new();
        write_csv(&mut buffer, &candidates)?;

        let text = String::from_utf8(buffer.clone())?;
        assert!(text.starts_with("path,check,facility,NBA,shortname,samplename,file\n"));

        assert_eq!(read_csv(&buffer[..])?, candidates);

        Ok(())
    }
}
