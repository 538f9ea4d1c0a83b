//! Flowcell registrations.
//!
//! Flowcells are registered with the Aero API once per (flowcell, lab) pair,
//! listing every sample that was sequenced on them. The QC pipeline, on the
//! other hand, writes one document per sample. This module groups those
//! per-sample documents back into flowcells: see [`Aggregator`] for the rules
//! and [`aggregate()`] for the batch entry point.

pub mod aggregator;

use std::path::Path;
use std::path::PathBuf;

use nonempty::NonEmpty;
use serde::Serialize;
use serde::Serializer;

use crate::qc;
use crate::qc::Document;
use crate::qc::SampleRecord;

pub use aggregator::Aggregator;
pub use aggregator::ConsistencyError;

/// The length of a date-only start time (`YYYY-MM-DD`).
pub const DATE_LENGTH: usize = 10;

/// The separator between the flowcell id and the lab id in a serialized
/// [`Key`].
pub const KEY_SEPARATOR: char = '-';

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to aggregating a batch of QC documents.
#[derive(Debug)]
pub enum Error {
    /// A QC document could not be loaded.
    Load(PathBuf, qc::Error),

    /// A QC document was missing a field or had a malformed one.
    Parse(PathBuf, qc::ParseError),

    /// A QC document disagreed with a previously ingested one.
    Consistency(ConsistencyError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Load(path, err) => write!(f, "loading {}: {err}", path.display()),
            Error::Parse(path, err) => write!(f, "parsing {}: {err}", path.display()),
            Error::Consistency(err) => write!(f, "consistency error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Keys and date formats
////////////////////////////////////////////////////////////////////////////////////////

/// The identity of a flowcell registration.
///
/// The registration is keyed by both the flowcell and the lab because the
/// same flowcell id may legitimately show up at more than one facility. The
/// key is kept as two fields and only joined with [`KEY_SEPARATOR`] when
/// displayed, so ids containing the separator never collide.
///
/// # Examples
///
/// ```
/// use qcpush::flowcell::Key;
///
/// let key = Key::new("FC1", "wgs-east");
/// assert_eq!(key.to_string(), "FC1-wgs-east");
/// assert_ne!(key, Key::new("FC1-wgs", "east"));
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Key {
    /// The flowcell id.
    flowcell_id: String,

    /// The lab id.
    lab_id: String,
}

impl Key {
    /// Creates a new [`Key`].
    pub fn new(flowcell_id: impl Into<String>, lab_id: impl Into<String>) -> Self {
        Self {
            flowcell_id: flowcell_id.into(),
            lab_id: lab_id.into(),
        }
    }

    /// Gets the flowcell id.
    pub fn flowcell_id(&self) -> &str {
        &self.flowcell_id
    }

    /// Gets the lab id.
    pub fn lab_id(&self) -> &str {
        &self.lab_id
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.flowcell_id, self.lab_id)
    }
}

impl From<&SampleRecord> for Key {
    fn from(record: &SampleRecord) -> Self {
        Self::new(record.flowcell_id(), record.lab_id())
    }
}

/// The format of a run's start time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DateFormat {
    /// A date only, such as `2022-06-20`.
    Date,

    /// A date and a time, such as `2022-06-20T10:00:00`.
    DateTime,
}

impl DateFormat {
    /// Classifies a start time by its length: anything longer than
    /// [`DATE_LENGTH`] characters is a date-time.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::flowcell::DateFormat;
    ///
    /// assert_eq!(DateFormat::classify("2022-06-20"), DateFormat::Date);
    /// assert_eq!(DateFormat::classify("2022-06-20T10:00:00"), DateFormat::DateTime);
    /// ```
    pub fn classify(start_time: &str) -> Self {
        if start_time.chars().count() > DATE_LENGTH {
            DateFormat::DateTime
        } else {
            DateFormat::Date
        }
    }

    /// Gets the sequencing run date for a start time in this format.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::flowcell::DateFormat;
    ///
    /// assert_eq!(DateFormat::DateTime.seq_run_date("2022-06-20T10:00:00"), "2022-06-20");
    /// assert_eq!(DateFormat::Date.seq_run_date("2022-06-20"), "2022-06-20");
    /// ```
    pub fn seq_run_date<'a>(&self, start_time: &'a str) -> &'a str {
        match self {
            DateFormat::Date => start_time,
            DateFormat::DateTime => match start_time.char_indices().nth(DATE_LENGTH) {
                Some((end, _)) => &start_time[..end],
                None => start_time,
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Groups
////////////////////////////////////////////////////////////////////////////////////////

/// A sample within a flowcell registration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Sample {
    /// The NGC subject id.
    #[serde(rename = "ngcSubjectID")]
    ngc_subject_id: String,

    /// The sample id.
    #[serde(rename = "sampleID")]
    sample_id: String,

    /// The sample name.
    #[serde(rename = "sampleName")]
    sample_name: String,

    /// The subject id.
    #[serde(rename = "subjectID")]
    subject_id: String,

    /// The registration ids.
    #[serde(rename = "registrationIDs")]
    registration_ids: Vec<String>,
}

impl Sample {
    /// Gets the NGC subject id.
    pub fn ngc_subject_id(&self) -> &str {
        &self.ngc_subject_id
    }

    /// Gets the sample id.
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    /// Gets the sample name.
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    /// Gets the subject id.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Gets the registration ids.
    pub fn registration_ids(&self) -> &[String] {
        &self.registration_ids
    }
}

impl From<&SampleRecord> for Sample {
    fn from(record: &SampleRecord) -> Self {
        Self {
            ngc_subject_id: record.ngc_subject_id().to_string(),
            sample_id: record.sample_id().to_string(),
            sample_name: record.sample_name().to_string(),
            subject_id: record.subject_id().to_string(),
            registration_ids: vec![record.registration_id().to_string()],
        }
    }
}

/// A flowcell registration with all of its samples.
///
/// A group is only ever created together with its first sample, so it is
/// never empty.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Group {
    /// The flowcell id.
    #[serde(rename = "flowcellID")]
    flowcell_id: String,

    /// The flowcell number (the instrument's run number).
    #[serde(rename = "flowcellNr")]
    flowcell_nr: String,

    /// The serial number of the sequencing instrument.
    #[serde(rename = "machineSerialNr")]
    machine_serial_nr: String,

    /// The sequencing run id.
    #[serde(rename = "seqRunID")]
    seq_run_id: String,

    /// The sequencing run date (date only).
    #[serde(rename = "seqRunDate")]
    seq_run_date: String,

    /// The samples in order of first encounter.
    #[serde(serialize_with = "serialize_samples")]
    samples: NonEmpty<Sample>,
}

impl Group {
    /// Creates a new [`Group`] from the first record seen for a flowcell.
    pub(crate) fn new(record: &SampleRecord, format: DateFormat) -> Self {
        Self {
            flowcell_id: record.flowcell_id().to_string(),
            flowcell_nr: record.run_number().to_string(),
            machine_serial_nr: record.instrument_serial_nr().to_string(),
            seq_run_id: record.seq_run_id().to_string(),
            seq_run_date: format.seq_run_date(record.start_time()).to_string(),
            samples: NonEmpty::new(Sample::from(record)),
        }
    }

    /// Gets the flowcell id.
    pub fn flowcell_id(&self) -> &str {
        &self.flowcell_id
    }

    /// Gets the flowcell number.
    pub fn flowcell_nr(&self) -> &str {
        &self.flowcell_nr
    }

    /// Gets the machine serial number.
    pub fn machine_serial_nr(&self) -> &str {
        &self.machine_serial_nr
    }

    /// Gets the sequencing run id.
    pub fn seq_run_id(&self) -> &str {
        &self.seq_run_id
    }

    /// Gets the sequencing run date.
    pub fn seq_run_date(&self) -> &str {
        &self.seq_run_date
    }

    /// Gets the samples.
    pub fn samples(&self) -> &NonEmpty<Sample> {
        &self.samples
    }

    /// Appends a sample.
    pub(crate) fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }
}

/// Serializes the non-empty sample list as a plain JSON array.
fn serialize_samples<S>(samples: &NonEmpty<Sample>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(samples.iter())
}

/// The finalized flowcell registrations, in order of first encounter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Groups(Vec<(Key, Group)>);

impl Groups {
    /// Gets the number of flowcell registrations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether there are no flowcell registrations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gets the registration for a key.
    pub fn get(&self, key: &Key) -> Option<&Group> {
        self.0
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, group)| group)
    }

    /// Returns an iterator over the keys and their registrations.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Group)> {
        self.0.iter().map(|(key, group)| (key, group))
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.iter().map(|(key, _)| key)
    }
}

impl From<Vec<(Key, Group)>> for Groups {
    fn from(groups: Vec<(Key, Group)>) -> Self {
        Self(groups)
    }
}

impl IntoIterator for Groups {
    type Item = (Key, Group);
    type IntoIter = std::vec::IntoIter<(Key, Group)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Batch aggregation
////////////////////////////////////////////////////////////////////////////////////////

/// Aggregates a batch of already loaded QC documents into flowcell
/// registrations.
///
/// The batch is aborted on the first document that is missing a field or that
/// disagrees with a previously ingested document for the same flowcell.
///
/// # Examples
///
/// ```
/// use qcpush::flowcell;
/// use qcpush::qc::Document;
///
/// let template = r#"{"metadata": {"experiment_run": {
///     "flowcell_id": ["FC1"], "lab_id": ["wgs-east"], "run_number": ["7"],
///     "instrument_serial_nr": ["A00559"], "run_id": ["R1"], "start_time": ["2022-01-01"],
///     "experiment_samples": [{"sample_id": "ID", "sample_name": "NAME", "subject_id": "SUB",
///         "ngc_subject_id": "NGC", "registration_id": "REG"}]}}}"#;
///
/// let documents = ["S1", "S2"]
///     .into_iter()
///     .map(|name| {
///         let document = template.replace("NAME", name).parse::<Document>()?;
///         Ok((format!("{name}/summary.json"), document))
///     })
///     .collect::<Result<Vec<_>, qcpush::qc::Error>>()?;
///
/// let groups = flowcell::aggregate(documents)?;
/// assert_eq!(groups.len(), 1);
///
/// let (key, group) = groups.iter().next().unwrap();
/// assert_eq!(key.to_string(), "FC1-wgs-east");
/// assert_eq!(group.samples().len(), 2);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn aggregate<I, P>(documents: I) -> Result<Groups>
where
    I: IntoIterator<Item = (P, Document)>,
    P: AsRef<Path>,
{
    let mut aggregator = Aggregator::default();

    for (path, document) in documents {
        let path = path.as_ref();
        let record = SampleRecord::try_from(&document)
            .map_err(|err| Error::Parse(path.to_path_buf(), err))?;

        aggregator
            .ingest(path, &record)
            .map_err(Error::Consistency)?;
    }

    Ok(aggregator.finalize())
}

/// Loads QC documents from disk and aggregates them with [`aggregate()`].
///
/// Documents are loaded lazily, so loading stops at the first failure.
pub fn aggregate_paths<I, P>(paths: I) -> Result<Groups>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut aggregator = Aggregator::default();

    for path in paths {
        let path = path.as_ref();
        let document =
            Document::from_path(path).map_err(|err| Error::Load(path.to_path_buf(), err))?;
        let record = SampleRecord::try_from(&document)
            .map_err(|err| Error::Parse(path.to_path_buf(), err))?;

        aggregator
            .ingest(path, &record)
            .map_err(Error::Consistency)?;
    }

    Ok(aggregator.finalize())
}
