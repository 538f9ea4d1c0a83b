//! Per-sample QC records.

use crate::qc::Document;
use crate::qc::ParseError;
use crate::qc::EXPERIMENT_RUN;
use crate::qc::EXPERIMENT_SAMPLE;

/// The identifying fields of a single sample's QC document.
///
/// A record is extracted once per QC document and folded into a
/// [flowcell group](crate::flowcell::Group) by the
/// [`Aggregator`](crate::flowcell::Aggregator).
///
/// # Examples
///
/// ```
/// use qcpush::qc::Document;
/// use qcpush::qc::SampleRecord;
///
/// let document = r#"{
///   "metadata": {
///     "experiment_run": {
///       "flowcell_id": ["HTFHCDMXX"],
///       "lab_id": ["wgs_east"],
///       "run_number": ["210"],
///       "instrument_serial_nr": ["A00559"],
///       "run_id": ["200622_A00559_0210_AHTFHCDMXX"],
///       "start_time": ["2020-06-22T10:14:00"],
///       "experiment_samples": [{
///         "sample_id": "17RKG002918-01",
///         "sample_name": "06sjyvj81",
///         "subject_id": "103719193860",
///         "ngc_subject_id": "NGC000123",
///         "registration_id": "RHGM00111"
///       }]
///     }
///   }
/// }"#
/// .parse::<Document>()?;
///
/// let record = SampleRecord::try_from(&document)?;
/// assert_eq!(record.flowcell_id(), "HTFHCDMXX");
/// assert_eq!(record.start_time(), "2020-06-22T10:14:00");
/// assert_eq!(record.sample_name(), "06sjyvj81");
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SampleRecord {
    /// The flowcell id.
    flowcell_id: String,

    /// The lab (facility) id.
    lab_id: String,

    /// The instrument run number of the flowcell.
    run_number: String,

    /// The serial number of the sequencing instrument.
    instrument_serial_nr: String,

    /// The sequencing run id.
    seq_run_id: String,

    /// The start time of the run: either a date or a date-time.
    start_time: String,

    /// The sample id.
    sample_id: String,

    /// The sample name.
    sample_name: String,

    /// The subject id.
    subject_id: String,

    /// The NGC subject id.
    ngc_subject_id: String,

    /// The registration id.
    registration_id: String,
}

impl SampleRecord {
    /// Gets the flowcell id.
    pub fn flowcell_id(&self) -> &str {
        &self.flowcell_id
    }

    /// Gets the lab id.
    pub fn lab_id(&self) -> &str {
        &self.lab_id
    }

    /// Gets the run number (reported upstream as the flowcell number).
    pub fn run_number(&self) -> &str {
        &self.run_number
    }

    /// Gets the instrument serial number.
    pub fn instrument_serial_nr(&self) -> &str {
        &self.instrument_serial_nr
    }

    /// Gets the sequencing run id.
    pub fn seq_run_id(&self) -> &str {
        &self.seq_run_id
    }

    /// Gets the raw start time.
    pub fn start_time(&self) -> &str {
        &self.start_time
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

    /// Gets the NGC subject id.
    pub fn ngc_subject_id(&self) -> &str {
        &self.ngc_subject_id
    }

    /// Gets the registration id.
    pub fn registration_id(&self) -> &str {
        &self.registration_id
    }
}

/// Reads the first element of an experiment run field.
fn run_field(document: &Document, field: &str) -> Result<String, ParseError> {
    document
        .str(&format!("{EXPERIMENT_RUN}/{field}/0"))
        .map(String::from)
}

/// Reads a field of the experiment sample.
fn sample_field(document: &Document, field: &str) -> Result<String, ParseError> {
    document
        .str(&format!("{EXPERIMENT_SAMPLE}/{field}"))
        .map(String::from)
}

impl TryFrom<&Document> for SampleRecord {
    type Error = ParseError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        Ok(Self {
            flowcell_id: run_field(document, "flowcell_id")?,
            lab_id: run_field(document, "lab_id")?,
            run_number: run_field(document, "run_number")?,
            instrument_serial_nr: run_field(document, "instrument_serial_nr")?,
            seq_run_id: run_field(document, "run_id")?,
            start_time: run_field(document, "start_time")?,
            sample_id: sample_field(document, "sample_id")?,
            sample_name: sample_field(document, "sample_name")?,
            subject_id: sample_field(document, "subject_id")?,
            ngc_subject_id: sample_field(document, "ngc_subject_id")?,
            registration_id: sample_field(document, "registration_id")?,
        })
    }
}
