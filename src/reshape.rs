//! Reshaping of QC documents into Aero API payloads.
//!
//! Each submodule builds one payload from a single sample's [`Document`]:
//!
//! - [`analysis`] registers the sample as an analysis.
//! - [`metrics`] carries the germline QC values of the analysis.
//! - [`idsnp`] carries the per-site ID-SNP base counts of the analysis.
//! - [`patch`] sets the evaluation status of a registered analysis.
//!
//! [`filter`] goes the other way and condenses an analysis fetched back from
//! the API into a per-pipeline sample summary.

pub mod analysis;
pub mod filter;
pub mod idsnp;
pub mod metrics;
pub mod patch;

use serde_json::Value;

use crate::qc::as_object;
use crate::qc::Document;
use crate::qc::ParseError;

/// The pointer to the ID-SNP comparisons of a QC document.
pub const IDSNP_COMPARISONS: &str = "/all_idsnp_comparisons";

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to reshaping a QC document.
#[derive(Debug)]
pub enum Error {
    /// A field could not be extracted from the document.
    Parse(ParseError),

    /// A `;`-separated series held a value of the wrong type.
    InvalidSeriesValue {
        /// The metric holding the series.
        field: &'static str,

        /// The offending value.
        value: String,
    },

    /// The x and y series of a histogram had different lengths.
    UnequalAxes {
        /// The histogram being built.
        field: &'static str,

        /// The number of x values.
        x: usize,

        /// The number of y values.
        y: usize,
    },

    /// The document did not hold exactly one ID-SNP comparison.
    ComparisonCount(usize),

    /// The ID-SNP sites did not add up to the total number of sites.
    DetailCounts {
        /// The number of sites in `all`.
        all: usize,

        /// The summed number of invalid, mismatching and matching sites.
        classified: usize,
    },

    /// A QC check was neither a pass nor a fail.
    UnknownCheck(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "parse error: {err}"),
            Error::InvalidSeriesValue { field, value } => {
                write!(f, "invalid value in series {field}: {value}")
            }
            Error::UnequalAxes { field, x, y } => write!(
                f,
                "unequal number of items in x-axis and y-axis of {field}: {x} vs {y}"
            ),
            Error::ComparisonCount(count) => write!(
                f,
                "expected exactly one ID-SNP comparison, found {count}"
            ),
            Error::DetailCounts { all, classified } => write!(
                f,
                "ID-SNP details list {all} sites but {classified} are classified"
            ),
            Error::UnknownCheck(check) => write!(f, "unknown QC check: {check}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

/// A [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Shared lookups
////////////////////////////////////////////////////////////////////////////////////////

/// Gets the single ID-SNP comparison of a document.
pub(crate) fn comparison(document: &Document) -> Result<&Value> {
    let comparisons = as_object(document.get(IDSNP_COMPARISONS)?, IDSNP_COMPARISONS)?;

    let mut values = comparisons.values();
    match (values.next(), comparisons.len()) {
        (Some(comparison), 1) => Ok(comparison),
        (_, count) => Err(Error::ComparisonCount(count)),
    }
}
