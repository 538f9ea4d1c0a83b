//! Germline QC documents.
//!
//! A QC document is the `summary.json` that the germline QC pipeline writes for
//! every sequenced sample. The document is deeply nested and most of the values
//! that matter are wrapped in single-element arrays, so rather than modelling
//! the whole thing with `serde` we keep the raw [`Value`] around and pull fields
//! out of it by [JSON pointer](https://datatracker.ietf.org/doc/html/rfc6901).
//! Every failed lookup names the pointer it was looking for.

pub mod record;
pub mod summary;

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde_json::Map;
use serde_json::Value;

pub use record::SampleRecord;
pub use summary::Summary;

/// The pointer to the experiment run within a QC document.
pub const EXPERIMENT_RUN: &str = "/metadata/experiment_run";

/// The pointer to the (first and only) experiment sample within a QC document.
pub const EXPERIMENT_SAMPLE: &str = "/metadata/experiment_run/experiment_samples/0";

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error associated with extracting a field from a QC document.
#[derive(Debug)]
pub enum ParseError {
    /// A required field was not present.
    Missing(String),

    /// A field was present but had the wrong shape.
    InvalidType {
        /// The pointer to the field.
        pointer: String,

        /// A description of what was expected.
        expected: &'static str,
    },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Missing(pointer) => write!(f, "missing required field: {pointer}"),
            ParseError::InvalidType { pointer, expected } => {
                write!(f, "invalid value for field {pointer}: expected {expected}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// An error related to loading a [`Document`].
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// The contents were not valid JSON.
    Json(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////////////////////
// Documents
////////////////////////////////////////////////////////////////////////////////////////

/// A raw QC document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document(Value);

impl Document {
    /// Creates a new [`Document`] from an already parsed JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Reads a [`Document`] from a reader.
    ///
    /// # Examples
    ///
    /// ```
    /// let data = br#"{"metadata": {"experiment_run": {"lab_id": ["wgs_east"]}}}"#;
    /// let document = qcpush::qc::Document::from_reader(&data[..])?;
    ///
    /// assert_eq!(document.str("/metadata/experiment_run/lab_id/0")?, "wgs_east");
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_reader<R>(reader: R) -> Result<Self, Error>
    where
        R: Read,
    {
        serde_json::from_reader(reader).map(Self).map_err(Error::Json)
    }

    /// Reads a [`Document`] from a file on disk.
    pub fn from_path<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).map_err(Error::Io)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Gets a reference to the inner JSON value.
    pub fn inner(&self) -> &Value {
        &self.0
    }

    /// Consumes self and returns the inner JSON value.
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Looks up the value at `pointer`.
    pub fn get(&self, pointer: &str) -> Result<&Value, ParseError> {
        self.0
            .pointer(pointer)
            .ok_or_else(|| ParseError::Missing(pointer.to_string()))
    }

    /// Looks up the string at `pointer`.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::qc::Document;
    ///
    /// let document = r#"{"run_id": ["R1"], "run_number": [7]}"#.parse::<Document>()?;
    ///
    /// assert_eq!(document.str("/run_id/0")?, "R1");
    /// assert!(document.str("/run_number/0").is_err());
    /// assert!(document.str("/flowcell_id/0").is_err());
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn str(&self, pointer: &str) -> Result<&str, ParseError> {
        as_str(self.get(pointer)?, pointer)
    }

    /// Looks up the object at `pointer`.
    pub fn object(&self, pointer: &str) -> Result<&Map<String, Value>, ParseError> {
        as_object(self.get(pointer)?, pointer)
    }
}

impl FromStr for Document {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map(Self).map_err(Error::Json)
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Value helpers
////////////////////////////////////////////////////////////////////////////////////////

/// Interprets `value` as a string, reporting `pointer` on failure.
pub(crate) fn as_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, ParseError> {
    value.as_str().ok_or_else(|| ParseError::InvalidType {
        pointer: pointer.to_string(),
        expected: "a string",
    })
}

/// Interprets `value` as an object, reporting `pointer` on failure.
pub(crate) fn as_object<'a>(
    value: &'a Value,
    pointer: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    value.as_object().ok_or_else(|| ParseError::InvalidType {
        pointer: pointer.to_string(),
        expected: "an object",
    })
}

/// Looks up `key` within an object `value` located at `pointer`.
pub(crate) fn child<'a>(
    value: &'a Map<String, Value>,
    pointer: &str,
    key: &str,
) -> Result<&'a Value, ParseError> {
    value
        .get(key)
        .ok_or_else(|| ParseError::Missing(format!("{pointer}/{key}")))
}

/// Gets the textual form of a number or a string.
///
/// QC metrics are written either as JSON numbers or as strings holding a
/// number depending on the pipeline version, so both are accepted.
pub(crate) fn as_text(value: &Value, pointer: &str) -> Result<String, ParseError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ParseError::InvalidType {
            pointer: pointer.to_string(),
            expected: "a number",
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn it_reports_the_pointer_of_a_missing_field() {
        let document = Document::new(json!({ "metadata": {} }));
        let err = document
            .str("/metadata/experiment_run/flowcell_id/0")
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "missing required field: /metadata/experiment_run/flowcell_id/0"
        );
    }

    #[test]
    fn it_reports_fields_with_the_wrong_shape() {
        let document = Document::new(json!({ "lab_id": "wgs_east" }));
        let err = document.str("/lab_id/0").unwrap_err();
        assert!(matches!(err, ParseError::Missing(_)));

        let err = document.object("/lab_id").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for field /lab_id: expected an object"
        );
    }

    #[test]
    fn it_accepts_numbers_and_numeric_strings_as_text() -> Result<(), Box<dyn std::error::Error>>
    {
        assert_eq!(as_text(&json!(0.07), "/x")?, "0.07");
        assert_eq!(as_text(&json!(" 12 "), "/x")?, "12");
        assert!(as_text(&json!([1]), "/x").is_err());
        Ok(())
    }

    #[test]
    fn it_fails_to_parse_invalid_json() {
        let err = "{".parse::<Document>().unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
