//! Analysis patch payloads.

use std::str::FromStr;

use serde::Serialize;

use crate::reshape::Error;

/// The comment attached to analyses pushed from historic QC results.
pub const HISTORIC_COMMENT: &str =
    "Historical data from NBA 2.0. Pushed in relation to first release of SQS.";

/// The submit status set on a patched analysis.
pub const SUBMITTED: &str = "submitted";

/// The evaluation status of an analysis.
///
/// # Examples
///
/// ```
/// use qcpush::reshape::patch::Status;
///
/// assert_eq!("passed".parse::<Status>()?, Status::Approved);
/// assert_eq!("fail".parse::<Status>()?, Status::Failed);
/// assert!("maybe".parse::<Status>().is_err());
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// The analysis passed QC.
    Approved,

    /// The analysis failed QC.
    Failed,
}

impl Status {
    /// Gets the value sent to the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Approved => "approved",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" | "passed" => Ok(Status::Approved),
            "fail" | "failed" => Ok(Status::Failed),
            _ => Err(Error::UnknownCheck(s.to_string())),
        }
    }
}

/// A JSON patch operation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Operation {
    /// The operation.
    op: &'static str,

    /// The patched field.
    path: &'static str,

    /// The new value.
    value: String,
}

/// A patch of a single analysis.
///
/// The API takes a list of patches, so a [`Patch`] serializes as a
/// one-element array.
///
/// # Examples
///
/// ```
/// use qcpush::reshape::patch::Patch;
/// use qcpush::reshape::patch::Status;
///
/// let patch = Patch::historic("A-1", "2023-01-01T00:00:00Z", Status::Failed);
/// let value = serde_json::to_value(&patch)?;
///
/// assert_eq!(value[0]["permID"], "A-1");
/// assert_eq!(value[0]["ops"][0]["value"], "failed");
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Patch {
    /// The perm id of the patched analysis.
    perm_id: String,

    /// The last update time the patch applies to.
    last_update_datetime: String,

    /// The operations.
    operations: Vec<Operation>,
}

impl Patch {
    /// Creates a patch setting the evaluation status of an analysis and
    /// submitting it with a comment.
    pub fn new(
        perm_id: impl Into<String>,
        last_update_datetime: impl Into<String>,
        status: Status,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            perm_id: perm_id.into(),
            last_update_datetime: last_update_datetime.into(),
            operations: vec![
                Operation {
                    op: "replace",
                    path: "/evalStatus",
                    value: status.to_string(),
                },
                Operation {
                    op: "add",
                    path: "/comments",
                    value: comment.into(),
                },
                Operation {
                    op: "replace",
                    path: "/submitStatus",
                    value: String::from(SUBMITTED),
                },
            ],
        }
    }

    /// Creates a patch with the [`HISTORIC_COMMENT`].
    pub fn historic(
        perm_id: impl Into<String>,
        last_update_datetime: impl Into<String>,
        status: Status,
    ) -> Self {
        Self::new(perm_id, last_update_datetime, status, HISTORIC_COMMENT)
    }

    /// Gets the perm id of the patched analysis.
    pub fn perm_id(&self) -> &str {
        &self.perm_id
    }
}

/// The serialized form of a single patch.
#[derive(Serialize)]
struct Entry<'a> {
    /// The perm id of the patched analysis.
    #[serde(rename = "permID")]
    perm_id: &'a str,

    /// The last update time the patch applies to.
    #[serde(rename = "lastUpdateDatetime")]
    last_update_datetime: &'a str,

    /// The operations.
    ops: &'a [Operation],
}

impl Serialize for Patch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq([Entry {
            perm_id: &self.perm_id,
            last_update_datetime: &self.last_update_datetime,
            ops: &self.operations,
        }])
    }
}
