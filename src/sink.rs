//! Destinations for reshaped payloads.
//!
//! Payloads are either sent to the Aero API ([`Aero`]) or, for dry runs and
//! testing, saved as pretty-printed JSON files in a directory
//! ([`Directory`]).

use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::aero;
use crate::aero::Client;
use crate::facility::Facility;
use crate::flowcell::Group;
use crate::flowcell::Key;
use crate::qc::Document;
use crate::qc::EXPERIMENT_RUN;
use crate::reshape;
use crate::reshape::analysis::Pipeline;
use crate::reshape::analysis::Registration;
use crate::reshape::idsnp::IdSnpCheck;
use crate::reshape::metrics::Metrics;
use crate::reshape::patch::Patch;
use crate::reshape::patch::Status;
use crate::reshape::patch::HISTORIC_COMMENT;

/// The destination that selects the Aero API.
pub const SEND: &str = "send";

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to delivering payloads.
#[derive(Debug)]
pub enum Error {
    /// An I/O error while writing a file.
    Io(PathBuf, io::Error),

    /// A payload could not be serialized.
    Json(PathBuf, serde_json::Error),

    /// The API rejected a payload.
    Aero(aero::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(path, err) => write!(f, "writing {}: {err}", path.display()),
            Error::Json(path, err) => write!(f, "serializing {}: {err}", path.display()),
            Error::Aero(err) => write!(f, "aero error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<aero::Error> for Error {
    fn from(err: aero::Error) -> Self {
        Error::Aero(err)
    }
}

/// A [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Destinations and payloads
////////////////////////////////////////////////////////////////////////////////////////

/// Where payloads go.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
///
/// use qcpush::sink::Destination;
///
/// assert_eq!("send".parse::<Destination>()?, Destination::Send);
/// assert_eq!(
///     "out/dry-run".parse::<Destination>()?,
///     Destination::Save(PathBuf::from("out/dry-run"))
/// );
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Destination {
    /// Send payloads to the Aero API.
    Send,

    /// Save payloads as files in a directory.
    Save(PathBuf),
}

impl FromStr for Destination {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == SEND {
            Ok(Destination::Send)
        } else {
            Ok(Destination::Save(PathBuf::from(s)))
        }
    }
}

/// Every payload pushed for a single sample.
#[derive(Clone, Debug)]
pub struct SamplePayloads {
    /// The facility the sample was sequenced at.
    pub facility: Facility,

    /// The sample name.
    pub sample_name: String,

    /// The analysis registration.
    pub registration: Registration,

    /// The QC metrics.
    pub metrics: Metrics,

    /// The ID-SNP check.
    pub idsnp: IdSnpCheck,

    /// The evaluation status to patch the analysis with.
    pub status: Status,
}

impl SamplePayloads {
    /// Reshapes a sample's document into its payloads.
    ///
    /// `check` is the QC outcome the document was sorted under; it is
    /// validated before anything else is built.
    pub fn try_new(document: &Document, check: &str, pipeline: &Pipeline) -> reshape::Result<Self> {
        let status = check.parse::<Status>()?;
        let lab_id = document.str(&format!("{EXPERIMENT_RUN}/lab_id/0"))?;
        let registration = Registration::try_new(document, pipeline)?;

        Ok(Self {
            facility: Facility::from_lab_id(lab_id),
            sample_name: registration.analysis_name().to_string(),
            registration,
            metrics: Metrics::try_new(document)?,
            idsnp: IdSnpCheck::try_new(document)?,
            status,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Sinks
////////////////////////////////////////////////////////////////////////////////////////

/// A destination for reshaped payloads.
pub trait Sink {
    /// Delivers a flowcell registration.
    fn flowcell(&mut self, key: &Key, group: &Group) -> Result<()>;

    /// Delivers the payloads of a sample.
    fn sample(&mut self, payloads: &SamplePayloads) -> Result<()>;
}

/// Saves payloads as JSON files in a directory.
#[derive(Clone, Debug)]
pub struct Directory {
    /// The directory files are written to.
    root: PathBuf,
}

impl Directory {
    /// Creates a new [`Directory`] sink. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Gets the directory files are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `payload` as pretty JSON to `name` within the directory.
    fn write<T>(&self, name: &str, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let path = self.root.join(name);
        let file = File::create(&path).map_err(|err| Error::Io(path.clone(), err))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, payload)
            .map_err(|err| Error::Json(path.clone(), err))?;
        writer.flush().map_err(|err| Error::Io(path.clone(), err))?;

        info!("wrote {}", path.display());
        Ok(())
    }
}

impl Sink for Directory {
    fn flowcell(&mut self, key: &Key, group: &Group) -> Result<()> {
        self.write(&format!("flowcellReg_{key}.json"), group)
    }

    /// The patch is written without a perm id or update time, as neither
    /// exists before the analysis is registered.
    fn sample(&mut self, payloads: &SamplePayloads) -> Result<()> {
        let name = &payloads.sample_name;

        self.write(&format!("analysis_{name}.json"), &payloads.registration)?;
        self.write(&format!("metrics_{name}.json"), &payloads.metrics)?;
        self.write(&format!("idsnp_{name}.json"), &payloads.idsnp)?;
        self.write(
            &format!("patchAnalysis_{name}.json"),
            &Patch::historic("", "", payloads.status),
        )
    }
}

/// Sends payloads to the Aero API.
#[derive(Debug)]
pub struct Aero {
    /// The API client.
    client: Client,

    /// The registry ids analyses are registered under.
    pipeline: Pipeline,

    /// The comment analyses are patched with.
    comment: String,
}

impl Aero {
    /// Creates a new [`Aero`] sink that patches analyses with the
    /// [`HISTORIC_COMMENT`].
    pub fn new(client: Client, pipeline: Pipeline) -> Self {
        Self {
            client,
            pipeline,
            comment: String::from(HISTORIC_COMMENT),
        }
    }

    /// Sets the comment analyses are patched with.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

impl Sink for Aero {
    fn flowcell(&mut self, key: &Key, group: &Group) -> Result<()> {
        let facility = Facility::from(key);
        info!("registering flowcell {key} with {facility}");
        self.client.register_flowcell(&facility, group)?;
        Ok(())
    }

    /// Registers the analysis, attaches its metrics and ID-SNP check and
    /// finally patches its evaluation status.
    fn sample(&mut self, payloads: &SamplePayloads) -> Result<()> {
        let facility = &payloads.facility;

        info!(
            "registering analysis {} with {facility}",
            payloads.sample_name
        );
        let registered = self
            .client
            .register_analysis(facility, &payloads.registration)?;

        self.client
            .post_metrics(facility, &registered, &self.pipeline, &payloads.metrics)?;
        self.client
            .post_idsnp(facility, registered.perm_id(), &payloads.idsnp)?;

        let last_update = self
            .client
            .last_update_datetime(facility, registered.perm_id())?;
        let patch = Patch::new(
            registered.perm_id(),
            last_update,
            payloads.status,
            self.comment.as_str(),
        );
        self.client.patch_analyses(facility, &patch)?;

        info!(
            "analysis {} registered as {} ({})",
            payloads.sample_name,
            registered.perm_id(),
            payloads.status
        );

        Ok(())
    }
}
