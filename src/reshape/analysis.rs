//! Analysis registration payloads.

use serde::Serialize;

use crate::qc::Document;
use crate::qc::EXPERIMENT_SAMPLE;
use crate::reshape::Result;

/// The analysis type of a germline analysis.
pub const GERMLINE_ANALYSIS_TYPE: &str = "00000000-e186-4e86-85eb-55145dc0333d";

/// The pipeline of the germline NBA-2 pipeline.
pub const GERMLINE_NBA2_PIPELINE: &str = "11111111-af39-4e13-bbc9-6d45cf802945";

/// The registry ids an analysis is registered under.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pipeline {
    /// The analysis type perm id.
    analysis_type_perm_id: String,

    /// The pipeline perm id.
    pipeline_perm_id: String,
}

impl Pipeline {
    /// Creates a new [`Pipeline`].
    pub fn new(
        analysis_type_perm_id: impl Into<String>,
        pipeline_perm_id: impl Into<String>,
    ) -> Self {
        Self {
            analysis_type_perm_id: analysis_type_perm_id.into(),
            pipeline_perm_id: pipeline_perm_id.into(),
        }
    }

    /// Gets the analysis type perm id.
    pub fn analysis_type_perm_id(&self) -> &str {
        &self.analysis_type_perm_id
    }

    /// Gets the pipeline perm id.
    pub fn pipeline_perm_id(&self) -> &str {
        &self.pipeline_perm_id
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(GERMLINE_ANALYSIS_TYPE, GERMLINE_NBA2_PIPELINE)
    }
}

/// A sample of a pipeline run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Sample {
    /// The subject id.
    #[serde(rename = "subjectID")]
    subject_id: String,

    /// The sample id.
    #[serde(rename = "sampleID")]
    sample_id: String,

    /// The sample name.
    #[serde(rename = "sampleName")]
    sample_name: String,
}

/// A pipeline run of an analysis.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PipelineRun {
    /// The pipeline perm id.
    #[serde(rename = "pipelinePermID")]
    pipeline_perm_id: String,

    /// The samples the run analysed.
    samples: Vec<Sample>,
}

/// An analysis registration.
///
/// # Examples
///
/// ```
/// use qcpush::qc::Document;
/// use qcpush::reshape::analysis::Pipeline;
/// use qcpush::reshape::analysis::Registration;
///
/// let document = r#"{"metadata": {"experiment_run": {"experiment_samples": [{
///     "sample_id": "17RKG002918-01", "sample_name": "06sjyvj81", "subject_id": "103719193860"
/// }]}}}"#
/// .parse::<Document>()?;
///
/// let registration = Registration::try_new(&document, &Pipeline::default())?;
/// assert_eq!(registration.analysis_name(), "06sjyvj81");
///
/// let json = serde_json::to_string(&registration)?;
/// assert!(json.starts_with(r#"{"analysisName":"06sjyvj81","analysisTypePermID":"#));
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Registration {
    /// The analysis name, which is the sample name.
    #[serde(rename = "analysisName")]
    analysis_name: String,

    /// The analysis type perm id.
    #[serde(rename = "analysisTypePermID")]
    analysis_type_perm_id: String,

    /// The pipeline runs, always exactly one.
    #[serde(rename = "pipelineRuns")]
    pipeline_runs: Vec<PipelineRun>,
}

impl Registration {
    /// Builds the registration of the sample in `document`.
    pub fn try_new(document: &Document, pipeline: &Pipeline) -> Result<Self> {
        let field = |name: &str| -> Result<String> {
            Ok(document
                .str(&format!("{EXPERIMENT_SAMPLE}/{name}"))?
                .to_string())
        };

        let sample_name = field("sample_name")?;

        Ok(Self {
            analysis_name: sample_name.clone(),
            analysis_type_perm_id: pipeline.analysis_type_perm_id().to_string(),
            pipeline_runs: vec![PipelineRun {
                pipeline_perm_id: pipeline.pipeline_perm_id().to_string(),
                samples: vec![Sample {
                    subject_id: field("subject_id")?,
                    sample_id: field("sample_id")?,
                    sample_name,
                }],
            }],
        })
    }

    /// Gets the analysis name (the sample name).
    pub fn analysis_name(&self) -> &str {
        &self.analysis_name
    }
}
