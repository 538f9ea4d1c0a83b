//! Condensing fetched analyses into per-pipeline sample summaries.

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;

/// A sample of a pipeline run, as returned by the API.
#[derive(Clone, Debug, Deserialize)]
struct RunSample {
    /// The subject id.
    #[serde(rename = "subjectID")]
    subject_id: String,

    /// The sample name.
    #[serde(rename = "sampleName")]
    sample_name: String,
}

/// A pipeline run, as returned by the API.
#[derive(Clone, Debug, Deserialize)]
struct PipelineRun {
    /// The pipeline id.
    #[serde(rename = "pipelineID")]
    pipeline_id: String,

    /// The samples of the run.
    #[serde(default)]
    samples: Vec<RunSample>,
}

/// The parts of a fetched analysis needed for the summary.
#[derive(Clone, Debug, Deserialize)]
pub struct Analysis {
    /// The evaluation status of the analysis.
    #[serde(rename = "evalStatus")]
    eval_status: Value,

    /// The pipeline runs of the analysis.
    #[serde(rename = "pipelineRuns")]
    pipeline_runs: Vec<PipelineRun>,
}

/// A sample in the summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    /// The subject id.
    #[serde(rename = "subjectID")]
    subject_id: String,

    /// The sample name.
    #[serde(rename = "sampleName")]
    sample_name: String,

    /// Always empty: the API does not return registration ids.
    #[serde(rename = "registrationID")]
    registration_id: String,

    /// The evaluation status of the analysis.
    #[serde(rename = "evalStatus")]
    eval_status: Value,
}

impl Sample {
    /// Gets the sample name.
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }
}

/// The samples of one pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pipeline {
    /// The pipeline id.
    #[serde(rename = "pipelineID")]
    pipeline_id: String,

    /// The samples of the run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    samples: Vec<Sample>,
}

impl Pipeline {
    /// Gets the pipeline id.
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Gets the samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// A per-pipeline summary of an analysis, serialized as an object keyed by
/// pipeline id.
///
/// # Examples
///
/// ```
/// use qcpush::reshape::filter::Analysis;
/// use qcpush::reshape::filter::Summary;
///
/// let analysis: Analysis = serde_json::from_str(r#"{
///     "permID": "A-1",
///     "evalStatus": "approved",
///     "pipelineRuns": [{"pipelineID": "P-1", "samples": [
///         {"subjectID": "103719193860", "sampleName": "06sjyvj81", "sampleID": "x"}
///     ]}]
/// }"#)?;
///
/// let summary = Summary::from(&analysis);
/// assert_eq!(summary.pipelines()[0].samples()[0].sample_name(), "06sjyvj81");
///
/// let json = serde_json::to_string(&summary)?;
/// assert_eq!(json, r#"{"P-1":{"pipelineID":"P-1","samples":[{"subjectID":"103719193860","sampleName":"06sjyvj81","registrationID":"","evalStatus":"approved"}]}}"#);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    /// The pipelines in order of first appearance.
    pipelines: Vec<Pipeline>,
}

impl Summary {
    /// Gets the pipelines in order of first appearance.
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }
}

impl From<&Analysis> for Summary {
    /// Runs sharing a pipeline id are merged into one entry.
    fn from(analysis: &Analysis) -> Self {
        let mut pipelines: Vec<Pipeline> = Vec::new();

        for run in &analysis.pipeline_runs {
            let i = match pipelines
                .iter()
                .position(|pipeline| pipeline.pipeline_id == run.pipeline_id)
            {
                Some(i) => i,
                None => {
                    pipelines.push(Pipeline {
                        pipeline_id: run.pipeline_id.clone(),
                        samples: Vec::new(),
                    });
                    pipelines.len() - 1
                }
            };

            pipelines[i]
                .samples
                .extend(run.samples.iter().map(|sample| Sample {
                    subject_id: sample.subject_id.clone(),
                    sample_name: sample.sample_name.clone(),
                    registration_id: String::new(),
                    eval_status: analysis.eval_status.clone(),
                }));
        }

        Self { pipelines }
    }
}

impl Serialize for Summary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(
            self.pipelines
                .iter()
                .map(|pipeline| (&pipeline.pipeline_id, pipeline)),
        )
    }
}
