//! Sample-level QC metrics payloads.

use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::qc::Document;
use crate::qc::Summary;
use crate::qc::EXPERIMENT_RUN;
use crate::qc::EXPERIMENT_SAMPLE;
use crate::reshape::comparison;
use crate::reshape::Error;
use crate::reshape::Result;

/// The separator between the values of a histogram series.
pub const SERIES_SEPARATOR: char = ';';

/// The labels identifying the sample a set of metrics belongs to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Labels {
    /// The sequencing run id.
    #[serde(rename = "seqRunID")]
    seq_run_id: String,

    /// The read type.
    #[serde(rename = "readType")]
    read_type: String,

    /// The pipeline (flow) id.
    #[serde(rename = "pipelineID")]
    pipeline_id: String,

    /// The flowcell id.
    #[serde(rename = "flowcellID")]
    flowcell_id: String,

    /// The flowcell type.
    #[serde(rename = "flowcellType")]
    flowcell_type: String,

    /// The library id.
    #[serde(rename = "libraryID")]
    library_id: String,

    /// The registration id.
    #[serde(rename = "registrationID")]
    registration_id: String,

    /// The lab id.
    #[serde(rename = "labID")]
    lab_id: String,

    /// The subject id.
    #[serde(rename = "subjectID")]
    subject_id: String,

    /// The NGC subject id.
    #[serde(rename = "ngcSubjectID")]
    ngc_subject_id: String,

    /// The protocol id.
    #[serde(rename = "protocolID")]
    protocol_id: String,

    /// The registered sample id.
    #[serde(rename = "sampleID")]
    sample_id: String,

    /// The sample name.
    #[serde(rename = "sampleName")]
    sample_name: String,
}

impl Labels {
    /// Extracts the labels from a document.
    fn try_new(document: &Document) -> Result<Self> {
        let run = |name: &str| -> Result<String> {
            Ok(document.str(&format!("{EXPERIMENT_RUN}/{name}/0"))?.to_string())
        };
        let sample = |name: &str| -> Result<String> {
            Ok(document
                .str(&format!("{EXPERIMENT_SAMPLE}/{name}"))?
                .to_string())
        };

        Ok(Self {
            seq_run_id: run("run_id")?,
            read_type: run("read_type")?,
            pipeline_id: sample("flow_id")?,
            flowcell_id: run("flowcell_id")?,
            flowcell_type: run("flowcell_type")?,
            library_id: sample("library_id")?,
            registration_id: sample("registration_id")?,
            lab_id: sample("lab_id")?,
            subject_id: sample("subject_id")?,
            ngc_subject_id: sample("ngc_subject_id")?,
            protocol_id: sample("protocol_id")?,
            sample_id: sample("registered_sample_id")?,
            sample_name: sample("sample_name")?,
        })
    }

    /// Gets the sample name.
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }
}

/// The QC values of a sample.
///
/// Percentages are reported on a 0–100 scale and counts reported upstream in
/// millions are expanded to absolute counts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QcValues {
    /// The percentage of duplicate reads.
    #[serde(rename = "pctDuplicates")]
    pct_duplicates: f64,

    /// The percentage of bases with a quality of at least 30.
    #[serde(rename = "pctQ30")]
    pct_q30: f64,

    /// The median insert size.
    #[serde(rename = "medianInsertSize")]
    median_insert_size: i64,

    /// The number of mapped reads.
    #[serde(rename = "nReadsMapped")]
    n_reads_mapped: i64,

    /// The mean coverage.
    #[serde(rename = "meanCov")]
    mean_cov: f64,

    /// The standard deviation of the coverage.
    #[serde(rename = "sdCov")]
    sd_cov: f64,

    /// The percentage of the genome covered at least 10x.
    #[serde(rename = "pctCov10x")]
    pct_cov_10x: f64,

    /// The percentage of the genome covered at least 20x.
    #[serde(rename = "pctCov20x")]
    pct_cov_20x: f64,

    /// The percentage of the genome covered at least 30x.
    #[serde(rename = "pctCov30x")]
    pct_cov_30x: f64,

    /// The number of SNPs.
    #[serde(rename = "nSNPsAll")]
    n_snps_all: i64,

    /// The percentage of SNPs that are known.
    #[serde(rename = "pctSNPsKnown")]
    pct_snps_known: f64,

    /// The percentage of SNPs that are novel.
    #[serde(rename = "pctSNPsNovel")]
    pct_snps_novel: f64,

    /// The transition/transversion ratio of all SNPs.
    #[serde(rename = "ratioTiTvAll")]
    ratio_ti_tv_all: f64,

    /// The transition/transversion ratio of known SNPs.
    #[serde(rename = "ratioTiTvKnown")]
    ratio_ti_tv_known: f64,

    /// The transition/transversion ratio of novel SNPs.
    #[serde(rename = "ratioTiTvNovel")]
    ratio_ti_tv_novel: f64,

    /// The heterozygous/homozygous ratio of all SNPs.
    #[serde(rename = "ratioHetHomAll")]
    ratio_het_hom_all: f64,

    /// The heterozygous/homozygous ratio of known SNPs.
    #[serde(rename = "ratioHetHomKnown")]
    ratio_het_hom_known: f64,

    /// The heterozygous/homozygous ratio of novel SNPs.
    #[serde(rename = "ratioHetHomNovel")]
    ratio_het_hom_novel: f64,

    /// The percentage of masked regions.
    #[serde(rename = "pctMskRegions")]
    pct_msk_regions: f64,

    /// The percentage of homozygous sites in masked regions.
    #[serde(rename = "pctMskHomozygousSites")]
    pct_msk_homozygous_sites: f64,

    /// The mean minor allele percentage in masked regions.
    #[serde(rename = "meanPctMskMinorAllele")]
    mean_pct_msk_minor_allele: f64,

    /// Read counts per insert size.
    #[serde(rename = "insertSize")]
    insert_size: Map<String, Value>,

    /// Site counts per alternative allele frequency.
    #[serde(rename = "altFreqAll")]
    alt_freq_all: Map<String, Value>,
}

impl QcValues {
    /// Extracts the QC values from a metrics summary.
    fn try_new(summary: &Summary<'_>) -> Result<Self> {
        Ok(Self {
            pct_duplicates: summary.percent("pct_duplicates")?,
            pct_q30: summary.percent("pct_q30")?,
            median_insert_size: summary.integer("median_insert_size")?,
            n_reads_mapped: summary.millions("m_reads_mapped")?,
            mean_cov: summary.float("mean_coverage")?,
            sd_cov: summary.float("sd_coverage")?,
            pct_cov_10x: summary.percent("pct_10x")?,
            pct_cov_20x: summary.percent("pct_20x")?,
            pct_cov_30x: summary.percent("pct_30x")?,
            n_snps_all: summary.millions("M_nSNPs_all")?,
            pct_snps_known: summary.percent("pct_SNPs_known")?,
            pct_snps_novel: summary.percent("pct_SNPs_novel")?,
            ratio_ti_tv_all: summary.float("tiTvRatio_all")?,
            ratio_ti_tv_known: summary.float("tiTvRatio_known")?,
            ratio_ti_tv_novel: summary.float("tiTvRatio_novel")?,
            ratio_het_hom_all: summary.float("hetHomRatio_all")?,
            ratio_het_hom_known: summary.float("hetHomRatio_known")?,
            ratio_het_hom_novel: summary.float("hetHomRatio_novel")?,
            pct_msk_regions: summary.float("msk_pct_regions")?,
            pct_msk_homozygous_sites: summary.float("msk_pct_homozygous_sites")?,
            mean_pct_msk_minor_allele: summary.percent("msk_meanpct_minorallele")?,
            insert_size: histogram(
                "insertSize",
                &summary.text("insert_size_value")?,
                integer_key,
                &summary.text("insert_size_frequency")?,
            )?,
            alt_freq_all: histogram(
                "altFreqAll",
                &summary.text("alt_freq_all_value")?,
                float_key,
                &summary.text("alt_freq_all_frequency")?,
            )?,
        })
    }
}

/// The sample level of a metrics payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleLevel {
    /// The labels.
    labels: Labels,

    /// The QC values.
    #[serde(rename = "qcValues")]
    qc_values: QcValues,
}

/// A metrics payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metrics {
    /// The sample level.
    #[serde(rename = "sampleLevel")]
    sample_level: SampleLevel,
}

impl Metrics {
    /// Builds the metrics payload of the sample in `document`.
    ///
    /// The document must carry exactly one ID-SNP comparison.
    pub fn try_new(document: &Document) -> Result<Self> {
        comparison(document)?;

        let summary = Summary::try_from(document)?;

        Ok(Self {
            sample_level: SampleLevel {
                labels: Labels::try_new(document)?,
                qc_values: QcValues::try_new(&summary)?,
            },
        })
    }

    /// Gets the labels.
    pub fn labels(&self) -> &Labels {
        &self.sample_level.labels
    }

    /// Gets the QC values.
    pub fn qc_values(&self) -> &QcValues {
        &self.sample_level.qc_values
    }
}

/// Parses an insert size into a histogram key.
fn integer_key(value: &str) -> Option<String> {
    value.parse::<i64>().ok().map(|value| value.to_string())
}

/// Parses an allele frequency into a histogram key.
fn float_key(value: &str) -> Option<String> {
    value
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(|value| value.to_string())
}

/// Zips a `;`-separated series of x values with a series of integer counts.
///
/// Keys are normalized through `key` so that, for example, `"0050"` and
/// `"50"` land in the same bucket. A repeated key keeps its first position and
/// takes the last count.
fn histogram(
    field: &'static str,
    xs: &str,
    key: fn(&str) -> Option<String>,
    ys: &str,
) -> Result<Map<String, Value>> {
    let xs = xs.split(SERIES_SEPARATOR).map(str::trim).collect::<Vec<_>>();
    let ys = ys.split(SERIES_SEPARATOR).map(str::trim).collect::<Vec<_>>();

    if xs.len() != ys.len() {
        return Err(Error::UnequalAxes {
            field,
            x: xs.len(),
            y: ys.len(),
        });
    }

    let invalid = |value: &str| Error::InvalidSeriesValue {
        field,
        value: value.to_string(),
    };

    let mut result = Map::new();

    for (x, y) in xs.into_iter().zip(ys) {
        let x = key(x).ok_or_else(|| invalid(x))?;
        let y = y.parse::<i64>().map_err(|_| invalid(y))?;
        result.insert(x, Value::from(y));
    }

    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::qc::record::tests::document;

    /// Builds a QC document with a full germline metrics summary and a single
    /// ID-SNP comparison.
    pub(crate) fn full_document(sample_name: &str) -> Value {
        let mut value = document("FC1", "wgs_east", "7", "R1", "2022-01-01", sample_name);

        value["germline_full"] = json!({
            "outputs": { "GLN-0001": {} },
            "metrics": { "samples": [{ "QC_summary": {
                "pct_duplicates": 0.07,
                "pct_q30": "0.9123",
                "median_insert_size": 412,
                "m_reads_mapped": "812.3456789",
                "mean_coverage": 31.5,
                "sd_coverage": "8.25",
                "pct_10x": 0.99,
                "pct_20x": 0.97,
                "pct_30x": 0.55,
                "M_nSNPs_all": 4.5678912,
                "pct_SNPs_known": 0.98,
                "pct_SNPs_novel": 0.02,
                "tiTvRatio_all": 2.01,
                "tiTvRatio_known": 2.05,
                "tiTvRatio_novel": 1.5,
                "hetHomRatio_all": 1.6,
                "hetHomRatio_known": 1.55,
                "hetHomRatio_novel": 3.1,
                "msk_pct_regions": 0.5,
                "msk_pct_homozygous_sites": 1.25,
                "msk_meanpct_minorallele": 0.012,
                "insert_size_value": "100;200;300",
                "insert_size_frequency": "5;10;2",
                "alt_freq_all_value": "0.05;0.5;1.0",
                "alt_freq_all_frequency": "12;400;380"
            }}]}
        });

        value["all_idsnp_comparisons"] = json!({
            format!("{sample_name}_vs_{sample_name}-idsnp"): {
                "details": {
                    "all": {
                        "rs1": {
                            "position": ["chr1:1000"],
                            "query.A.count": [10], "query.T.count": [0],
                            "query.G.count": [12], "query.C.count": [0],
                            "query.N.count": [0], "query.gap.count": [0],
                            "target.A.count": [8], "target.T.count": [0],
                            "target.G.count": [9], "target.C.count": [0],
                            "target.N.count": [1], "target.gap.count": [0]
                        },
                        "rs2": {
                            "position": ["chrX:2000"],
                            "query.A.count": [0], "query.T.count": [20],
                            "query.G.count": [0], "query.C.count": [0],
                            "query.N.count": [0], "query.gap.count": [1],
                            "target.A.count": [0], "target.T.count": [15],
                            "target.G.count": [0], "target.C.count": [0],
                            "target.N.count": [0], "target.gap.count": [0]
                        }
                    },
                    "invalid": {},
                    "mismatches": {},
                    "matches": { "rs1": {}, "rs2": {} }
                }
            }
        });

        value
    }

    #[test]
    fn it_builds_a_metrics_payload() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let document = Document::new(full_document("S1"));
        let metrics = Metrics::try_new(&document)?;
        let value = serde_json::to_value(&metrics)?;

        assert_eq!(
            value["sampleLevel"]["labels"],
            json!({
                "seqRunID": "R1",
                "readType": "paired-end",
                "pipelineID": "germline-nba2",
                "flowcellID": "FC1",
                "flowcellType": "S4",
                "libraryID": "S1-lib",
                "registrationID": "S1-registration",
                "labID": "wgs_east",
                "subjectID": "S1-subject",
                "ngcSubjectID": "NGC-S1",
                "protocolID": "WGS_v1",
                "sampleID": "S1-reg",
                "sampleName": "S1"
            })
        );

        let qc = &value["sampleLevel"]["qcValues"];
        assert_eq!(qc["pctDuplicates"], json!(7.0));
        assert_eq!(qc["pctQ30"], json!(91.23));
        assert_eq!(qc["medianInsertSize"], json!(412));
        assert_eq!(qc["nReadsMapped"], json!(812_345_678));
        assert_eq!(qc["meanCov"], json!(31.5));
        assert_eq!(qc["nSNPsAll"], json!(4_567_891));
        assert_eq!(qc["pctSNPsNovel"], json!(2.0));
        assert_eq!(qc["meanPctMskMinorAllele"], json!(1.2));
        assert_eq!(qc["insertSize"], json!({ "100": 5, "200": 10, "300": 2 }));
        assert_eq!(
            qc["altFreqAll"],
            json!({ "0.05": 12, "0.5": 400, "1.0": 380 })
        );

        Ok(())
    }

    #[test]
    fn it_keeps_the_qc_value_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let document = Document::new(full_document("S1"));
        let value = serde_json::to_value(Metrics::try_new(&document)?)?;

        let keys = value["sampleLevel"]["qcValues"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        assert_eq!(keys.first().map(String::as_str), Some("pctDuplicates"));
        assert_eq!(keys.last().map(String::as_str), Some("altFreqAll"));
        assert_eq!(keys.len(), 23);

        Ok(())
    }

    #[test]
    fn it_rejects_unequal_axes() {
        let mut value = full_document("S1");
        value["germline_full"]["metrics"]["samples"][0]["QC_summary"]["insert_size_frequency"] =
            json!("5;10");

        let err = Metrics::try_new(&Document::new(value)).unwrap_err();
        assert!(matches!(
            err,
            Error::UnequalAxes {
                field: "insertSize",
                x: 3,
                y: 2
            }
        ));
    }

    #[test]
    fn it_rejects_non_integer_counts() {
        let err = histogram("insertSize", "1;2", integer_key, "3;x").unwrap_err();
        assert_eq!(err.to_string(), "invalid value in series insertSize: x");
    }

    #[test]
    fn it_requires_a_single_comparison() {
        let mut value = full_document("S1");
        value["all_idsnp_comparisons"] = json!({});

        let err = Metrics::try_new(&Document::new(value)).unwrap_err();
        assert!(matches!(err, Error::ComparisonCount(0)));
    }
}
