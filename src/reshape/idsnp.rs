//! ID-SNP check payloads.
//!
//! The ID-SNP check compares the bases observed at a panel of known SNP sites
//! in the diagnostic sample (the `query`) against those in a separately
//! genotyped ID-SNP sample (the `target`).

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::qc::as_object;
use crate::qc::as_str;
use crate::qc::child;
use crate::qc::Document;
use crate::qc::ParseError;
use crate::qc::EXPERIMENT_SAMPLE;
use crate::reshape::comparison;
use crate::reshape::Error;
use crate::reshape::Result;
use crate::reshape::IDSNP_COMPARISONS;

/// The bases counted at each site, as named in both the QC document (after
/// the `query.`/`target.` prefix) and the payload.
const BASES: [&str; 6] = ["A", "T", "G", "C", "N", "gap"];

/// The characters trimmed from both ends of a site's position.
const CHROMOSOME_PREFIX: &[char] = &['c', 'h', 'r'];

/// The base counts of one sample at one site.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BaseCounts {
    /// The count per base, gaps included.
    #[serde(rename = "baseCounts")]
    base_counts: Map<String, Value>,
}

/// The comparison at one site.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Site {
    /// The dbSNP id of the site.
    #[serde(rename = "rsID")]
    rs_id: String,

    /// The position of the site, without the `chr` prefix.
    loc: String,

    /// The counts of the diagnostic sample.
    #[serde(rename = "diagnosticSample")]
    diagnostic_sample: BaseCounts,

    /// The counts of the ID-SNP sample.
    #[serde(rename = "IDSNPSample")]
    idsnp_sample: BaseCounts,
}

impl Site {
    /// Gets the rs id.
    pub fn rs_id(&self) -> &str {
        &self.rs_id
    }

    /// Gets the location, without any `chr` prefix.
    pub fn loc(&self) -> &str {
        &self.loc
    }
}

/// An ID-SNP check payload.
///
/// # Examples
///
/// ```
/// use qcpush::qc::Document;
/// use qcpush::reshape::idsnp::IdSnpCheck;
///
/// let document = r#"{
///   "metadata": {"experiment_run": {"experiment_samples": [{"idsnp_sample_name": "X1"}]}},
///   "all_idsnp_comparisons": {"S1_vs_X1": {"details": {
///     "all": {"rs42": {
///       "position": ["chr7:117559590"],
///       "query.A.count": [3], "query.T.count": [0], "query.G.count": [0],
///       "query.C.count": [4], "query.N.count": [0], "query.gap.count": [0],
///       "target.A.count": [5], "target.T.count": [0], "target.G.count": [0],
///       "target.C.count": [5], "target.N.count": [0], "target.gap.count": [0]
///     }},
///     "invalid": {}, "mismatches": {}, "matches": {"rs42": {}}
///   }}}
/// }"#
/// .parse::<Document>()?;
///
/// let check = IdSnpCheck::try_new(&document)?;
/// assert_eq!(check.idsnp_sample_name(), "X1");
/// assert_eq!(check.details()[0].loc(), "7:117559590");
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IdSnpCheck {
    /// The name of the ID-SNP sample.
    #[serde(rename = "IDSNPSampleName")]
    idsnp_sample_name: String,

    /// Every compared site.
    details: Vec<Site>,
}

impl IdSnpCheck {
    /// Builds the ID-SNP check payload of the sample in `document`.
    pub fn try_new(document: &Document) -> Result<Self> {
        let idsnp_sample_name = document
            .str(&format!("{EXPERIMENT_SAMPLE}/idsnp_sample_name"))?
            .to_string();

        let pointer = format!("{IDSNP_COMPARISONS}/*/details");
        let details = comparison(document)?
            .get("details")
            .ok_or_else(|| ParseError::Missing(pointer.clone()))?;
        let details = as_object(details, &pointer)?;

        let all = as_object(child(details, &pointer, "all")?, &format!("{pointer}/all"))?;

        let classified = ["invalid", "mismatches", "matches"]
            .into_iter()
            .map(|key| len(child(details, &pointer, key)?, &format!("{pointer}/{key}")))
            .sum::<std::result::Result<usize, ParseError>>()?;

        if all.len() != classified {
            return Err(Error::DetailCounts {
                all: all.len(),
                classified,
            });
        }

        let details = all
            .iter()
            .map(|(rs_id, site)| -> std::result::Result<Site, ParseError> {
                let pointer = format!("{pointer}/all/{rs_id}");
                let site = as_object(site, &pointer)?;

                let position = first(child(site, &pointer, "position")?, &pointer, "position")?;
                let position = as_str(position, &format!("{pointer}/position/0"))?;

                Ok(Site {
                    rs_id: rs_id.clone(),
                    loc: position.trim_matches(CHROMOSOME_PREFIX).to_string(),
                    diagnostic_sample: base_counts(site, &pointer, "query")?,
                    idsnp_sample: base_counts(site, &pointer, "target")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, ParseError>>()?;

        Ok(Self {
            idsnp_sample_name,
            details,
        })
    }

    /// Gets the name of the ID-SNP sample.
    pub fn idsnp_sample_name(&self) -> &str {
        &self.idsnp_sample_name
    }

    /// Gets the per-site comparisons.
    pub fn details(&self) -> &[Site] {
        &self.details
    }
}

/// Gets the number of entries of an array or object.
fn len(value: &Value, pointer: &str) -> std::result::Result<usize, ParseError> {
    match value {
        Value::Array(values) => Ok(values.len()),
        Value::Object(values) => Ok(values.len()),
        _ => Err(ParseError::InvalidType {
            pointer: pointer.to_string(),
            expected: "an array or an object",
        }),
    }
}

/// Gets the first element of the array under `key`.
fn first<'a>(
    value: &'a Value,
    pointer: &str,
    key: &str,
) -> std::result::Result<&'a Value, ParseError> {
    value
        .get(0)
        .ok_or_else(|| ParseError::Missing(format!("{pointer}/{key}/0")))
}

/// Collects the base counts of one side (`query` or `target`) of a site.
fn base_counts(
    site: &Map<String, Value>,
    pointer: &str,
    side: &str,
) -> std::result::Result<BaseCounts, ParseError> {
    let mut base_counts = Map::new();

    for base in BASES {
        let key = format!("{side}.{base}.count");
        let count = first(child(site, pointer, &key)?, pointer, &key)?;
        base_counts.insert(base.to_string(), count.clone());
    }

    Ok(BaseCounts { base_counts })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::reshape::metrics::tests::full_document;

    #[test]
    fn it_builds_an_idsnp_payload() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let document = Document::new(full_document("S1"));
        let check = IdSnpCheck::try_new(&document)?;

        assert_eq!(
            serde_json::to_value(&check)?,
            json!({
                "IDSNPSampleName": "S1-idsnp",
                "details": [
                    {
                        "rsID": "rs1",
                        "loc": "1:1000",
                        "diagnosticSample": { "baseCounts": {
                            "A": 10, "T": 0, "G": 12, "C": 0, "N": 0, "gap": 0
                        }},
                        "IDSNPSample": { "baseCounts": {
                            "A": 8, "T": 0, "G": 9, "C": 0, "N": 1, "gap": 0
                        }}
                    },
                    {
                        "rsID": "rs2",
                        "loc": "X:2000",
                        "diagnosticSample": { "baseCounts": {
                            "A": 0, "T": 20, "G": 0, "C": 0, "N": 0, "gap": 1
                        }},
                        "IDSNPSample": { "baseCounts": {
                            "A": 0, "T": 15, "G": 0, "C": 0, "N": 0, "gap": 0
                        }}
                    }
                ]
            })
        );

        Ok(())
    }

    #[test]
    fn it_rejects_inconsistent_detail_counts() {
        let mut value = full_document("S1");
        value["all_idsnp_comparisons"]["S1_vs_S1-idsnp"]["details"]["mismatches"] =
            json!({ "rs3": {} });

        let err = IdSnpCheck::try_new(&Document::new(value)).unwrap_err();
        assert!(matches!(
            err,
            Error::DetailCounts {
                all: 2,
                classified: 3
            }
        ));
    }

    #[test]
    fn it_reports_missing_base_counts() {
        let mut value = full_document("S1");
        value["all_idsnp_comparisons"]["S1_vs_S1-idsnp"]["details"]["all"]["rs2"]
            .as_object_mut()
            .unwrap()
            .remove("target.gap.count");

        let err = IdSnpCheck::try_new(&Document::new(value)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse error: missing required field: \
             /all_idsnp_comparisons/*/details/all/rs2/target.gap.count"
        );
    }

    #[test]
    fn it_trims_chromosome_characters_from_both_ends() {
        assert_eq!("chr1:1000".trim_matches(CHROMOSOME_PREFIX), "1:1000");
        assert_eq!("chrMT:16000".trim_matches(CHROMOSOME_PREFIX), "MT:16000");
        assert_eq!("1:1000".trim_matches(CHROMOSOME_PREFIX), "1:1000");
    }
}
