//! Condensing hap.py benchmark summaries into a single result row.
//!
//! hap.py compares a sample's variant calls against a Genome in a Bottle
//! (GiaB) truth set and writes one summary line per variant type and filter.
//! A [`Row`] joins the `ALL`-filter recall, precision and F1 score for SNPs
//! and indels with the coverage metrics from the sample's QC document.

use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;

use chrono::NaiveDate;
use serde_json::Value;

use crate::qc;
use crate::qc::as_str;
use crate::qc::Document;
use crate::qc::Summary as QcSummary;
use crate::qc::EXPERIMENT_SAMPLE;

/// The pointer to the pipeline outputs, keyed by run id.
pub const OUTPUTS: &str = "/germline_full/outputs";

/// The format of the run date.
pub const DATE_FORMAT: &str = "%d-%m-%y";

/// The prefix of comment lines in hap.py output.
pub const COMMENT_PREFIX: &str = "##";

/// The filter whose lines are kept.
pub const FILTER_ALL: &str = "ALL";

/// The columns of a result row.
pub const HEADER: [&str; 15] = [
    "Lab_ID",
    "Sample_name",
    "Run_ID",
    "GiaB_sample",
    "SNP_recall",
    "SNP_precision",
    "SNP_F1",
    "Indel_recall",
    "Indel_precision",
    "Indel_F1",
    "Fraction_at_least_10x",
    "Fraction_at_least_20x",
    "Median_insert_size",
    "Mean_coverage",
    "Hap.py_run_date",
];

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to hap.py summaries.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// A CSV error.
    Csv(csv::Error),

    /// A required column was missing.
    MissingColumn(&'static str),

    /// No `ALL`-filter line was present for a variant type.
    MissingType(&'static str),

    /// A metric was not a number.
    InvalidValue {
        /// The column of the metric.
        column: &'static str,

        /// The offending value.
        value: String,
    },

    /// A field of the QC document could not be extracted.
    Parse(qc::ParseError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Csv(err) => write!(f, "csv error: {err}"),
            Error::MissingColumn(column) => write!(f, "missing column: {column}"),
            Error::MissingType(kind) => write!(f, "no {FILTER_ALL} line for type {kind}"),
            Error::InvalidValue { column, value } => {
                write!(f, "invalid value in column {column}: `{value}`")
            }
            Error::Parse(err) => write!(f, "parse error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<qc::ParseError> for Error {
    fn from(err: qc::ParseError) -> Self {
        Error::Parse(err)
    }
}

/// A [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// hap.py summaries
////////////////////////////////////////////////////////////////////////////////////////

/// The benchmark metrics of one variant type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    /// The recall.
    pub recall: f64,

    /// The precision.
    pub precision: f64,

    /// The F1 score.
    pub f1: f64,
}

/// The `ALL`-filter metrics of a hap.py summary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    /// The SNP metrics.
    pub snp: Metrics,

    /// The indel metrics.
    pub indel: Metrics,
}

impl Summary {
    /// Reads a hap.py summary CSV, skipping `##` comment lines.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::happy::Summary;
    ///
    /// let data = concat!(
    ///     "## hap.py v0.3.14\n",
    ///     "Type,Filter,TRUTH.TOTAL,METRIC.Recall,METRIC.Precision,METRIC.F1_Score\n",
    ///     "INDEL,ALL,100,0.95,0.96,0.955\n",
    ///     "INDEL,PASS,100,0.94,0.97,0.955\n",
    ///     "SNP,ALL,1000,0.99,0.995,0.9925\n",
    /// );
    ///
    /// let summary = Summary::from_reader(data.as_bytes())?;
    /// assert_eq!(summary.snp.recall, 0.99);
    /// assert_eq!(summary.indel.precision, 0.96);
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_reader<R>(reader: R) -> Result<Self>
    where
        R: Read,
    {
        let data = uncommented(reader).map_err(Error::Io)?;
        let mut reader = csv::Reader::from_reader(data.as_bytes());

        let headers = reader.headers().map_err(Error::Csv)?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or(Error::MissingColumn(name))
        };

        let kind = column("Type")?;
        let filter = column("Filter")?;
        let metrics = [
            ("METRIC.Recall", column("METRIC.Recall")?),
            ("METRIC.Precision", column("METRIC.Precision")?),
            ("METRIC.F1_Score", column("METRIC.F1_Score")?),
        ];

        let mut snp = None;
        let mut indel = None;

        for result in reader.records() {
            let record = result.map_err(Error::Csv)?;

            if record.get(filter) != Some(FILTER_ALL) {
                continue;
            }

            let slot = match record.get(kind) {
                Some("SNP") => &mut snp,
                Some("INDEL") => &mut indel,
                _ => continue,
            };

            let mut values = [0.0; 3];
            for (value, (name, i)) in values.iter_mut().zip(metrics) {
                *value = number(name, record.get(i).unwrap_or_default())?;
            }

            let [recall, precision, f1] = values;
            slot.get_or_insert(Metrics {
                recall,
                precision,
                f1,
            });
        }

        Ok(Self {
            snp: snp.ok_or(Error::MissingType("SNP"))?,
            indel: indel.ok_or(Error::MissingType("INDEL"))?,
        })
    }
}

/// Reads everything from `reader` except lines starting with `##`.
pub(crate) fn uncommented<R>(reader: R) -> io::Result<String>
where
    R: Read,
{
    let mut data = String::new();

    for line in BufReader::new(reader).lines() {
        let line = line?;
        if !line.starts_with(COMMENT_PREFIX) {
            data.push_str(&line);
            data.push('\n');
        }
    }

    Ok(data)
}

/// Parses a metric.
fn number(column: &'static str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| Error::InvalidValue {
            column,
            value: value.to_string(),
        })
}

////////////////////////////////////////////////////////////////////////////////////////
// Result rows
////////////////////////////////////////////////////////////////////////////////////////

/// The benchmark result of one sample against one GiaB truth set.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// The lab id of the sequencing run.
    lab_id: String,

    /// The name of the benchmarked sample.
    sample_name: String,

    /// The pipeline run id.
    run_id: String,

    /// The GiaB truth set.
    giab_sample: String,

    /// The hap.py metrics.
    happy: Summary,

    /// The fraction of the genome covered at least 10x.
    fraction_10x: f64,

    /// The fraction of the genome covered at least 20x.
    fraction_20x: f64,

    /// The median insert size.
    median_insert_size: f64,

    /// The mean coverage.
    mean_coverage: f64,

    /// The date hap.py was run.
    date: NaiveDate,
}

impl Row {
    /// Joins a hap.py summary with the QC document of the benchmarked sample.
    ///
    /// The run id is the first key of the pipeline outputs.
    pub fn try_new(
        document: &Document,
        happy: Summary,
        sample_name: impl Into<String>,
        giab_sample: impl Into<String>,
        date: NaiveDate,
    ) -> Result<Self> {
        let qc = QcSummary::try_from(document)?;

        Ok(Self {
            lab_id: lab_id(document)?,
            sample_name: sample_name.into(),
            run_id: run_id(document)?,
            giab_sample: giab_sample.into(),
            happy,
            fraction_10x: qc.float("pct_10x")?,
            fraction_20x: qc.float("pct_20x")?,
            median_insert_size: qc.float("median_insert_size")?,
            mean_coverage: qc.float("mean_coverage")?,
            date,
        })
    }

    /// Gets the sample name.
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    /// Gets the run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Gets the GiaB sample name.
    pub fn giab_sample(&self) -> &str {
        &self.giab_sample
    }

    /// Gets the formatted values in [`HEADER`] order.
    ///
    /// Floats are written with five decimals.
    pub fn values(&self) -> [String; 15] {
        let float = |value: f64| format!("{value:.5}");

        [
            self.lab_id.clone(),
            self.sample_name.clone(),
            self.run_id.clone(),
            self.giab_sample.clone(),
            float(self.happy.snp.recall),
            float(self.happy.snp.precision),
            float(self.happy.snp.f1),
            float(self.happy.indel.recall),
            float(self.happy.indel.precision),
            float(self.happy.indel.f1),
            float(self.fraction_10x),
            float(self.fraction_20x),
            float(self.median_insert_size),
            float(self.mean_coverage),
            self.date.format(DATE_FORMAT).to_string(),
        ]
    }
}

/// Writes a row, with its header, as CSV.
pub fn write_csv<W>(writer: W, row: &Row) -> Result<()>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(HEADER).map_err(Error::Csv)?;
    writer.write_record(row.values()).map_err(Error::Csv)?;
    writer.flush().map_err(Error::Io)
}

/// Gets the run id of a document without building a full row.
pub fn run_id(document: &Document) -> Result<String> {
    let outputs = document.get(OUTPUTS)?;

    match outputs.as_object().and_then(|outputs| outputs.keys().next()) {
        Some(key) => Ok(key.clone()),
        None => Err(Error::Parse(qc::ParseError::Missing(format!("{OUTPUTS}/*")))),
    }
}

/// Gets the lab id of the sample in a document.
pub fn lab_id(document: &Document) -> Result<String> {
    let pointer = format!("{EXPERIMENT_SAMPLE}/lab_id");
    let value: &Value = document.get(&pointer)?;
    Ok(as_str(value, &pointer)?.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::reshape::metrics::tests::full_document;

    pub(crate) const HAPPY: &str = "\
## hap.py v0.3.14
## comment, with a comma
Type,Filter,TRUTH.TOTAL,TRUTH.TP,METRIC.Recall,METRIC.Precision,METRIC.Frac_NA,METRIC.F1_Score
INDEL,ALL,100,95,0.95,0.96,0.1,0.955
INDEL,PASS,100,94,0.94,0.97,0.1,0.9548
SNP,ALL,1000,990,0.99,0.995,0.1,0.9925
SNP,PASS,1000,989,0.989,0.996,0.1,0.9925
";

    pub(crate) fn row(sample_name: &str, giab: &str) -> Row {
        let document = Document::new(full_document(sample_name));
        let summary = Summary::from_reader(HAPPY.as_bytes()).unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 3, 21).unwrap();
        Row::try_new(&document, summary, sample_name, giab, date).unwrap()
    }

    #[test]
    fn it_reads_all_filter_metrics() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let summary = Summary::from_reader(HAPPY.as_bytes())?;

        assert_eq!(
            summary.snp,
            Metrics {
                recall: 0.99,
                precision: 0.995,
                f1: 0.9925
            }
        );
        assert_eq!(summary.indel.f1, 0.955);

        Ok(())
    }

    #[test]
    fn it_requires_both_variant_types() {
        let data = "Type,Filter,METRIC.Recall,METRIC.Precision,METRIC.F1_Score\nSNP,ALL,1,1,1\n";
        let err = Summary::from_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MissingType("INDEL")));

        let data = "Type,Filter,METRIC.Recall,METRIC.Precision\n";
        let err = Summary::from_reader(data.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "missing column: METRIC.F1_Score");

        let data =
            "Type,Filter,METRIC.Recall,METRIC.Precision,METRIC.F1_Score\nSNP,ALL,,1,1\nINDEL,ALL,1,1,1\n";
        let err = Summary::from_reader(data.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "invalid value in column METRIC.Recall: ``");
    }

    #[test]
    fn it_formats_a_result_row() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let row = row("S1", "HG002");

        let mut buffer = Vec::new();
        write_csv(&mut buffer, &row)?;

        assert_eq!(
            String::from_utf8(buffer)?,
            "Lab_ID,Sample_name,Run_ID,GiaB_sample,SNP_recall,SNP_precision,SNP_F1,\
             Indel_recall,Indel_precision,Indel_F1,Fraction_at_least_10x,\
             Fraction_at_least_20x,Median_insert_size,Mean_coverage,Hap.py_run_date\n\
             wgs_east,S1,GLN-0001,HG002,0.99000,0.99500,0.99250,0.95000,0.96000,0.95500,\
             0.99000,0.97000,412.00000,31.50000,21-03-22\n"
        );

        Ok(())
    }

    #[test]
    fn it_reads_the_run_and_lab_ids() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let document = Document::new(full_document("S1"));
        assert_eq!(run_id(&document)?, "GLN-0001");
        assert_eq!(lab_id(&document)?, "wgs_east");

        let document = Document::new(json!({ "germline_full": { "outputs": {} } }));
        assert!(run_id(&document).is_err());

        Ok(())
    }
}
