//! The germline `QC_summary` metrics block.

use serde_json::Map;
use serde_json::Value;

use crate::qc::as_object;
use crate::qc::as_text;
use crate::qc::child;
use crate::qc::Document;
use crate::qc::ParseError;

/// The pointer to the metrics summary of the first germline sample.
pub const QC_SUMMARY: &str = "/germline_full/metrics/samples/0/QC_summary";

/// The germline QC summary metrics of a [`Document`].
///
/// Metric values are numbers or numeric strings. Accessors that rescale a
/// value (percentages, millions) shift the decimal point of the value's textual
/// form instead of multiplying floats, so `0.07` as a percentage is exactly
/// `7.0`.
#[derive(Clone, Debug)]
pub struct Summary<'a> {
    /// The inner metrics object.
    inner: &'a Map<String, Value>,
}

impl<'a> Summary<'a> {
    /// Gets the raw value of a metric.
    pub fn get(&self, key: &str) -> Result<&'a Value, ParseError> {
        child(self.inner, QC_SUMMARY, key)
    }

    /// Gets the textual form of a metric.
    pub fn text(&self, key: &str) -> Result<String, ParseError> {
        as_text(self.get(key)?, &pointer(key))
    }

    /// Gets a metric as a float.
    ///
    /// # Examples
    ///
    /// ```
    /// use qcpush::qc::Document;
    /// use qcpush::qc::Summary;
    ///
    /// let document = r#"{"germline_full": {"metrics": {"samples": [{"QC_summary": {
    ///     "mean_coverage": "31.5",
    ///     "pct_q30": 0.9123,
    ///     "m_reads_mapped": "812.3456789"
    /// }}]}}}"#
    /// .parse::<Document>()?;
    ///
    /// let summary = Summary::try_from(&document)?;
    /// assert_eq!(summary.float("mean_coverage")?, 31.5);
    /// assert_eq!(summary.percent("pct_q30")?, 91.23);
    /// assert_eq!(summary.millions("m_reads_mapped")?, 812_345_678);
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn float(&self, key: &str) -> Result<f64, ParseError> {
        self.text(key)?
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| invalid_number(key))
    }

    /// Gets a metric as an integer, truncating any fractional part.
    pub fn integer(&self, key: &str) -> Result<i64, ParseError> {
        Ok(self.float(key)?.trunc() as i64)
    }

    /// Gets a fractional metric as a percentage.
    pub fn percent(&self, key: &str) -> Result<f64, ParseError> {
        shift_decimal(&self.text(key)?, 2).ok_or_else(|| invalid_number(key))
    }

    /// Gets a metric expressed in millions as an absolute count.
    pub fn millions(&self, key: &str) -> Result<i64, ParseError> {
        shift_decimal(&self.text(key)?, 6)
            .map(|value| value.trunc() as i64)
            .ok_or_else(|| invalid_number(key))
    }
}

impl<'a> TryFrom<&'a Document> for Summary<'a> {
    type Error = ParseError;

    fn try_from(document: &'a Document) -> Result<Self, Self::Error> {
        let inner = as_object(document.get(QC_SUMMARY)?, QC_SUMMARY)?;
        Ok(Self { inner })
    }
}

/// Builds the pointer to a metric.
fn pointer(key: &str) -> String {
    format!("{QC_SUMMARY}/{key}")
}

/// Builds the error for a metric that is not a finite number.
fn invalid_number(key: &str) -> ParseError {
    ParseError::InvalidType {
        pointer: pointer(key),
        expected: "a finite number",
    }
}

/// Moves the decimal point of a number's textual form `places` positions to
/// the right and parses the result.
///
/// Parsing `"<mantissa>e<exponent + places>"` rounds exactly once, so the
/// result is the float nearest to the decimal product.
pub(crate) fn shift_decimal(text: &str, places: i32) -> Option<f64> {
    let text = text.trim();
    let value = text.parse::<f64>().ok()?;

    if !value.is_finite() {
        return None;
    }

    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(i) => (&text[..i], text[i + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };

    format!("{mantissa}e{}", exponent + places).parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn it_shifts_decimals_without_float_error() {
        assert_eq!(shift_decimal("0.07", 2), Some(7.0));
        assert_eq!(shift_decimal("0.1234", 2), Some(12.34));
        assert_eq!(shift_decimal("1.5e-3", 2), Some(0.15));
        assert_eq!(shift_decimal("4.56", 6), Some(4_560_000.0));
        assert_eq!(shift_decimal("-0.5", 2), Some(-50.0));
        assert_eq!(shift_decimal("abc", 2), None);
        assert_eq!(shift_decimal("inf", 2), None);
    }

    #[test]
    fn it_reads_metrics_from_a_document() -> Result<(), Box<dyn std::error::Error>> {
        let document = Document::new(json!({
            "germline_full": { "metrics": { "samples": [{ "QC_summary": {
                "pct_duplicates": 0.07,
                "median_insert_size": "412",
                "M_nSNPs_all": 4.5678912,
                "sd_coverage": "n/a"
            }}]}}
        }));
        let summary = Summary::try_from(&document)?;

        assert_eq!(summary.percent("pct_duplicates")?, 7.0);
        assert_eq!(summary.integer("median_insert_size")?, 412);
        assert_eq!(summary.millions("M_nSNPs_all")?, 4_567_891);

        let err = summary.float("sd_coverage").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for field \
             /germline_full/metrics/samples/0/QC_summary/sd_coverage: expected a finite number"
        );

        let err = summary.float("pct_30x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required field: /germline_full/metrics/samples/0/QC_summary/pct_30x"
        );

        Ok(())
    }
}
