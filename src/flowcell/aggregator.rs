//! Grouping of per-sample QC records into flowcell registrations.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;

use crate::flowcell::DateFormat;
use crate::flowcell::Group;
use crate::flowcell::Groups;
use crate::flowcell::Key;
use crate::flowcell::Sample;
use crate::qc::SampleRecord;

/// A field that must agree between all records of a flowcell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    /// The flowcell id.
    FlowcellId,

    /// The flowcell number.
    FlowcellNr,

    /// The sequencing run id.
    SeqRunId,

    /// The sequencing run date.
    SeqRunDate,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::FlowcellId => write!(f, "flowcellID"),
            Field::FlowcellNr => write!(f, "flowcellNr"),
            Field::SeqRunId => write!(f, "seqRunID"),
            Field::SeqRunDate => write!(f, "seqRunDate"),
        }
    }
}

/// The fields compared for a record with a date-time start time.
const DATE_TIME_CHECKS: &[Field] = &[Field::FlowcellId, Field::FlowcellNr, Field::SeqRunId];

/// The fields compared for a record with a date-only start time.
const DATE_CHECKS: &[Field] = &[
    Field::FlowcellId,
    Field::FlowcellNr,
    Field::SeqRunId,
    Field::SeqRunDate,
];

/// A record disagreed with the values already stored for its flowcell.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsistencyError {
    /// The field that did not match.
    field: Field,

    /// The file the offending record was read from.
    path: PathBuf,

    /// The value in the offending record.
    new: String,

    /// The value stored for the flowcell.
    stored: String,
}

impl ConsistencyError {
    /// Gets the field that did not match.
    pub fn field(&self) -> Field {
        self.field
    }

    /// Gets the path of the offending file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the value in the offending record.
    pub fn new_value(&self) -> &str {
        &self.new
    }

    /// Gets the value stored for the flowcell.
    pub fn stored_value(&self) -> &str {
        &self.stored
    }
}

impl std::fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} does not match previous values for {}: this file has `{}` and previous have `{}`",
            self.field,
            self.path.display(),
            self.new,
            self.stored
        )
    }
}

impl std::error::Error for ConsistencyError {}

/// Folds sample records into one [`Group`] per (flowcell, lab) pair.
///
/// An aggregator is created empty, fed with [`Aggregator::ingest()`] once per
/// record and consumed with [`Aggregator::finalize()`].
///
/// When a record arrives for a flowcell that already has a group, its
/// `flowcellID`, `flowcellNr` and `seqRunID` must match the group's values
/// exactly. The `seqRunDate` is compared too, but only when the *incoming*
/// record's start time is date-only: date-time start times are never compared.
///
/// # Examples
///
/// ```
/// use qcpush::flowcell::Aggregator;
/// use qcpush::flowcell::Key;
/// use qcpush::qc::Document;
/// use qcpush::qc::SampleRecord;
///
/// let record = |name: &str, nr: &str| -> Result<SampleRecord, Box<dyn std::error::Error>> {
///     let document = format!(
///         r#"{{"metadata": {{"experiment_run": {{
///             "flowcell_id": ["FC1"], "lab_id": ["wgs-east"], "run_number": ["{nr}"],
///             "instrument_serial_nr": ["A00559"], "run_id": ["R1"], "start_time": ["2022-01-01"],
///             "experiment_samples": [{{"sample_id": "ID", "sample_name": "{name}",
///                 "subject_id": "SUB", "ngc_subject_id": "NGC", "registration_id": "REG"}}]}}}}}}"#
///     )
///     .parse::<Document>()?;
///     Ok(SampleRecord::try_from(&document)?)
/// };
///
/// let mut aggregator = Aggregator::default();
/// aggregator.ingest("a.json", &record("S1", "7")?)?;
/// aggregator.ingest("b.json", &record("S2", "7")?)?;
///
/// let err = aggregator.ingest("c.json", &record("S3", "8")?).unwrap_err();
/// assert_eq!(err.to_string(), "flowcellNr does not match previous values for c.json: \
///     this file has `8` and previous have `7`");
///
/// let groups = aggregator.finalize();
/// let group = groups.get(&Key::new("FC1", "wgs-east")).unwrap();
/// assert_eq!(group.samples().len(), 2);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct Aggregator {
    /// The position of each key within `groups`.
    index: HashMap<Key, usize>,

    /// The groups in order of first encounter.
    groups: Vec<(Key, Group)>,
}

impl Aggregator {
    /// Gets the number of groups accumulated so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns whether no record has been ingested yet.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Ingests a record that was read from `path`.
    ///
    /// A failed check leaves the aggregator untouched.
    pub fn ingest(
        &mut self,
        path: impl AsRef<Path>,
        record: &SampleRecord,
    ) -> Result<(), ConsistencyError> {
        let path = path.as_ref();
        let format = DateFormat::classify(record.start_time());
        let key = Key::from(record);

        debug!(
            "ingesting sample {} for flowcell {key} from {}",
            record.sample_name(),
            path.display()
        );

        match self.index.get(&key).copied() {
            Some(i) => {
                let group = &mut self.groups[i].1;
                check(group, record, format, path)?;
                group.push(Sample::from(record));
            }
            None => {
                info!("found new flowcell {key}");
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, Group::new(record, format)));
            }
        }

        Ok(())
    }

    /// Consumes the aggregator and returns the accumulated groups.
    pub fn finalize(self) -> Groups {
        Groups::from(self.groups)
    }
}

/// Checks a record against the values stored in its group.
fn check(
    group: &Group,
    record: &SampleRecord,
    format: DateFormat,
    path: &Path,
) -> Result<(), ConsistencyError> {
    let fields = match format {
        DateFormat::DateTime => DATE_TIME_CHECKS,
        DateFormat::Date => DATE_CHECKS,
    };

    for &field in fields {
        let (new, stored) = match field {
            Field::FlowcellId => (record.flowcell_id(), group.flowcell_id()),
            Field::FlowcellNr => (record.run_number(), group.flowcell_nr()),
            Field::SeqRunId => (record.seq_run_id(), group.seq_run_id()),
            Field::SeqRunDate => (record.start_time(), group.seq_run_date()),
        };

        if new != stored {
            return Err(ConsistencyError {
                field,
                path: path.to_path_buf(),
                new: new.to_string(),
                stored: stored.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qc::record::tests::document;
    use crate::qc::Document;

    fn record(
        flowcell_id: &str,
        lab_id: &str,
        run_number: &str,
        run_id: &str,
        start_time: &str,
        sample_name: &str,
    ) -> SampleRecord {
        let document = Document::new(document(
            flowcell_id,
            lab_id,
            run_number,
            run_id,
            start_time,
            sample_name,
        ));
        SampleRecord::try_from(&document).unwrap()
    }

    fn sample_names(group: &Group) -> Vec<&str> {
        group
            .samples()
            .iter()
            .map(|sample| sample.sample_name())
            .collect()
    }

    #[test]
    fn it_groups_two_matching_records_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest("a.json", &record("FC1", "wgs-east", "7", "R1", "2022-01-01", "S1"))?;
        aggregator.ingest("b.json", &record("FC1", "wgs-east", "7", "R1", "2022-01-01", "S2"))?;

        let groups = aggregator.finalize();
        assert_eq!(groups.len(), 1);

        let (key, group) = groups.iter().next().unwrap();
        assert_eq!(key.to_string(), "FC1-wgs-east");
        assert_eq!(sample_names(group), ["S1", "S2"]);

        Ok(())
    }

    #[test]
    fn it_rejects_a_mismatched_flowcell_number() -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest("a.json", &record("FC1", "wgs-east", "7", "R1", "2022-01-01", "S1"))?;

        let err = aggregator
            .ingest("b.json", &record("FC1", "wgs-east", "8", "R1", "2022-01-01", "S2"))
            .unwrap_err();

        assert_eq!(err.field(), Field::FlowcellNr);
        assert_eq!(err.path(), Path::new("b.json"));
        assert_eq!(err.new_value(), "8");
        assert_eq!(err.stored_value(), "7");

        // The failed record is not added.
        let groups = aggregator.finalize();
        assert_eq!(sample_names(groups.iter().next().unwrap().1), ["S1"]);

        Ok(())
    }

    #[test]
    fn it_rejects_a_mismatched_run_id() -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest("a.json", &record("FC1", "wgs-east", "7", "R1", "2022-01-01", "S1"))?;

        let err = aggregator
            .ingest("b.json", &record("FC1", "wgs-east", "7", "R2", "2022-01-01", "S2"))
            .unwrap_err();
        assert_eq!(err.field(), Field::SeqRunId);

        Ok(())
    }

    #[test]
    fn it_truncates_date_times_to_the_run_date() -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest(
            "a.json",
            &record("FC1", "wgs-east", "7", "R1", "2022-06-20T10:00:00", "S1"),
        )?;

        let groups = aggregator.finalize();
        assert_eq!(groups.iter().next().unwrap().1.seq_run_date(), "2022-06-20");

        Ok(())
    }

    #[test]
    fn it_ignores_the_date_for_date_time_records() -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest(
            "a.json",
            &record("FC1", "wgs-east", "7", "R1", "2022-06-20T10:00:00", "S1"),
        )?;
        aggregator.ingest(
            "b.json",
            &record("FC1", "wgs-east", "7", "R1", "2022-06-21T11:30:00", "S2"),
        )?;

        let groups = aggregator.finalize();
        let group = groups.iter().next().unwrap().1;
        assert_eq!(group.seq_run_date(), "2022-06-20");
        assert_eq!(sample_names(group), ["S1", "S2"]);

        Ok(())
    }

    #[test]
    fn it_compares_the_date_for_date_only_records() -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest(
            "a.json",
            &record("FC1", "wgs-east", "7", "R1", "2022-06-20T10:00:00", "S1"),
        )?;

        // A date-only record matching the truncated date is accepted.
        aggregator.ingest("b.json", &record("FC1", "wgs-east", "7", "R1", "2022-06-20", "S2"))?;

        let err = aggregator
            .ingest("c.json", &record("FC1", "wgs-east", "7", "R1", "2022-06-21", "S3"))
            .unwrap_err();
        assert_eq!(err.field(), Field::SeqRunDate);
        assert_eq!(err.new_value(), "2022-06-21");
        assert_eq!(err.stored_value(), "2022-06-20");

        Ok(())
    }

    #[test]
    fn it_skips_the_date_check_when_a_date_group_gets_a_date_time_record(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut aggregator = Aggregator::default();
        aggregator.ingest("a.json", &record("FC1", "wgs-east", "7", "R1", "2022-06-20", "S1"))?;
        aggregator.ingest(
            "b.json",
            &record("FC1", "wgs-east", "7", "R1", "2023-01-01T00:00:00", "S2"),
        )?;

        assert_eq!(aggregator.len(), 1);

        Ok(())
    }

    #[test]
    fn it_counts_samples_per_distinct_pair() -> Result<(), Box<dyn std::error::Error>> {
        let pairs = [
            ("FC1", "wgs-east"),
            ("FC2", "wgs-east"),
            ("FC1", "wgs-west"),
            ("FC2", "wgs-east"),
            ("FC1", "wgs-east"),
            ("FC1", "wgs-east"),
        ];

        let mut aggregator = Aggregator::default();
        for (i, (flowcell, lab)) in pairs.iter().enumerate() {
            let name = format!("S{i}");
            aggregator.ingest(
                format!("{name}.json"),
                &record(flowcell, lab, "1", "R", "2022-01-01", &name),
            )?;
        }

        let counts = aggregator
            .finalize()
            .iter()
            .map(|(key, group)| (key.to_string(), group.samples().len()))
            .collect::<Vec<_>>();

        assert_eq!(
            counts,
            [
                (String::from("FC1-wgs-east"), 3),
                (String::from("FC2-wgs-east"), 2),
                (String::from("FC1-wgs-west"), 1),
            ]
        );

        Ok(())
    }
}
