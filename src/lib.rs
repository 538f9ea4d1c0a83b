//! `qcpush` is a crate for reshaping germline QC results and registering them
//! with the Aero analysis registry.
//!
//! The germline QC pipeline writes one JSON document per sequenced sample
//! (the `summary.json`). The registry, on the other hand, wants flowcells
//! registered once with all of their samples, and then one analysis per
//! sample carrying its metrics, its ID-SNP check and an evaluation status.
//! This crate covers the way between the two:
//!
//! - [`discovery`] finds QC documents on the shared results filesystem and
//!   keeps lists of them as CSV.
//! - [`qc`] loads a document and extracts fields from it by JSON pointer.
//! - [`flowcell`] groups the per-sample documents into flowcell registrations,
//!   checking that every sample of a flowcell agrees on the flowcell's
//!   details.
//! - [`reshape`] builds the per-sample analysis, metrics, ID-SNP and patch
//!   payloads.
//! - [`sink`] delivers payloads, either to the registry through an
//!   [`aero::Client`] or to a directory for dry runs.
//!
//! Separately, [`happy`] and [`historic`] condense hap.py benchmark results
//! into a result row and keep a historic file of them.
//!
//! ## Grouping flowcells
//!
//! Most users will start from [`flowcell::aggregate()`], which takes a batch of
//! documents along with the paths they were read from. The batch stops at the
//! first document that is missing a field or disagrees with an earlier
//! document for the same flowcell.
//!
//! ```
//! use qcpush::flowcell;
//! use qcpush::qc::Document;
//!
//! let document = |sample: &str, run_number: &str| {
//!     format!(
//!         r#"{{"metadata": {{"experiment_run": {{
//!             "flowcell_id": ["HTFHCDMXX"], "lab_id": ["wgs_east"],
//!             "run_number": ["{run_number}"], "instrument_serial_nr": ["A00559"],
//!             "run_id": ["200622_A00559_0210_AHTFHCDMXX"],
//!             "start_time": ["2020-06-22T10:14:00"],
//!             "experiment_samples": [{{"sample_id": "{sample}-01",
//!                 "sample_name": "{sample}", "subject_id": "1037",
//!                 "ngc_subject_id": "NGC0001", "registration_id": "RHGM0001"}}]}}}}}}"#
//!     )
//!     .parse::<Document>()
//! };
//!
//! let groups = flowcell::aggregate([
//!     ("a/summary.json", document("S1", "210")?),
//!     ("b/summary.json", document("S2", "210")?),
//! ])?;
//!
//! for (key, group) in groups.iter() {
//!     assert_eq!(key.to_string(), "HTFHCDMXX-wgs_east");
//!     assert_eq!(group.seq_run_date(), "2020-06-22");
//!     assert_eq!(group.samples().len(), 2);
//! }
//!
//! let err = flowcell::aggregate([
//!     ("a/summary.json", document("S1", "210")?),
//!     ("b/summary.json", document("S2", "211")?),
//! ])
//! .unwrap_err();
//!
//! assert_eq!(
//!     err.to_string(),
//!     "consistency error: flowcellNr does not match previous values for b/summary.json: \
//!      this file has `211` and previous have `210`"
//! );
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Pushing samples
//!
//! Per-sample payloads are bundled as [`sink::SamplePayloads`] and handed to a
//! [`sink::Sink`]. The QC outcome the document was sorted under (`passed` or
//! `failed`) becomes the evaluation status of the analysis.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod aero;
pub mod confirm;
pub mod discovery;
pub mod facility;
pub mod flowcell;
pub mod happy;
pub mod historic;
pub mod qc;
pub mod reshape;
pub mod sink;
