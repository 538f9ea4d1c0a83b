//! Locating a sample's pipeline outputs across the lab result trees.
//!
//! Each lab keeps its results under
//!
//! ```text
//! <base>/<lab>/<pre_folder>/<run>/<sample>/<post_folder>/<file>
//! ```
//!
//! where the pre and post folders depend on the [`Kind`] of output wanted.

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;
use walkdir::DirEntry;
use walkdir::WalkDir;

use crate::discovery::Error;

/// The default base directory holding the lab result trees.
pub const BASE: &str = "/ngc/data_analysis/";

/// The default labs that are searched, in order.
pub const LABS: &[&str] = &[
    "wgs_west",
    "wgs_east",
    "wgs_east_test",
    "wgs_west_test",
    "wgs_center_test",
];

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// An unsupported output kind.
#[derive(Debug)]
pub struct ParseKindError(String);

impl std::fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported file type `{}`, please use: summary|s|vcf|v",
            self.0
        )
    }
}

impl std::error::Error for ParseKindError {}

/// The kind of output to locate.
///
/// # Examples
///
/// ```
/// use qcpush::discovery::locate::Kind;
///
/// assert_eq!("s".parse::<Kind>()?, Kind::Summary);
/// assert_eq!("vcf".parse::<Kind>()?, Kind::Vcf);
/// assert_eq!(Kind::Vcf.file_match(), ".endpoint.vcf.gz");
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// The germline QC `summary.json`.
    Summary,

    /// The germline endpoint VCF.
    Vcf,
}

impl Kind {
    /// Gets the folder below the lab directory holding the runs.
    pub fn pre_folder(&self) -> &'static str {
        match self {
            Kind::Summary => "analysis-results/germlineqc",
            Kind::Vcf => "analysis-results/germline",
        }
    }

    /// Gets the folder below the sample directory holding the outputs.
    pub fn post_folder(&self) -> &'static str {
        match self {
            Kind::Summary => "output-latest-completed/output",
            Kind::Vcf => "output-latest-completed/output/gatk",
        }
    }

    /// Gets the suffix of the output's file name.
    pub fn file_match(&self) -> &'static str {
        match self {
            Kind::Summary => "summary.json",
            Kind::Vcf => ".endpoint.vcf.gz",
        }
    }
}

impl FromStr for Kind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "summary" | "s" => Ok(Kind::Summary),
            "vcf" | "v" => Ok(Kind::Vcf),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

/// How sample directories are matched against the sample name.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Matching {
    /// The directory name equals the sample name.
    #[default]
    Exact,

    /// The directory name contains the sample name.
    Partial,
}

impl Matching {
    /// Whether a sample directory named `directory` belongs to `sample`.
    fn matches(&self, directory: &str, sample: &str) -> bool {
        match self {
            Matching::Exact => directory == sample,
            Matching::Partial => directory.contains(sample),
        }
    }
}

/// Searches the lab result trees for a sample's outputs.
#[derive(Clone, Debug)]
pub struct Locator {
    /// The base directory.
    base: PathBuf,

    /// The labs to search.
    labs: Vec<String>,
}

impl Locator {
    /// Creates a new [`Locator`].
    pub fn new(base: impl Into<PathBuf>, labs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            base: base.into(),
            labs: labs.into_iter().map(Into::into).collect(),
        }
    }

    /// Finds every output of `kind` for `sample`.
    ///
    /// Labs and runs that do not exist are skipped, as are sample directories
    /// without the expected output folder.
    pub fn locate(&self, kind: Kind, sample: &str, matching: Matching) -> Result<Vec<PathBuf>> {
        let sample = sample.trim_end();
        let mut found = Vec::new();

        for lab in &self.labs {
            let root = self.base.join(lab).join(kind.pre_folder());

            if !root.is_dir() {
                debug!("skipping missing lab directory {}", root.display());
                continue;
            }

            for run in subdirectories(&root)? {
                for directory in subdirectories(&run)? {
                    let matched = directory
                        .file_name()
                        .map(|name| matching.matches(&name.to_string_lossy(), sample))
                        .unwrap_or(false);

                    if !matched {
                        continue;
                    }

                    let outputs = directory.join(kind.post_folder());

                    if !outputs.is_dir() {
                        debug!("no output folder in {}", directory.display());
                        continue;
                    }

                    for path in files(&outputs)? {
                        let name = path
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_default();

                        if name.ends_with(kind.file_match()) {
                            found.push(path);
                        }
                    }
                }
            }
        }

        Ok(found)
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new(BASE, LABS.iter().copied())
    }
}

/// Lists the immediate children of a directory that pass `keep`, in name
/// order. Symbolic links are followed.
fn children<F>(directory: &Path, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&DirEntry) -> bool,
{
    let mut found = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(Error::Walk)?;

        if keep(&entry) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

/// Lists the subdirectories of a directory in name order.
fn subdirectories(directory: &Path) -> Result<Vec<PathBuf>> {
    children(directory, |entry| entry.file_type().is_dir())
}

/// Lists the files of a directory in name order.
fn files(directory: &Path) -> Result<Vec<PathBuf>> {
    children(directory, |entry| entry.file_type().is_file())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::fs::File;

    use tempdir::TempDir;

    use super::*;

    fn touch(path: PathBuf) -> std::result::Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(path.parent().unwrap())?;
        File::create(path)?;
        Ok(())
    }

    #[test]
    fn it_locates_summaries_and_vcfs() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("qcpush")?;
        let base = dir.path();

        let summary = base
            .join("wgs_east/analysis-results/germlineqc/RUN1/S1")
            .join(Kind::Summary.post_folder())
            .join("summary.json");
        let other = base
            .join("wgs_east/analysis-results/germlineqc/RUN1/S10")
            .join(Kind::Summary.post_folder())
            .join("summary.json");
        let vcf = base
            .join("wgs_west_test/analysis-results/germline/RUN2/S1")
            .join(Kind::Vcf.post_folder())
            .join("S1.endpoint.vcf.gz");

        touch(summary.clone())?;
        touch(other.clone())?;
        touch(vcf.clone())?;
        touch(vcf.with_file_name("S1.endpoint.vcf.gz.tbi"))?;
        fs::create_dir_all(base.join("wgs_east/analysis-results/germlineqc/RUN1/S1-empty"))?;
        touch(base.join("wgs_east/analysis-results/germlineqc/RUN1/S1.log"))?;
        touch(base.join("wgs_east/analysis-results/germlineqc/README"))?;
        fs::create_dir_all(summary.with_file_name("old.summary.json"))?;

        let locator = Locator::new(base, ["wgs_east", "wgs_west_test", "wgs_center_test"]);

        assert_eq!(
            locator.locate(Kind::Summary, "S1\n", Matching::Exact)?,
            [summary.clone()]
        );
        assert_eq!(
            locator.locate(Kind::Summary, "S1", Matching::Partial)?,
            [summary, other]
        );
        assert_eq!(locator.locate(Kind::Vcf, "S1", Matching::Exact)?, [vcf]);
        assert!(locator
            .locate(Kind::Vcf, "S2", Matching::Partial)?
            .is_empty());

        Ok(())
    }

    #[test]
    fn it_rejects_unknown_kinds() {
        let err = "bam".parse::<Kind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported file type `bam`, please use: summary|s|vcf|v"
        );
    }
}
