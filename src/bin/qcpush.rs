//! A binary to find germline QC results, reshape them and register them with
//! the Aero analysis registry.
//!
//! ```shell
//! cargo run --release --bin=qcpush --features=binaries -- paths /ngc/qc-results -o samples.csv
//! cargo run --release --bin=qcpush --features=binaries -- push samples.csv send
//! ```
//!
//! Results can be saved to a directory instead of being sent by passing a path
//! where `send` is expected above.

use std::fs;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::Verbosity;
use qcpush::aero;
use qcpush::aero::Client;
use qcpush::aero::Credentials;
use qcpush::confirm;
use qcpush::confirm::Decision;
use qcpush::confirm::Policy;
use qcpush::discovery;
use qcpush::discovery::locate::Kind;
use qcpush::discovery::locate::Locator;
use qcpush::discovery::locate::Matching;
use qcpush::discovery::Candidate;
use qcpush::discovery::Filter;
use qcpush::facility::Facility;
use qcpush::flowcell;
use qcpush::flowcell::Groups;
use qcpush::happy;
use qcpush::historic;
use qcpush::qc::Document;
use qcpush::reshape::analysis::Pipeline;
use qcpush::reshape::analysis::GERMLINE_ANALYSIS_TYPE;
use qcpush::reshape::analysis::GERMLINE_NBA2_PIPELINE;
use qcpush::reshape::filter;
use qcpush::sink;
use qcpush::sink::Destination;
use qcpush::sink::SamplePayloads;
use qcpush::sink::Sink;
use tabled::builder::Builder;
use tabled::settings::object::Rows;
use tabled::settings::Alignment;
use tabled::settings::Style;
use tracing::info;
use tracing::warn;
use tracing_log::AsTrace as _;
use tracing_subscriber::EnvFilter;

////////////////////////////////////////////////////////////////////////////////////////
// Arguments
////////////////////////////////////////////////////////////////////////////////////////

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    verbose: Verbosity,
}

#[derive(Subcommand)]
enum Command {
    /// Finds QC documents below a results directory and lists them as CSV.
    Paths {
        /// The results directory (`<root>/<check>/<lab>/<NBA>/<run>/<sample>/<file>`).
        root: PathBuf,

        /// Where to write the list. Defaults to standard output.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The pipeline generation marker to keep.
        #[arg(long, default_value = discovery::DEFAULT_MARKER)]
        marker: String,

        /// A substring the file name must contain.
        #[arg(long, default_value = discovery::DEFAULT_FILE_MATCH)]
        file_match: String,
    },

    /// Finds the outputs of a sample in the lab result trees.
    Locate {
        /// The kind of output (`summary`/`s` or `vcf`/`v`).
        kind: Kind,

        /// The sample name.
        sample: String,

        /// Matches sample directories containing the name instead of equal to it.
        #[arg(short, long)]
        partial: bool,

        /// The base directory holding the lab result trees.
        #[arg(long, default_value = discovery::locate::BASE)]
        base: PathBuf,

        /// The labs to search. Defaults to every known lab.
        #[arg(long = "lab")]
        labs: Vec<String>,
    },

    /// Registers the flowcells of a candidate list.
    Flowcells {
        /// A candidate list written by `paths`.
        list: PathBuf,

        /// `send`, or a directory to save the payloads to.
        destination: Destination,

        #[command(flatten)]
        aero: AeroArgs,
    },

    /// Registers the flowcells of a candidate list and then each confirmed
    /// sample.
    Push {
        /// A candidate list written by `paths`.
        list: PathBuf,

        /// `send`, or a directory to save the payloads to.
        destination: Destination,

        /// Pushes every sample without asking.
        #[arg(short, long)]
        yes: bool,

        #[command(flatten)]
        aero: AeroArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Reshapes a single QC document into its payloads and saves them.
    Reshape {
        /// The QC document.
        document: PathBuf,

        /// The QC outcome of the sample (`passed` or `failed`).
        check: String,

        /// The directory to save the payloads to.
        output: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Summarizes the pipeline runs and samples of a registered analysis.
    Analysis {
        /// The facility, either as a lab id or as a facility name.
        facility: String,

        /// The perm id of the analysis.
        perm_id: String,

        #[command(flatten)]
        aero: AeroArgs,
    },

    /// Condenses a hap.py summary into a benchmark result row.
    HappySummary {
        /// The QC document of the benchmarked sample.
        document: PathBuf,

        /// The hap.py summary CSV.
        summary: PathBuf,

        /// The name of the benchmarked sample.
        sample_name: String,

        /// The GiaB truth set the sample was benchmarked against.
        giab_sample: String,

        /// Where to write the row. Defaults to standard output.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// A historic results file to add the row to.
        #[arg(long)]
        historic: Option<PathBuf>,
    },
}

#[derive(Args)]
struct AeroArgs {
    /// The OAuth token endpoint.
    #[arg(long, env = "AERO_TOKEN_URL", default_value = aero::TOKEN_URL)]
    token_url: String,

    /// The API base URL.
    #[arg(long, env = "AERO_API_URL", default_value = aero::API_URL)]
    api_url: String,

    /// A CA certificate to trust in addition to the system roots.
    #[arg(long, env = "AERO_CA_CERT", default_value = aero::CA_CERT)]
    ca_cert: PathBuf,

    /// Trusts only the system roots.
    #[arg(long)]
    no_ca_cert: bool,

    /// The username. Prompted for when missing.
    #[arg(long, env = "AERO_USERNAME")]
    username: Option<String>,

    /// The password. Prompted for when missing.
    #[arg(long, env = "AERO_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl AeroArgs {
    fn connect(&self) -> Result<Client> {
        let ca_cert = (!self.no_ca_cert).then(|| self.ca_cert.clone());
        let config = aero::Config::new(&self.token_url, &self.api_url).with_ca_cert(ca_cert);

        let credentials = match (&self.username, &self.password) {
            (Some(username), Some(password)) => Credentials::new(username, password),
            _ => Credentials::prompt().context("reading credentials")?,
        };

        info!("connecting to {} as {}", config.api_url(), credentials.username());
        Client::connect(config, &credentials).context("requesting an access token")
    }
}

#[derive(Args)]
struct PipelineArgs {
    /// The perm id of the analysis type to register analyses under.
    #[arg(long, default_value = GERMLINE_ANALYSIS_TYPE)]
    analysis_type: String,

    /// The perm id of the pipeline to register pipeline runs under.
    #[arg(long, default_value = GERMLINE_NBA2_PIPELINE)]
    pipeline: String,
}

impl PipelineArgs {
    fn pipeline(&self) -> Pipeline {
        Pipeline::new(&self.analysis_type, &self.pipeline)
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Helpers
////////////////////////////////////////////////////////////////////////////////////////

/// Opens the sink for `destination`. Only sending connects to the API.
fn open_sink(
    destination: &Destination,
    aero: &AeroArgs,
    pipeline: Pipeline,
) -> Result<Box<dyn Sink>> {
    match destination {
        Destination::Send => Ok(Box::new(sink::Aero::new(aero.connect()?, pipeline))),
        Destination::Save(directory) => {
            fs::create_dir_all(directory)
                .with_context(|| format!("creating {}", directory.display()))?;
            Ok(Box::new(sink::Directory::new(directory)))
        }
    }
}

/// Opens `path` for writing, or standard output.
fn writer(path: Option<&Path>) -> Result<Box<dyn io::Write>> {
    match path {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn read_list(path: &Path) -> Result<Vec<Candidate>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let candidates = discovery::read_csv(BufReader::new(file))
        .with_context(|| format!("reading candidate list {}", path.display()))?;

    if candidates.is_empty() {
        bail!("the candidate list {} is empty", path.display());
    }

    Ok(candidates)
}

fn print_candidates(candidates: &[Candidate]) {
    let mut builder = Builder::default();
    builder.push_record(["Check", "Facility", "Run", "Sample", "File"]);

    for candidate in candidates {
        builder.push_record([
            candidate.check.as_str(),
            candidate.facility.as_str(),
            candidate.shortname.as_str(),
            candidate.samplename.as_str(),
            candidate.file.as_str(),
        ]);
    }

    let table = builder
        .build()
        .with(Style::rounded())
        .modify(Rows::new(1..), Alignment::left())
        .to_string();

    eprintln!("{table}");
}

fn print_groups(groups: &Groups) {
    let mut builder = Builder::default();
    builder.push_record(["Flowcell", "Number", "Run", "Date", "Samples"]);

    for (key, group) in groups.iter() {
        builder.push_record([
            key.to_string(),
            group.flowcell_nr().to_string(),
            group.seq_run_id().to_string(),
            group.seq_run_date().to_string(),
            group.samples().len().to_string(),
        ]);
    }

    let table = builder
        .build()
        .with(Style::rounded())
        .modify(Rows::new(1..), Alignment::left())
        .to_string();

    eprintln!("{table}");
}

fn push_flowcells(candidates: &[Candidate], sink: &mut dyn Sink) -> Result<()> {
    let groups = flowcell::aggregate_paths(candidates.iter().map(|candidate| &candidate.path))
        .context("grouping flowcells")?;
    print_groups(&groups);

    for (key, group) in groups.iter() {
        sink.flowcell(key, group)
            .with_context(|| format!("registering flowcell {key}"))?;
    }

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////
// Commands
////////////////////////////////////////////////////////////////////////////////////////

fn paths(root: &Path, output: Option<&Path>, filter: &Filter) -> Result<()> {
    let candidates = discovery::find(root, filter)
        .with_context(|| format!("searching {}", root.display()))?;

    if candidates.is_empty() {
        warn!("no QC documents found below {}", root.display());
    } else {
        info!("found {} QC documents", candidates.len());
    }

    discovery::write_csv(writer(output)?, &candidates).context("writing candidate list")
}

fn locate(kind: Kind, sample: &str, matching: Matching, locator: &Locator) -> Result<()> {
    let found = locator
        .locate(kind, sample, matching)
        .with_context(|| format!("locating {sample}"))?;

    if found.is_empty() {
        bail!("no outputs found for {sample}");
    }

    let mut stdout = io::stdout().lock();
    for path in found {
        writeln!(stdout, "{}", path.display())?;
    }

    Ok(())
}

fn push(
    candidates: &[Candidate],
    sink: &mut dyn Sink,
    pipeline: &Pipeline,
    policy: &mut dyn Policy,
) -> Result<()> {
    push_flowcells(candidates, sink)?;
    print_candidates(candidates);

    let mut pushed = 0;

    for candidate in candidates {
        if policy.decide(candidate).context("confirming samples")? == Decision::Skip {
            info!("skipping {}", candidate.samplename);
            continue;
        }

        let document = Document::from_path(&candidate.path)
            .with_context(|| format!("loading {}", candidate.path))?;
        let payloads = SamplePayloads::try_new(&document, &candidate.check, pipeline)
            .with_context(|| format!("reshaping {}", candidate.path))?;

        sink.sample(&payloads)
            .with_context(|| format!("pushing {}", candidate.samplename))?;
        pushed += 1;
    }

    info!("pushed {pushed} of {} samples", candidates.len());
    Ok(())
}

fn reshape(document: &Path, check: &str, output: &Path, pipeline: &Pipeline) -> Result<()> {
    fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;
    let mut sink = sink::Directory::new(output);

    let loaded = Document::from_path(document)
        .with_context(|| format!("loading {}", document.display()))?;
    let payloads = SamplePayloads::try_new(&loaded, check, pipeline)
        .with_context(|| format!("reshaping {}", document.display()))?;

    let groups = flowcell::aggregate([(document, loaded)]).context("grouping flowcells")?;
    for (key, group) in groups.iter() {
        sink.flowcell(key, group)?;
    }

    sink.sample(&payloads)?;
    Ok(())
}

fn analysis(facility: &str, perm_id: &str, aero: &AeroArgs) -> Result<()> {
    let client = aero.connect()?;
    let facility = Facility::from_lab_id(facility);

    let value = client
        .get_analysis(&facility, perm_id)
        .with_context(|| format!("fetching analysis {perm_id}"))?;
    let analysis = serde_json::from_value::<filter::Analysis>(value)
        .with_context(|| format!("reading analysis {perm_id}"))?;

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &filter::Summary::from(&analysis))?;
    writeln!(stdout)?;

    Ok(())
}

fn happy_summary(
    document: &Path,
    summary: &Path,
    sample_name: &str,
    giab_sample: &str,
    output: Option<&Path>,
    historic: Option<&Path>,
) -> Result<()> {
    let loaded = Document::from_path(document)
        .with_context(|| format!("loading {}", document.display()))?;
    let file = File::open(summary).with_context(|| format!("opening {}", summary.display()))?;
    let happy = happy::Summary::from_reader(BufReader::new(file))
        .with_context(|| format!("reading {}", summary.display()))?;

    let date = chrono::Local::now().date_naive();
    let row = happy::Row::try_new(&loaded, happy, sample_name, giab_sample, date)
        .context("building the result row")?;

    happy::write_csv(writer(output)?, &row).context("writing the result row")?;

    if let Some(path) = historic {
        let outcome = historic::append(path, &row)
            .with_context(|| format!("updating {}", path.display()))?;
        info!("historic file {}: {outcome:?}", path.display());
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Paths {
            root,
            output,
            marker,
            file_match,
        } => paths(&root, output.as_deref(), &Filter::new(marker, file_match)),
        Command::Locate {
            kind,
            sample,
            partial,
            base,
            labs,
        } => {
            let locator = if labs.is_empty() {
                Locator::new(base, discovery::locate::LABS.iter().copied())
            } else {
                Locator::new(base, labs)
            };
            let matching = if partial {
                Matching::Partial
            } else {
                Matching::Exact
            };

            locate(kind, &sample, matching, &locator)
        }
        Command::Flowcells {
            list,
            destination,
            aero,
        } => {
            let candidates = read_list(&list)?;
            let mut sink = open_sink(&destination, &aero, Pipeline::default())?;
            push_flowcells(&candidates, sink.as_mut())
        }
        Command::Push {
            list,
            destination,
            yes,
            aero,
            pipeline,
        } => {
            let candidates = read_list(&list)?;
            let pipeline = pipeline.pipeline();
            let mut sink = open_sink(&destination, &aero, pipeline.clone())?;

            if yes {
                push(&candidates, sink.as_mut(), &pipeline, &mut confirm::All)
            } else {
                let mut prompt = confirm::Prompt::new(io::stdin().lock(), io::stderr());
                push(&candidates, sink.as_mut(), &pipeline, &mut prompt)
            }
        }
        Command::Reshape {
            document,
            check,
            output,
            pipeline,
        } => reshape(&document, &check, &output, &pipeline.pipeline()),
        Command::Analysis {
            facility,
            perm_id,
            aero,
        } => analysis(&facility, &perm_id, &aero),
        Command::HappySummary {
            document,
            summary,
            sample_name,
            giab_sample,
            output,
            historic,
        } => happy_summary(
            &document,
            &summary,
            &sample_name,
            &giab_sample,
            output.as_deref(),
            historic.as_deref(),
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_max_level(cli.verbose.log_level_filter().as_trace())
            .with_writer(io::stderr)
            .init(),
    };

    run(cli)
}
