use std::ffi::OsString;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use koeken::app::{App, ProgressSink, RunSummary};
use koeken::config::{ConfigLoader, DEFAULT_SUBJECT_COLUMN, RunConfig};
use koeken::domain::{self, Strictness, TaxonLevel};
use koeken::error::KoekenError;
use koeken::output::{BufferedSink, ConsoleSink, JsonOutput, LogFileSink, QuietSink};
use koeken::tools::{SystemToolRunner, ToolRunner, ToolSet};

const DESCRIPTION: &str =
    "Linear Discriminant Analysis (LEfSe) on A Longitudinal Microbial Dataset.";

/// Multi-letter single-dash flags accepted by koeken 0.1.
const LEGACY_FLAGS: [(&str, &str); 6] = [
    ("-cl", "--class"),
    ("-sc", "--subclass"),
    ("-su", "--subject"),
    ("-str", "--strict"),
    ("-sp", "--split"),
    ("-py", "--pretty"),
];

#[derive(Parser)]
#[command(name = "koeken")]
#[command(about = "Performs Linear Discriminant Analysis (LEfSe) on a longitudinal dataset")]
#[command(version, author, disable_version_flag = true)]
struct Cli {
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    #[arg(short = 'i', long, help = "OTU table for the main analysis (.biom)")]
    input: String,

    #[arg(short = 'o', long, help = "Folder for all resulting files, created if missing")]
    output: String,

    #[arg(short = 'm', long, help = "Mapping file associated with the OTU table")]
    map: String,

    #[arg(
        short = 'l',
        long,
        default_value_t = 6,
        value_parser = clap::value_parser!(u8).range(2..=7),
        help = "Level for summarize_taxa.py"
    )]
    level: u8,

    #[arg(long = "class", help = "Mapping column holding the class to compare")]
    class: String,

    #[arg(long, help = "Mapping column holding the subclass (NA for none)")]
    subclass: Option<String>,

    #[arg(
        long,
        default_value = DEFAULT_SUBJECT_COLUMN,
        help = "Mapping column holding the sample id"
    )]
    subject: String,

    #[arg(
        short = 'p',
        long,
        default_value = "0.05",
        value_parser = alpha_arg,
        help = "Alpha for the Kruskal-Wallis test"
    )]
    pval: f64,

    #[arg(
        short = 'e',
        long,
        default_value = "2.0",
        value_parser = effect_arg,
        help = "Cutoff for the logarithmic LDA score"
    )]
    effect: f64,

    #[arg(
        long,
        value_enum,
        default_value = "0",
        help = "0 = one-against-all (stricter), 1 = one-against-one"
    )]
    strict: Strictness,

    #[arg(short = 'c', long, num_args = 1.., help = "Class values to keep (default: all)")]
    compare: Option<Vec<String>>,

    #[arg(long, help = "Timepoint column; the table is split on each of its values")]
    split: String,

    #[arg(long, help = "Build a table of LDA scores across all timepoints (two classes only)")]
    pretty: bool,

    #[arg(
        long,
        help = "JSON file with summarize_taxa.py, format_input.py and run_lefse.py paths"
    )]
    tools: Option<String>,

    #[arg(long, help = "Print a JSON run summary instead of progress lines")]
    json: bool,

    #[arg(long, help = "Do not write koeken_log.txt into the output folder")]
    no_log: bool,
}

impl Cli {
    fn run_config(&self) -> miette::Result<RunConfig> {
        let compare = self
            .compare
            .clone()
            .filter(|values| !(values.len() == 1 && values[0] == domain::NOT_SET));
        Ok(RunConfig {
            input: Utf8PathBuf::from(&self.input),
            output: Utf8PathBuf::from(&self.output),
            map: Utf8PathBuf::from(&self.map),
            level: TaxonLevel::new(self.level)?,
            class_column: self.class.clone(),
            subclass_column: domain::optional_value(self.subclass.clone()),
            subject_column: self.subject.clone(),
            compare,
            split_column: self.split.clone(),
            p_cutoff: self.pval,
            lda_cutoff: self.effect,
            strictness: self.strict,
            pretty: self.pretty,
        })
    }
}

fn alpha_arg(value: &str) -> Result<f64, String> {
    domain::parse_alpha(value).map_err(|err| err.to_string())
}

fn effect_arg(value: &str) -> Result<f64, String> {
    domain::parse_threshold("effect size", value).map_err(|err| err.to_string())
}

fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            LEGACY_FLAGS
                .iter()
                .find(|(legacy, _)| arg.to_str() == Some(*legacy))
                .map(|(_, long)| OsString::from(*long))
                .unwrap_or(arg)
        })
        .collect()
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(koeken) = report.downcast_ref::<KoekenError>() {
            return ExitCode::from(map_exit_code(koeken));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KoekenError) -> u8 {
    match error {
        KoekenError::InvalidLevel(_)
        | KoekenError::InvalidStrictness(_)
        | KoekenError::InvalidThreshold { .. }
        | KoekenError::MissingColumn { .. }
        | KoekenError::ConfigRead(_)
        | KoekenError::ConfigParse(_) => 2,
        KoekenError::MissingTool(_)
        | KoekenError::ToolFailed { .. }
        | KoekenError::SummaryMissing(_) => 3,
        _ => 1,
    }
}

fn print_banner() {
    println!(
        "Koeken v{}: {DESCRIPTION}",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("LEfSe Credits: \"Metagenomic biomarker discovery and explanation\"");
    println!(
        "Nicola Segata, Jacques Izard, Levi Waldron, Dirk Gevers, Larisa Miropolsky, \
         Wendy S Garrett, and Curtis Huttenhower"
    );
    println!("Genome Biology, 12:R60, 2011");
    println!();
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));
    if !cli.json {
        print_banner();
    }

    let config = cli.run_config()?;
    let tools = ToolSet::resolve(&ConfigLoader::resolve(cli.tools.as_deref())?)?;
    let app = App::new(tools, SystemToolRunner);

    let summary = if cli.json {
        execute(&app, &config, QuietSink, cli.no_log)?
    } else {
        execute(&app, &config, ConsoleSink, cli.no_log)?
    };

    if cli.json {
        JsonOutput::print_summary(&summary)
            .map_err(|err| KoekenError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// The log lives inside the output folder, so events raised while creating
/// it are held back and replayed once the log is open.
fn execute<T: ToolRunner, S: ProgressSink>(
    app: &App<T>,
    config: &RunConfig,
    console: S,
    no_log: bool,
) -> Result<RunSummary, KoekenError> {
    let buffer = BufferedSink::new();
    let prepared = app.prepare(config, &buffer);
    if no_log {
        buffer.replay(&console);
        return app.run_prepared(config, &prepared?, &console);
    }
    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            buffer.replay(&console);
            return Err(err);
        }
    };
    let sink = LogFileSink::open(&prepared.layout.log_path(), console)?;
    buffer.replay(&sink);
    app.run_prepared(config, &prepared, &sink)
}
