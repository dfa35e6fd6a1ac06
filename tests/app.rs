use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use koeken::app::{App, EventKind, ProgressEvent, ProgressSink};
use koeken::config::RunConfig;
use koeken::error::KoekenError;
use koeken::layout::RootStatus;
use koeken::tools::{Invocation, Tool, ToolOutput, ToolRunner, ToolSet};

const MAP: &str = "#SampleID\tGroup\tSeason.name\tSex\n\
S1\tCON\tFall\tM\n\
S2\tSTAT\tFall\tF\n\
S3\tOTHER\tFall\tM\n\
S4\tCON\tSpring\tF\n\
S5\tSTAT\tSpring\tM\n\
S6\tCON\tFall\tF\n";

const SUMMARY: &str = "#SampleID\tGroup\tSeason.name\tSex\t\
k__Bacteria|p__Firmicutes\tk__Bacteria|p__Bacteroidetes\n\
S1\tCON\tFall\tM\t0.61\t0.39\n\
S2\tSTAT\tFall\tF\t0.52\t0.48\n\
S3\tOTHER\tFall\tM\t0.10\t0.90\n\
S4\tCON\tSpring\tF\t0.70\t0.30\n\
S5\tSTAT\tSpring\tM\t0.25\t0.75\n\
S6\tCON\tFall\tF\t0.66\t0.34\n";

/// Stands in for the QIIME and LEfSe scripts: records each invocation and
/// writes the file the real script would have produced.
#[derive(Default)]
struct MockTools {
    calls: Mutex<Vec<Invocation>>,
    skip_summary: bool,
    summary: Option<&'static str>,
    fail: Option<Tool>,
    results: HashMap<String, String>,
}

impl MockTools {
    fn with_results() -> Self {
        let mut results = HashMap::new();
        results.insert(
            "Fall".to_string(),
            "k__Bacteria.p__Firmicutes\t4.9\tCON\t3.5\t0.01\n\
             k__Bacteria.p__Bacteroidetes\t4.1\t\t\t-\n"
                .to_string(),
        );
        results.insert(
            "Spring".to_string(),
            "k__Bacteria.p__Firmicutes\t4.9\t\t\t-\n\
             k__Bacteria.p__Bacteroidetes\t4.1\tSTAT\t2.25\t0.03\n"
                .to_string(),
        );
        Self {
            results,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> &'a str {
    let idx = args.iter().position(|arg| arg == flag).unwrap();
    &args[idx + 1]
}

impl ToolRunner for MockTools {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, KoekenError> {
        self.calls.lock().unwrap().push(invocation.clone());
        if self.fail == Some(invocation.tool) {
            return Err(KoekenError::ToolFailed {
                tool: invocation.tool.to_string(),
                status: "exit status: 1".to_string(),
                message: "mock failure".to_string(),
            });
        }
        let args = &invocation.args;
        match invocation.tool {
            Tool::SummarizeTaxa => {
                if !self.skip_summary {
                    let stem = Path::new(flag_value(args, "-i")).file_stem().unwrap().to_owned();
                    let out = Path::new(flag_value(args, "-o")).join(format!(
                        "{}_L{}.txt",
                        stem.to_string_lossy(),
                        flag_value(args, "-L")
                    ));
                    fs::write(out, self.summary.unwrap_or(SUMMARY)).unwrap();
                }
            }
            Tool::FormatInput => {
                fs::copy(&args[0], &args[1]).unwrap();
            }
            Tool::RunLefse => {
                let stem = Path::new(&args[1]).file_stem().unwrap().to_string_lossy().to_string();
                let content = self.results.get(&stem).cloned().unwrap_or_default();
                fs::write(&args[1], content).unwrap();
            }
        }
        Ok(ToolOutput::default())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind == EventKind::Warning)
            .map(|event| event.message.clone())
            .collect()
    }

    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        Self::with_map(MAP)
    }

    fn with_map(map: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("map.txt"), map).unwrap();
        fs::write(root.join("otu_table.biom"), "{}").unwrap();
        Self { _dir: dir, root }
    }

    fn config(&self) -> RunConfig {
        let mut config = RunConfig::new(
            self.root.join("otu_table.biom"),
            self.root.join("out"),
            self.root.join("map.txt"),
            "Group",
            "Season.name",
        );
        config.compare = Some(vec!["CON".to_string(), "STAT".to_string()]);
        config
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join("out").join(relative)).unwrap()
    }
}

fn tool_set() -> ToolSet {
    ToolSet {
        summarize_taxa: PathBuf::from("summarize_taxa.py"),
        format_input: PathBuf::from("format_input.py"),
        run_lefse: PathBuf::from("run_lefse.py"),
    }
}

#[test]
fn splits_by_timepoint_and_drops_other_classes() {
    let fixture = Fixture::new();
    let app = App::new(tool_set(), MockTools::default());
    let sink = RecordingSink::default();

    let summary = app.run(&fixture.config(), &sink).unwrap();

    assert_eq!(summary.output_status, RootStatus::Created);
    assert_eq!(summary.filtered_out, 1);
    let groups = summary
        .partitions
        .iter()
        .map(|partition| partition.group.as_str())
        .collect::<Vec<_>>();
    assert_eq!(groups, ["Fall", "Spring"]);

    assert_eq!(
        fixture.read("summarize_taxa_L6/Fall_input.txt"),
        "#SampleID\tGroup\tk__Bacteria|p__Firmicutes\tk__Bacteria|p__Bacteroidetes\n\
         S1\tCON\t0.61\t0.39\n\
         S2\tSTAT\t0.52\t0.48\n\
         S6\tCON\t0.66\t0.34\n"
    );
    assert_eq!(
        fixture.read("summarize_taxa_L6/Spring_input.txt"),
        "#SampleID\tGroup\tk__Bacteria|p__Firmicutes\tk__Bacteria|p__Bacteroidetes\n\
         S4\tCON\t0.70\t0.30\n\
         S5\tSTAT\t0.25\t0.75\n"
    );
    assert!(fixture.root.join("out/lefse_output/format_lefse/Fall_format.txt").is_file());
    assert!(fixture.root.join("out/lefse_output/run_lefse/Spring.txt").is_file());
    assert!(!fixture.root.join("out/lefse_output/pretty_lefse").exists());
    assert_eq!(sink.messages().last().map(String::as_str), Some("Analysis Completed."));
}

#[test]
fn partitions_cover_filtered_rows_exactly_once() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.compare = None;
    let app = App::new(tool_set(), MockTools::default());

    let summary = app.run(&config, &RecordingSink::default()).unwrap();

    let mut samples = summary
        .partitions
        .iter()
        .flat_map(|partition| {
            fs::read_to_string(partition.input.as_std_path())
                .unwrap()
                .lines()
                .skip(1)
                .map(|line| line.split('\t').next().unwrap().to_string())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    samples.sort();
    assert_eq!(samples, ["S1", "S2", "S3", "S4", "S5", "S6"]);
    assert_eq!(summary.partitions.iter().map(|p| p.samples).sum::<usize>(), 6);
}

#[test]
fn format_flags_follow_subclass_setting() {
    let fixture = Fixture::new();
    let mut config = fixture.config();

    let app = App::new(tool_set(), MockTools::default());
    app.run(&config, &RecordingSink::default()).unwrap();
    let without = app_calls(&app);

    config.subclass_column = Some("Sex".to_string());
    config.output = fixture.root.join("out-subclass");
    let app = App::new(tool_set(), MockTools::default());
    app.run(&config, &RecordingSink::default()).unwrap();
    let with = app_calls(&app);

    let tools = without.iter().map(|call| call.tool).collect::<Vec<_>>();
    assert_eq!(
        tools,
        [
            Tool::SummarizeTaxa,
            Tool::FormatInput,
            Tool::RunLefse,
            Tool::FormatInput,
            Tool::RunLefse
        ]
    );
    assert_eq!(
        without[0].args[6..],
        ["-L", "6", "-d", "|"].map(String::from)
    );
    assert_eq!(
        without[1].args[2..],
        ["-u", "1", "-c", "2", "-o", "1000000", "-f", "c"].map(String::from)
    );
    assert_eq!(
        with[1].args[2..],
        ["-u", "1", "-c", "2", "-s", "3", "-o", "1000000", "-f", "c"].map(String::from)
    );
    assert_eq!(
        without[2].args[2..],
        ["-a", "0.05", "-l", "2", "-y", "0"].map(String::from)
    );

    let fall_input =
        fs::read_to_string(fixture.root.join("out-subclass/summarize_taxa_L6/Fall_input.txt"))
            .unwrap();
    assert!(fall_input.starts_with("#SampleID\tGroup\tSex\tk__Bacteria|p__Firmicutes\t"));
}

fn app_calls(app: &App<MockTools>) -> Vec<Invocation> {
    app.runner().calls()
}

#[test]
fn rerun_is_byte_identical_and_warns() {
    let fixture = Fixture::new();
    let config = fixture.config();
    let app = App::new(tool_set(), MockTools::with_results());

    let first_sink = RecordingSink::default();
    app.run(&config, &first_sink).unwrap();
    assert!(first_sink.warnings().is_empty());
    let first = [
        fixture.read("summarize_taxa_L6/Fall_input.txt"),
        fixture.read("lefse_output/format_lefse/Fall_format.txt"),
        fixture.read("lefse_output/run_lefse/Fall.txt"),
    ];

    let second_sink = RecordingSink::default();
    let summary = app.run(&config, &second_sink).unwrap();
    assert_eq!(summary.output_status, RootStatus::Existing);
    assert!(second_sink.warnings()[0].contains("already exists"));
    let second = [
        fixture.read("summarize_taxa_L6/Fall_input.txt"),
        fixture.read("lefse_output/format_lefse/Fall_format.txt"),
        fixture.read("lefse_output/run_lefse/Fall.txt"),
    ];
    assert_eq!(first, second);
}

#[test]
fn unknown_column_fails_before_any_tool_runs() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.class_column = "Treatment".to_string();
    let app = App::new(tool_set(), MockTools::default());

    let err = app.run(&config, &RecordingSink::default()).unwrap_err();

    assert_matches!(err, KoekenError::MissingColumn { ref column, .. } if column == "Treatment");
    assert!(app_calls(&app).is_empty());
    assert!(!fixture.root.join("out").exists());
}

#[test]
fn tool_failure_aborts_the_run() {
    let fixture = Fixture::new();
    let tools = MockTools {
        fail: Some(Tool::FormatInput),
        ..MockTools::default()
    };
    let app = App::new(tool_set(), tools);

    let err = app.run(&fixture.config(), &RecordingSink::default()).unwrap_err();

    assert_matches!(err, KoekenError::ToolFailed { .. });
    let tools = app_calls(&app).iter().map(|call| call.tool).collect::<Vec<_>>();
    assert_eq!(tools, [Tool::SummarizeTaxa, Tool::FormatInput]);
}

#[test]
fn missing_summary_output_is_reported() {
    let fixture = Fixture::new();
    let tools = MockTools {
        skip_summary: true,
        ..MockTools::default()
    };
    let app = App::new(tool_set(), tools);

    let err = app.run(&fixture.config(), &RecordingSink::default()).unwrap_err();

    assert_matches!(
        err,
        KoekenError::SummaryMissing(ref path) if path.ends_with("otu_table_L6.txt")
    );
}

#[test]
fn pretty_table_spans_timepoints() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.pretty = true;
    let app = App::new(tool_set(), MockTools::with_results());

    let summary = app.run(&config, &RecordingSink::default()).unwrap();

    assert!(summary.pretty_table.is_some());
    assert_eq!(
        fixture.read("lefse_output/pretty_lefse/pretty_table.txt"),
        "Feature\tFall\tSpring\n\
         k__Bacteria.p__Bacteroidetes\t0\t-2.25\n\
         k__Bacteria.p__Firmicutes\t3.5\t0\n"
    );
}

const TWO_CLASS_MAP: &str = "#SampleID\tGroup\tSeason.name\n\
S1\tCON\tFall\n\
S2\tSTAT\tFall\n\
S3\tCON\tSpring\n\
S4\tSTAT\tSpring\n";

const TWO_CLASS_SUMMARY: &str = "#SampleID\tGroup\tSeason.name\tk__Bacteria|p__Firmicutes\n\
S1\tCON\tFall\t0.61\n\
S2\tSTAT\tFall\t0.52\n\
S3\tCON\tSpring\t0.70\n\
S4\tSTAT\tSpring\t0.25\n";

#[test]
fn pretty_table_keeps_class_without_enriched_features() {
    let fixture = Fixture::with_map(TWO_CLASS_MAP);
    let mut config = fixture.config();
    config.compare = None;
    config.pretty = true;
    let mut tools = MockTools {
        summary: Some(TWO_CLASS_SUMMARY),
        ..MockTools::default()
    };
    tools.results.insert(
        "Fall".to_string(),
        "k__Bacteria.p__Firmicutes\t4.9\tCON\t2.5\t0.01\n".to_string(),
    );
    tools.results.insert(
        "Spring".to_string(),
        "k__Bacteria.p__Firmicutes\t4.9\t\t\t-\n".to_string(),
    );
    let app = App::new(tool_set(), tools);

    let summary = app.run(&config, &RecordingSink::default()).unwrap();

    assert!(summary.pretty_table.is_some());
    assert_eq!(
        fixture.read("lefse_output/pretty_lefse/pretty_table.txt"),
        "Feature\tFall\tSpring\n\
         k__Bacteria.p__Firmicutes\t2.5\t0\n"
    );
}

#[test]
fn pretty_without_partitions_is_skipped() {
    let map = "#SampleID\tGroup\tSeason.name\nS1\tCON\tNA\nS2\tSTAT\tNA\n";
    let summary_table = "#SampleID\tGroup\tSeason.name\tk__Bacteria|p__Firmicutes\n\
        S1\tCON\tNA\t0.61\n\
        S2\tSTAT\tNA\t0.52\n";
    let fixture = Fixture::with_map(map);
    let mut config = fixture.config();
    config.compare = None;
    config.pretty = true;
    let tools = MockTools {
        summary: Some(summary_table),
        ..MockTools::default()
    };
    let app = App::new(tool_set(), tools);
    let sink = RecordingSink::default();

    let summary = app.run(&config, &sink).unwrap();

    assert_eq!(summary.unlabelled, 2);
    assert!(summary.partitions.is_empty());
    assert!(summary.pretty_table.is_none());
    assert!(sink.warnings().iter().any(|warning| warning.contains("pretty table skipped")));
}
