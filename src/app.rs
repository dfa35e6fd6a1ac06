use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::KoekenError;
use crate::layout::{OutputLayout, RootStatus};
use crate::pretty::{self, PrettyTable};
use crate::split::{Partition, TableSplitter};
use crate::table::TsvTable;
use crate::tools::{Invocation, ToolRunner, ToolSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Progress,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: Utf8PathBuf,
    pub output_status: RootStatus,
    pub summary_table: Utf8PathBuf,
    pub filtered_out: usize,
    pub unlabelled: usize,
    pub partitions: Vec<PartitionResult>,
    pub pretty_table: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionResult {
    pub group: String,
    pub samples: usize,
    pub input: Utf8PathBuf,
    pub formatted: Utf8PathBuf,
    pub result: Utf8PathBuf,
}

/// Prepared output tree for one run.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub layout: OutputLayout,
    pub status: RootStatus,
}

pub struct App<T: ToolRunner> {
    tools: ToolSet,
    runner: T,
}

impl<T: ToolRunner> App<T> {
    pub fn new(tools: ToolSet, runner: T) -> Self {
        Self { tools, runner }
    }

    pub fn runner(&self) -> &T {
        &self.runner
    }

    /// Validates the mapping header and builds the output tree.
    pub fn prepare(
        &self,
        config: &RunConfig,
        sink: &dyn ProgressSink,
    ) -> Result<PreparedRun, KoekenError> {
        config.validate_against_map()?;

        let layout = OutputLayout::new(config.output.clone(), config.level);
        let status = layout.prepare(config.pretty)?;
        if status == RootStatus::Existing {
            warn!(output = %layout.root(), "output folder already exists");
            sink.event(ProgressEvent::warning(
                "Output folder already exists. Warning: Errors may be produced.",
            ));
            sink.event(ProgressEvent::warning(
                "Please delete or change output folder before running again!",
            ));
        }
        Ok(PreparedRun { layout, status })
    }

    pub fn run(
        &self,
        config: &RunConfig,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, KoekenError> {
        let prepared = self.prepare(config, sink)?;
        self.run_prepared(config, &prepared, sink)
    }

    /// Summarize, split, then format and analyze each partition in order.
    pub fn run_prepared(
        &self,
        config: &RunConfig,
        prepared: &PreparedRun,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, KoekenError> {
        let layout = &prepared.layout;
        let summary_table = self.summarize(config, layout, sink)?;

        let summary = TsvTable::read(summary_table.as_std_path())?;
        let map_width = TsvTable::read_headers(config.map.as_std_path())?.len();
        let outcome = TableSplitter::new(config).split(&summary, map_width)?;
        if outcome.filtered_out > 0 {
            info!(rows = outcome.filtered_out, "dropped samples outside the compared classes");
        }
        if outcome.unlabelled > 0 {
            warn!(
                rows = outcome.unlabelled,
                column = %config.split_column,
                "samples without a split value are skipped"
            );
            sink.event(ProgressEvent::warning(format!(
                "{} sample(s) have no {} value and were skipped.",
                outcome.unlabelled, config.split_column
            )));
        }
        if outcome.partitions.is_empty() {
            warn!("no samples left to analyze");
            sink.event(ProgressEvent::warning("No samples left to analyze."));
        }

        let mut partitions = Vec::with_capacity(outcome.partitions.len());
        for partition in &outcome.partitions {
            partitions.push(self.analyze(config, layout, partition, sink)?);
        }

        let pretty_table = if config.pretty {
            self.pretty(config, layout, &outcome.partitions, sink)?
        } else {
            None
        };

        sink.event(ProgressEvent::progress("Analysis Completed."));
        Ok(RunSummary {
            output: layout.root().to_path_buf(),
            output_status: prepared.status,
            summary_table,
            filtered_out: outcome.filtered_out,
            unlabelled: outcome.unlabelled,
            partitions,
            pretty_table,
        })
    }

    fn summarize(
        &self,
        config: &RunConfig,
        layout: &OutputLayout,
        sink: &dyn ProgressSink,
    ) -> Result<Utf8PathBuf, KoekenError> {
        sink.event(ProgressEvent::progress("Running QIIME's summarize_taxa.py..."));
        let invocation = self.tools.summarize(config, &layout.summarize_dir());
        let elapsed = self.invoke(&invocation)?;

        let expected = layout.summary_path(&config.input);
        if !expected.as_std_path().is_file() {
            return Err(KoekenError::SummaryMissing(expected.into_std_path_buf()));
        }
        sink.event(
            ProgressEvent::progress(format!("Summarized table: {expected}")).with_elapsed(elapsed),
        );
        Ok(expected)
    }

    fn analyze(
        &self,
        config: &RunConfig,
        layout: &OutputLayout,
        partition: &Partition,
        sink: &dyn ProgressSink,
    ) -> Result<PartitionResult, KoekenError> {
        let input = partition.write_input(layout)?;
        let formatted = layout.format_path(&partition.group);
        let result = layout.result_path(&partition.group);

        sink.event(ProgressEvent::progress(format!("Timepoint: {}", partition.group)));
        sink.event(ProgressEvent::progress("Formatting Table..."));
        sink.event(ProgressEvent::progress(format!("Formatting Input: {input}")));
        sink.event(ProgressEvent::progress(format!("Formatting Output: {formatted}")));
        let elapsed = self.invoke(&self.tools.format(config, &input, &formatted))?;
        sink.event(ProgressEvent::progress("Formatting done.").with_elapsed(elapsed));

        sink.event(ProgressEvent::progress("Running Analysis..."));
        sink.event(ProgressEvent::progress(format!("Analysis Input: {formatted}")));
        sink.event(ProgressEvent::progress(format!("Analysis Output: {result}")));
        let elapsed = self.invoke(&self.tools.lefse(config, &formatted, &result))?;
        sink.event(ProgressEvent::progress("Analysis done.").with_elapsed(elapsed));

        Ok(PartitionResult {
            group: partition.group.as_str().to_string(),
            samples: partition.table.rows().len(),
            input,
            formatted,
            result,
        })
    }

    fn pretty(
        &self,
        config: &RunConfig,
        layout: &OutputLayout,
        partitions: &[Partition],
        sink: &dyn ProgressSink,
    ) -> Result<Option<Utf8PathBuf>, KoekenError> {
        if partitions.is_empty() {
            warn!("no partitions, pretty table skipped");
            sink.event(ProgressEvent::warning("No timepoints to tabulate; pretty table skipped."));
            return Ok(None);
        }

        sink.event(ProgressEvent::progress("Building pretty LEfSe table..."));
        let results = partitions
            .iter()
            .map(|partition| {
                let path = layout.result_path(&partition.group);
                pretty::parse_results(path.as_std_path())
                    .map(|records| (partition.group.clone(), records))
            })
            .collect::<Result<Vec<_>, KoekenError>>()?;

        // Every sampled class counts, enriched or not.
        let classes = match &config.compare {
            Some(values) => values.clone(),
            None => partitions
                .iter()
                .flat_map(|partition| partition.table.rows())
                .map(|row| row[1].clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let table = PrettyTable::build(&results, Some(&classes))?;
        let path = layout.pretty_table_path();
        table.write(path.as_std_path())?;
        sink.event(ProgressEvent::progress(format!("Pretty table: {path}")));
        Ok(Some(path))
    }

    fn invoke(&self, invocation: &Invocation) -> Result<Duration, KoekenError> {
        info!(tool = %invocation.tool, "running");
        let started = Instant::now();
        self.runner.run(invocation)?;
        Ok(started.elapsed())
    }
}
