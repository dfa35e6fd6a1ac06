use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8Path;
use tracing::debug;

use crate::config::{RunConfig, ToolsConfig};
use crate::error::KoekenError;

/// Trailing stderr lines kept in a [`KoekenError::ToolFailed`] message.
const STDERR_TAIL: usize = 20;

/// LEfSe's `-o` normalization value: features are scaled so each sample sums
/// to one million.
pub const FORMAT_NORMALIZATION: &str = "1000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    SummarizeTaxa,
    FormatInput,
    RunLefse,
}

impl Tool {
    pub fn script(self) -> &'static str {
        match self {
            Tool::SummarizeTaxa => "summarize_taxa.py",
            Tool::FormatInput => "format_input.py",
            Tool::RunLefse => "run_lefse.py",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script())
    }
}

/// One external command: which tool, the executable used for it and argv.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait ToolRunner {
    /// Runs the command to completion. A non-zero exit is an error.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, KoekenError>;
}

/// Runs invocations as child processes of this one.
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, KoekenError> {
        debug!(command = %invocation.command_line(), "spawning");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|err| KoekenError::ToolFailed {
                tool: invocation.tool.to_string(),
                status: "spawn error".to_string(),
                message: err.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            return Ok(ToolOutput { stdout, stderr });
        }

        let tail = stderr_tail(&stderr);
        let message = if tail.is_empty() {
            format!("command failed: {}", invocation.command_line())
        } else {
            tail
        };
        Err(KoekenError::ToolFailed {
            tool: invocation.tool.to_string(),
            status: output.status.to_string(),
            message,
        })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines = stderr.trim().lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL);
    lines[start..].join("\n")
}

/// Resolved executables for the three pipeline stages.
#[derive(Debug, Clone)]
pub struct ToolSet {
    pub summarize_taxa: PathBuf,
    pub format_input: PathBuf,
    pub run_lefse: PathBuf,
}

impl ToolSet {
    /// Configured paths win; otherwise each script is looked up on `PATH`
    /// and then in the working directory.
    pub fn resolve(config: &ToolsConfig) -> Result<Self, KoekenError> {
        Ok(Self {
            summarize_taxa: resolve_tool(Tool::SummarizeTaxa, config.summarize_taxa.as_deref())?,
            format_input: resolve_tool(Tool::FormatInput, config.format_input.as_deref())?,
            run_lefse: resolve_tool(Tool::RunLefse, config.run_lefse.as_deref())?,
        })
    }

    pub fn summarize(&self, config: &RunConfig, summarize_dir: &Utf8Path) -> Invocation {
        Invocation {
            tool: Tool::SummarizeTaxa,
            program: self.summarize_taxa.clone(),
            args: vec![
                "-i".to_string(),
                config.input.to_string(),
                "-o".to_string(),
                summarize_dir.to_string(),
                "-m".to_string(),
                config.map.to_string(),
                "-L".to_string(),
                config.level.to_string(),
                "-d".to_string(),
                "|".to_string(),
            ],
        }
    }

    /// Subject is column 1 and class column 2; with a subclass it is column 3.
    pub fn format(&self, config: &RunConfig, input: &Utf8Path, output: &Utf8Path) -> Invocation {
        let mut args = vec![
            input.to_string(),
            output.to_string(),
            "-u".to_string(),
            "1".to_string(),
            "-c".to_string(),
            "2".to_string(),
        ];
        if config.subclass_column.is_some() {
            args.push("-s".to_string());
            args.push("3".to_string());
        }
        args.extend([
            "-o".to_string(),
            FORMAT_NORMALIZATION.to_string(),
            "-f".to_string(),
            "c".to_string(),
        ]);
        Invocation {
            tool: Tool::FormatInput,
            program: self.format_input.clone(),
            args,
        }
    }

    pub fn lefse(&self, config: &RunConfig, input: &Utf8Path, output: &Utf8Path) -> Invocation {
        Invocation {
            tool: Tool::RunLefse,
            program: self.run_lefse.clone(),
            args: vec![
                input.to_string(),
                output.to_string(),
                "-a".to_string(),
                config.p_cutoff.to_string(),
                "-l".to_string(),
                config.lda_cutoff.to_string(),
                "-y".to_string(),
                config.strictness.as_flag().to_string(),
            ],
        }
    }
}

fn resolve_tool(tool: Tool, configured: Option<&Path>) -> Result<PathBuf, KoekenError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(KoekenError::MissingTool(format!(
            "{tool} (configured as {})",
            path.display()
        )));
    }
    if let Some(path) = find_in_path(tool.script()) {
        return Ok(path);
    }
    let local = Path::new(".").join(tool.script());
    if local.is_file() {
        return Ok(local);
    }
    Err(KoekenError::MissingTool(tool.to_string()))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
