use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::serdable::GlobPattern;
use crate::testing::runner::TestRunner;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,
    pub judge: JudgeConfig,
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Wall-clock limit per attempt, in milliseconds.
    pub time_limit_ms: u64,
    /// Compare stdout against `.out` files (otherwise only run).
    pub compare_output: bool,
    /// Exact line comparison instead of the lenient trim/skip-blank mode.
    pub strict: bool,
    /// Attempts per testcase; more than 1 gives avg/min/max timing.
    pub repeat: NonZeroUsize,
    /// Cap on rendered diff lines per WA report. TOML has no spelling for
    /// "no cap"; that is `--no-diff-limit` on the command line.
    pub max_diffs: Option<usize>,
    /// Print the raw output under a MISSING verdict.
    pub show_missing_output: bool,
    /// Testcase dir, resolved relative to the judged program's dir.
    pub testcase_dir: PathBuf,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 3000,
            compare_output: true,
            strict: false,
            repeat: NonZeroUsize::MIN,
            max_diffs: Some(10),
            show_missing_output: false,
            testcase_dir: "test_case".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub shell: PathBuf,
    /// Which files count as judgeable programs when a dir is given.
    pub include: GlobPattern,
    pub compile_before_run: bool,
    pub stdout_capture_max_bytes: usize,
    pub stderr_capture_max_bytes: usize,
    pub command: Vec<CommandConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".into(),
            include: GlobPattern::any(),
            compile_before_run: true,
            stdout_capture_max_bytes: TestRunner::DEFAULT_STDOUT_LIMIT,
            stderr_capture_max_bytes: TestRunner::DEFAULT_STDERR_LIMIT,
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    pub pattern: GlobPattern,
    pub compile: Option<String>,
    pub run: String,
}

impl RunnerConfig {
    pub fn find_command_for_filename(&self, filename: impl AsRef<str>) -> Option<&CommandConfig> {
        self.command
            .iter()
            .find(|entry| entry.pattern.matches(filename.as_ref()))
    }
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &'static str = "ojt.toml";

    pub fn example_toml() -> String {
        let file = Asset::get(Self::FILENAME).unwrap();
        std::str::from_utf8(file.data.as_ref()).unwrap().to_owned()
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file in ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// Nearest `ojt.toml` in the ancestor chain, or the built-in defaults
    /// when there is none. A file that exists but fails to parse is an error.
    pub fn from_file_finding_in_ancestors_or_default(
        cur_dir: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        match Self::find_file_in_ancestors(cur_dir) {
            Some(filepath) => Self::from_toml_file(filepath),
            None => Ok(Self::default()),
        }
    }
}
