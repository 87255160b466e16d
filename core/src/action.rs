pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::path::Path;
use std::time::Duration;

use error::*;

use crate::config::Config;
use crate::guard;
use crate::style;
use crate::testing::{
    filter_cases, Candidate, CaseSelector, Comparator, JudgeCode, TestResult, TestRunner, Testcase,
};

/// How judge results get reported as they stream in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Colored per-case verdict lines with detail blocks.
    Pretty { show_raw: bool },
    /// One JSON array on stdout at the end, nothing per-case.
    Json,
}

/// Judges `program_file` against every selected testcase in `testcase_dir`.
///
/// Fatal conditions (no testcases at all, compile failure, unreadable
/// testcase files) surface as errors; everything that goes wrong with an
/// individual run lands in that case's `TestResult` instead.
pub async fn judge(
    program_file: impl AsRef<Path>,
    testcase_dir: impl AsRef<Path>,
    selectors: &[CaseSelector],
    cfg: &Config,
    mode: ReportMode,
) -> Result<Vec<TestResult>> {
    guard::ensure_top_level()?;
    let candidate = Candidate::for_program_file(&program_file, &cfg.runner);
    judge_candidate(candidate, testcase_dir.as_ref(), selectors, cfg, mode).await
}

/// Embedded judge mode. When this process is itself a spawned candidate,
/// `solve` runs as the whole program and the process exits; otherwise the
/// current executable judges itself against the testcases.
pub async fn judge_self<F>(
    solve: F,
    testcase_dir: impl AsRef<Path>,
    selectors: &[CaseSelector],
    cfg: &Config,
    mode: ReportMode,
) -> Result<Vec<TestResult>>
where
    F: FnOnce() -> Result<()>,
{
    guard::child_takeover(solve);
    let candidate = Candidate::current_exe().context("Failed to locate current executable")?;
    judge_candidate(candidate, testcase_dir.as_ref(), selectors, cfg, mode).await
}

/// Writes an example `ojt.toml` into `dir`. Refuses when a config file
/// already governs that directory (itself or an ancestor).
pub fn init_config_file(dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let dir = dir.as_ref();
    // A relative path cannot ascend past itself; walk from the absolute form.
    let abs_dir = absolutize(dir)?;
    if let Some(config_filepath) = Config::find_file_in_ancestors(abs_dir) {
        let path = if config_filepath.is_relative() && !config_filepath.starts_with("./") {
            Path::new("./").join(config_filepath)
        } else {
            config_filepath
        };
        bail!(
            "Already configured.\nIf it's intentional, remove {:?} and then try again.",
            path
        );
    }
    fsutil::mkdir_all(dir)?;
    let config_filepath = dir.join(Config::FILENAME);
    fsutil::write_new(&config_filepath, Config::example_toml())?;
    Ok(config_filepath)
}

fn absolutize(path: &Path) -> Result<std::path::PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = std::env::current_dir().context("Failed to get current dir")?;
    Ok(cwd.join(path))
}

async fn judge_candidate(
    candidate: Candidate,
    testcase_dir: &Path,
    selectors: &[CaseSelector],
    cfg: &Config,
    mode: ReportMode,
) -> Result<Vec<TestResult>> {
    let testcases = Testcase::enumerate(testcase_dir).context("Failed to scan testcase dir")?;
    if testcases.is_empty() && selectors.is_empty() {
        bail!(
            "No testcase files (*.{}) found in {}",
            Testcase::INPUT_EXT,
            testcase_dir.display()
        );
    }
    let testcases = filter_cases(testcases, selectors);
    if testcases.is_empty() {
        log::warn!("No testcases matched the filter: {:?}", selectors);
        return Ok(Vec::new());
    }

    let runner = TestRunner::new(candidate)
        .time_limit(Duration::from_millis(cfg.judge.time_limit_ms))
        .capture_limits(
            cfg.runner.stdout_capture_max_bytes,
            cfg.runner.stderr_capture_max_bytes,
        );

    if cfg.runner.compile_before_run {
        if let Some((_, compile_cmd)) = runner.get_candidate().compile_cmd() {
            log::info!("Compiling: {}", compile_cmd);
            runner.compile().await?;
        }
    }

    let pretty = matches!(mode, ReportMode::Pretty { .. });
    let show_raw = matches!(mode, ReportMode::Pretty { show_raw: true });

    if pretty {
        style::print_run_header(&runner.get_candidate().run_display(), testcases.len());
    }
    log::info!("Running: {}", runner.get_candidate().run_display());

    let comparator = Comparator::new(cfg.judge.strict, cfg.judge.max_diffs);

    let mut results = Vec::with_capacity(testcases.len());
    for t in &testcases {
        let spinner = style::case_spinner(t.name());
        let res = judge_one(&runner, &comparator, t, cfg).await;
        spinner.lock().await.finish_and_clear();
        let res = res?;
        if pretty {
            style::print_test_result(&res, show_raw, cfg.judge.show_missing_output);
        }
        results.push(res);
    }

    match mode {
        ReportMode::Pretty { .. } => style::print_test_result_summary(&results),
        ReportMode::Json => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), &results)
                .context("Failed to emit JSON results")?;
            println!();
        }
    }
    Ok(results)
}

async fn judge_one(
    runner: &TestRunner,
    comparator: &Comparator,
    t: &Testcase,
    cfg: &Config,
) -> Result<TestResult> {
    let input = fsutil::read_to_string_lossy(t.input_path())
        .with_context(|| format!("Failed to read testcase input '{}'", t.input_path().display()))?;

    let run = runner.run_repeated(&input, cfg.judge.repeat).await;
    let mut status = run.status;
    let mut detail = run.detail;

    if status == JudgeCode::AC && cfg.judge.compare_output {
        match t.expected_path() {
            Some(expected_path) => {
                let expected = fsutil::read_to_string_lossy(expected_path).with_context(|| {
                    format!("Failed to read expected output '{}'", expected_path.display())
                })?;
                let cmp = comparator.compare(&run.stdout, &expected);
                if cmp.judge != JudgeCode::AC {
                    status = cmp.judge;
                    detail = cmp.report;
                }
            }
            None => {
                status = JudgeCode::MISSING;
                detail = format!(
                    "No expected output file '{}.{}'",
                    t.name(),
                    Testcase::EXPECTED_EXT
                );
            }
        }
    }

    Ok(TestResult {
        name: t.name().to_owned(),
        status,
        times: run.times,
        stdout: run.stdout,
        detail,
    })
}
