use std::{
    ffi::OsStr,
    io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::{bail, Context};
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _},
    process::{Child, ChildStdin, Command},
};

use super::result::*;
use crate::config::RunnerConfig;
use crate::guard;

/// How the program under judgement gets launched.
#[derive(Debug, Clone)]
enum Launch {
    /// Spawn the program file itself, no arguments.
    Direct(PathBuf),
    /// Spawn `shell -c run`, optionally after a compile step.
    Shell {
        shell: PathBuf,
        compile: Option<String>,
        run: String,
    },
}

/// A runnable candidate: launch recipe plus working dir.
#[derive(Debug, Clone)]
pub struct Candidate {
    work_dir: Option<PathBuf>,
    launch: Launch,
}

impl Candidate {
    /// A directly executable program. Runs with the program's own dir as
    /// working dir, so solutions can read sibling files.
    pub fn direct(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            work_dir: parent_dir(&program),
            launch: Launch::Direct(program),
        }
    }

    /// A raw `shell -c cmdline` candidate with inherited working dir.
    pub fn shell_command(shell: impl Into<PathBuf>, run: impl Into<String>) -> Self {
        Self {
            work_dir: None,
            launch: Launch::Shell {
                shell: shell.into(),
                compile: None,
                run: run.into(),
            },
        }
    }

    /// Resolves the launch recipe for `program` from the `[[runner.command]]`
    /// table: the first entry whose glob matches the file name wins, with
    /// `{file}` `{dir}` `{name}` `{stem}` interpolated into its commands.
    /// No matching entry means the file is expected to be executable as-is.
    pub fn for_program_file(program: impl AsRef<Path>, cfg: &RunnerConfig) -> Self {
        let program = program.as_ref();
        let filename = program
            .file_name()
            .unwrap_or(program.as_os_str())
            .to_string_lossy();
        let Some(entry) = cfg.find_command_for_filename(&filename) else {
            return Self::direct(program);
        };
        Self {
            work_dir: parent_dir(program),
            launch: Launch::Shell {
                shell: cfg.shell.clone(),
                compile: entry.compile.as_deref().map(|c| interpolate(c, program)),
                run: interpolate(&entry.run, program),
            },
        }
    }

    /// The currently running executable, for the embedded judge mode.
    /// Keeps the inherited working dir.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self {
            work_dir: None,
            launch: Launch::Direct(std::env::current_exe()?),
        })
    }

    /// Attaches a compile command. Only meaningful for shell candidates.
    pub fn with_compile_cmd(mut self, cmd: impl Into<String>) -> Self {
        if let Launch::Shell { compile, .. } = &mut self.launch {
            *compile = Some(cmd.into());
        }
        self
    }

    pub fn compile_cmd(&self) -> Option<(&Path, &str)> {
        match &self.launch {
            Launch::Shell {
                shell,
                compile: Some(cmd),
                ..
            } => Some((shell, cmd)),
            _ => None,
        }
    }

    /// Human-readable run command, for logs and spawn failure messages.
    pub fn run_display(&self) -> String {
        match &self.launch {
            Launch::Direct(program) => program.display().to_string(),
            Launch::Shell { run, .. } => run.clone(),
        }
    }
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_owned)
}

fn interpolate(template: &str, program: &Path) -> String {
    let dir = program.parent().unwrap_or(Path::new("."));
    let name = program.file_name().unwrap_or(program.as_os_str());
    let stem = program.file_stem().unwrap_or(OsStr::new(""));
    template
        .replace("{file}", &program.to_string_lossy())
        .replace("{dir}", &dir.to_string_lossy())
        .replace("{name}", &name.to_string_lossy())
        .replace("{stem}", &stem.to_string_lossy())
}

#[derive(Debug, Clone)]
pub struct TestRunner {
    candidate: Candidate,
    time_limit: Duration,
    stdout_limit: usize,
    stderr_limit: usize,
}

impl TestRunner {
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_millis(3000);
    pub const DEFAULT_STDOUT_LIMIT: usize = 8 * 1024 * 1024;
    pub const DEFAULT_STDERR_LIMIT: usize = 1024 * 1024;

    /// Grace period for collecting already-written output after a TLE kill.
    const SALVAGE_TIMEOUT: Duration = Duration::from_millis(200);

    pub fn new(candidate: Candidate) -> Self {
        Self {
            candidate,
            time_limit: Self::DEFAULT_TIME_LIMIT,
            stdout_limit: Self::DEFAULT_STDOUT_LIMIT,
            stderr_limit: Self::DEFAULT_STDERR_LIMIT,
        }
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn capture_limits(mut self, stdout_limit: usize, stderr_limit: usize) -> Self {
        self.stdout_limit = stdout_limit;
        self.stderr_limit = stderr_limit;
        self
    }

    pub fn get_candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub async fn compile(&self) -> anyhow::Result<()> {
        let Some((shell, cmd)) = self.candidate.compile_cmd() else {
            bail!("Undefined compile command")
        };

        let status = Command::new(shell)
            .args(["-c", cmd])
            .status()
            .await
            .with_context(|| format!("Failed to spawn '{} -c {}'", shell.to_string_lossy(), cmd))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => bail!("Compile error: exitcode={}", code),
            None => bail!("Failed to compile: process terminated by signal"),
        }
    }

    /// Runs the candidate once, feeding `input` on stdin.
    ///
    /// Always yields a record: anything that keeps the program from reaching
    /// a clean exit is folded into `JudgeCode::RE` with the description in
    /// `detail`, a deadline overrun into `JudgeCode::TLE`.
    pub async fn run_once(&self, input: &str) -> RunRecord {
        self.try_run(input).await.unwrap_or_else(|e| RunRecord {
            status: JudgeCode::RE,
            stdout: String::new(),
            elapsed: Duration::ZERO,
            detail: format!("{:#}", e),
        })
    }

    /// Runs the same input up to `repeat` times, recording every attempt's
    /// wall-clock time. Stops at the first attempt that is not AC.
    pub async fn run_repeated(&self, input: &str, repeat: NonZeroUsize) -> RepeatedRun {
        let mut record = self.run_once(input).await;
        let mut times = vec![record.elapsed];
        for _ in 1..repeat.get() {
            if record.status != JudgeCode::AC {
                break;
            }
            record = self.run_once(input).await;
            times.push(record.elapsed);
        }
        RepeatedRun {
            status: record.status,
            times,
            stdout: record.stdout,
            detail: record.detail,
        }
    }

    async fn try_run(&self, input: &str) -> anyhow::Result<RunRecord> {
        let mut proc = self
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.candidate.run_display()))?;
        let stdin = proc.stdin.take().context("Failed to open stdin")?;
        let mut stdout = proc.stdout.take().context("Failed to open stdout")?;
        let mut stderr = proc.stderr.take().context("Failed to open stderr")?;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let started = tokio::time::Instant::now();
        let res = tokio::time::timeout(self.time_limit, async {
            // Feeding and draining must run concurrently with the wait, or a
            // full pipe on either side deadlocks the child.
            let (fed, out, err, status) = tokio::join!(
                feed_stdin(stdin, input),
                drain_capped(&mut stdout, &mut stdout_buf, self.stdout_limit),
                drain_capped(&mut stderr, &mut stderr_buf, self.stderr_limit),
                proc.wait(),
            );
            fed.and(out)
                .and(err)
                .context("Failed to communicate with subprocess")?;
            status.context("Failed to wait subprocess")
        })
        .await;
        let elapsed = started.elapsed();

        match res {
            Err(_) => {
                proc.kill()
                    .await
                    .unwrap_or_else(|e| log::warn!("Failed to kill TLE process: {:#}", e));
                // The child is dead; grab whatever it managed to write.
                let rest = self.stdout_limit.saturating_sub(stdout_buf.len());
                let _ = tokio::time::timeout(
                    Self::SALVAGE_TIMEOUT,
                    drain_capped(&mut stdout, &mut stdout_buf, rest),
                )
                .await;
                Ok(RunRecord {
                    status: JudgeCode::TLE,
                    stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                    elapsed,
                    detail: String::new(),
                })
            }
            Ok(wait_res) => {
                let exit_status = wait_res?;
                let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
                if exit_status.success() {
                    Ok(RunRecord {
                        status: JudgeCode::AC,
                        stdout,
                        elapsed,
                        detail: String::new(),
                    })
                } else {
                    Ok(RunRecord {
                        status: JudgeCode::RE,
                        stdout,
                        elapsed,
                        detail: String::from_utf8_lossy(&stderr_buf).into_owned(),
                    })
                }
            }
        }
    }

    fn spawn(&self) -> io::Result<Child> {
        let mut cmd = match &self.candidate.launch {
            Launch::Direct(program) => Command::new(program),
            Launch::Shell { shell, run, .. } => {
                let mut cmd = Command::new(shell);
                cmd.args(["-c", run]);
                cmd
            }
        };
        if let Some(dir) = &self.candidate.work_dir {
            cmd.current_dir(dir);
        }
        cmd.env(guard::CHILD_MARKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

async fn feed_stdin(mut stdin: ChildStdin, input: &str) -> io::Result<()> {
    if let Err(e) = stdin.write_all(input.as_bytes()).await {
        // The candidate may exit without reading; its exit status decides then.
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(e);
        }
    }
    drop(stdin); // NOTE: this line is essential (closes the pipe => EOF)
    Ok(())
}

/// Copies at most `limit` bytes into `buf`, then keeps the pipe flowing into
/// the void so the child never blocks on a full pipe.
async fn drain_capped<R>(src: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    tokio::io::copy(&mut (&mut *src).take(limit as u64), buf).await?;
    tokio::io::copy(src, &mut tokio::io::sink()).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CommandConfig;
    use crate::serdable::GlobPattern;

    struct X {
        input: &'static str,
        script: &'static str,
        want_status: JudgeCode,
        want_stdout: &'static str,
        want_detail: &'static str,
    }

    fn runner_for(script: &str) -> TestRunner {
        TestRunner::new(Candidate::shell_command("/bin/sh", script))
            .time_limit(Duration::from_millis(300))
    }

    async fn run_test(x: X) {
        let res = dbg!(runner_for(x.script).run_once(x.input).await);
        assert_eq!(res.status, x.want_status);
        assert_eq!(res.stdout, x.want_stdout);
        assert_eq!(res.detail, x.want_detail);
    }

    #[tokio::test]
    async fn should_be_ac_on_clean_exit() {
        run_test(X {
            input: "123\n",
            script: "cat",
            want_status: JudgeCode::AC,
            want_stdout: "123\n",
            want_detail: "",
        })
        .await;
    }

    #[tokio::test]
    async fn should_be_ac_even_if_stdin_is_not_read() {
        run_test(X {
            input: "123\n",
            script: "echo hello",
            want_status: JudgeCode::AC,
            want_stdout: "hello\n",
            want_detail: "",
        })
        .await;
    }

    #[tokio::test]
    async fn should_be_re_with_stderr_as_detail() {
        run_test(X {
            input: "",
            script: "echo partial; echo boom >&2; exit 3",
            want_status: JudgeCode::RE,
            want_stdout: "partial\n",
            want_detail: "boom\n",
        })
        .await;
    }

    #[tokio::test]
    async fn should_be_tle_with_salvaged_stdout() {
        let res = runner_for("echo early; sleep 2").run_once("").await;
        assert_eq!(res.status, JudgeCode::TLE);
        assert_eq!(res.stdout, "early\n");
        assert_eq!(res.detail, "");
        assert!(res.elapsed >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn spawn_failure_should_be_re_with_zero_elapsed() {
        let r = TestRunner::new(Candidate::direct("/no/such/program"));
        let res = r.run_once("").await;
        assert_eq!(res.status, JudgeCode::RE);
        assert_eq!(res.elapsed, Duration::ZERO);
        assert!(res.detail.contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn child_should_see_the_nested_run_marker() {
        let script = format!("printf '%s' \"${}\"", guard::CHILD_MARKER_ENV);
        let res = runner_for(&script).run_once("").await;
        assert_eq!(res.status, JudgeCode::AC);
        assert_eq!(res.stdout, "1");
    }

    #[tokio::test]
    async fn stdout_should_be_truncated_at_the_capture_limit() {
        let r = runner_for("echo 0123456789").capture_limits(4, 1024);
        let res = r.run_once("").await;
        assert_eq!(res.status, JudgeCode::AC);
        assert_eq!(res.stdout, "0123");
    }

    #[tokio::test]
    async fn repeat_should_stop_at_first_failure() {
        let res = runner_for("exit 7")
            .run_repeated("", NonZeroUsize::new(5).unwrap())
            .await;
        assert_eq!(res.status, JudgeCode::RE);
        assert_eq!(res.times.len(), 1);
    }

    #[tokio::test]
    async fn repeat_should_time_every_attempt_when_all_pass() {
        let res = runner_for("cat")
            .run_repeated("hi\n", NonZeroUsize::new(3).unwrap())
            .await;
        assert_eq!(res.status, JudgeCode::AC);
        assert_eq!(res.times.len(), 3);
        assert_eq!(res.stdout, "hi\n");
    }

    #[tokio::test]
    async fn compile_should_gate_on_exit_code() {
        let ok = TestRunner::new(
            Candidate::shell_command("/bin/sh", "true").with_compile_cmd("true"),
        );
        ok.compile().await.unwrap();

        let ng = TestRunner::new(
            Candidate::shell_command("/bin/sh", "true").with_compile_cmd("exit 5"),
        );
        let err = ng.compile().await.unwrap_err();
        assert!(err.to_string().contains("exitcode=5"));
    }

    #[test]
    fn command_interpolation_should_expand_placeholders() {
        let s = interpolate(
            "g++ {file} -o {dir}/{stem} && {dir}/{stem} < {name}",
            Path::new("/w/a.cpp"),
        );
        assert_eq!(s, "g++ /w/a.cpp -o /w/a && /w/a < a.cpp");
    }

    #[test]
    fn for_program_file_should_use_first_matching_command_entry() {
        let cfg = RunnerConfig {
            command: vec![CommandConfig {
                pattern: GlobPattern::parse("*.py").unwrap(),
                compile: None,
                run: "python3 {file}".into(),
            }],
            ..RunnerConfig::default()
        };

        let c = Candidate::for_program_file("/w/main.py", &cfg);
        assert_eq!(c.run_display(), "python3 /w/main.py");
        assert!(c.compile_cmd().is_none());

        let c = Candidate::for_program_file("/w/a.out", &cfg);
        assert_eq!(c.run_display(), "/w/a.out");
    }
}
