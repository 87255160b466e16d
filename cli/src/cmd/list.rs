use std::path::PathBuf;

use anyhow::Context as _;
use colored::Colorize as _;
use ojt_core::testing::Testcase;

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Testcase dir (default: `<judge.testcase_dir>` under the current dir)
    #[arg()] // positional argument
    pub testcase_dir: Option<PathBuf>,
}

/// Prints the discovered testcases in judge order, flagging the ones
/// whose expected output file is absent.
pub fn exec(args: &Args, global_args: &GlobalArgs) -> SubcmdResult {
    let cfg = global_args.load_config()?;
    let dir = args
        .testcase_dir
        .clone()
        .unwrap_or_else(|| cfg.judge.testcase_dir.clone());

    let testcases = Testcase::enumerate(&dir).context("Failed to scan testcase dir")?;
    if testcases.is_empty() {
        println!("No testcases (*.{}) in {}", Testcase::INPUT_EXT, dir.display());
        return Ok(());
    }
    for t in &testcases {
        if t.expected_path().is_some() {
            println!("{}", t.name());
        } else {
            println!(
                "{} {}",
                t.name(),
                format!("(no .{} file)", Testcase::EXPECTED_EXT).yellow()
            );
        }
    }
    Ok(())
}
