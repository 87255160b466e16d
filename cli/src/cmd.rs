pub mod init;
pub mod list;

use std::path::PathBuf;

use ojt_core::Config;

use crate::util;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct GlobalArgs {
    #[command(subcommand)]
    pub subcmd: Subcommand,

    /// Config file path (default: nearest ojt.toml in the ancestor dirs)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    Init(init::Args),

    #[command(alias("ls"))]
    List(list::Args),

    #[command(alias("t"))]
    Test(test::Args),
}

pub type SubcmdResult = anyhow::Result<()>;

impl GlobalArgs {
    pub async fn exec_subcmd(&self) -> SubcmdResult {
        use Subcommand::*;
        match &self.subcmd {
            Init(args) => init::exec(args, self),
            List(args) => list::exec(args, self),
            Test(args) => test::exec(args, self).await,
        }
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Config::from_toml_file(path.clone()),
            None => Config::from_file_finding_in_ancestors_or_default(util::current_dir()),
        }
    }
}
