use std::path::PathBuf;

use ojt_core::{action, print_success};

use super::{GlobalArgs, SubcmdResult};

#[derive(Debug, clap::Args)]
pub struct Args {
    #[arg(default_value = "./")]
    dir: PathBuf,
}

pub fn exec(args: &Args, _: &GlobalArgs) -> SubcmdResult {
    let path = action::init_config_file(&args.dir)?;
    print_success!(
        "Successfully generated an example config. (path: {})",
        path.to_string_lossy()
    );
    Ok(())
}
