use std::{
    path::{Path, PathBuf},
    process::exit,
};

use anyhow::{bail, Context as _};
use ojt_core::serdable::GlobPattern;

pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("Failed to get current dir: {}", e);
        exit(1);
    })
}

/// Resolves the program under judgement from the optional positional arg.
/// An existing file is taken as-is; a dir (or no arg, meaning "./") means
/// the most recently modified file in it whose name matches `include`.
pub fn determine_program_file(
    arg_path: &Option<PathBuf>,
    include: &GlobPattern,
) -> anyhow::Result<PathBuf> {
    let existing_path = match arg_path {
        Some(path) if path.exists() => path.as_path(),
        Some(path) => bail!("No such file or dir: {:?}", path),
        None => Path::new("./"),
    };

    if existing_path.is_dir() {
        fsutil::find_most_recently_modified_file(existing_path, include)
            .with_context(|| format!("Cannot find target program file in {:?}", existing_path))
    } else {
        Ok(existing_path.to_owned())
    }
}
