use std::{
    fs::{self, ReadDir},
    path::{Path, PathBuf},
    time::SystemTime,
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("File already exists: {0}")]
        AlreadyExists(PathBuf),

        #[error("No entry matched glob '{0}' in '{1}'")]
        NoEntryMatchedGlob(::glob::Pattern, PathBuf),
    }
}
pub use error::{Error, Result};

#[must_use]
pub fn mkdir_all(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::SingleIO("Cannot create dir", dir.to_owned(), e))
}

#[must_use]
pub fn write<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    fs::write(&filepath, contents)
        .map_err(|e| Error::SingleIO("Cannot write file", filepath.as_ref().to_owned(), e))
}

/// Like `write()`, but refuses to clobber an existing file.
#[must_use]
pub fn write_new<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if filepath.as_ref().exists() {
        return Err(Error::AlreadyExists(filepath.as_ref().to_owned()));
    }
    self::write(filepath, contents)
}

#[must_use]
pub fn read_to_string(filepath: impl AsRef<Path>) -> Result<String> {
    fs::read_to_string(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))
}

/// Reads a file as UTF-8, substituting replacement characters for any
/// ill-formed sequences instead of failing.
#[must_use]
pub fn read_to_string_lossy(filepath: impl AsRef<Path>) -> Result<String> {
    let bytes = fs::read(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

#[must_use]
pub fn read_dir(dir: impl AsRef<Path>) -> Result<ReadDir> {
    fs::read_dir(&dir).map_err(|e| Error::SingleIO("Cannot read dir", dir.as_ref().to_owned(), e))
}

pub fn find_most_recently_modified_file(
    dir: impl AsRef<Path>,
    filename_pattern: &::glob::Pattern,
) -> Result<PathBuf> {
    let mut ans: Option<(SystemTime, PathBuf)> = None;

    for entry in self::read_dir(&dir)?.filter_map(std::result::Result::ok) {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        if !filename_pattern.matches(entry.file_name().to_string_lossy().as_ref()) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|info| info.modified()) else {
            continue;
        };
        if ans.as_ref().map_or(true, |(latest, _)| *latest < modified) {
            ans = Some((modified, entry.path()));
        }
    }
    match ans {
        Some((_, filepath)) => Ok(filepath),
        None => Err(self::Error::NoEntryMatchedGlob(
            filename_pattern.to_owned(),
            dir.as_ref().to_owned(),
        )),
    }
}
