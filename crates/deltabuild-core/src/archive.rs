//! Snapshot archive codec.
//!
//! A snapshot blob is a gzip-compressed tar whose entry names are paths
//! relative to the base directory the files were packed from, so a blob can
//! be unpacked under any root.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::project::{BuildConfiguration, ProjectStructure};

/// Errors from packing, unpacking or collecting archive inputs.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{} is not under archive base {}", path.display(), base.display())]
    OutsideBase { path: PathBuf, base: PathBuf },

    #[error("archive entry {} would escape the target directory", path.display())]
    UnsafeEntry { path: PathBuf },

    #[error("archive i/o failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PackSummary {
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnpackSummary {
    pub extracted: usize,
    pub skipped: usize,
}

/// Pack `files` into a new archive at `out`.
///
/// Relative entries in `files` are resolved against `base`; every file must
/// live under `base`. An empty `files` produces a valid empty archive.
/// Duplicate paths are written twice.
pub fn pack<I, P>(base: &Path, files: I, out: &Path) -> Result<PackSummary, ArchiveError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let file = File::create(out).map_err(io_at(out))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut count = 0usize;
    for file in files {
        let file = file.as_ref();
        let abs = if file.is_absolute() {
            file.to_path_buf()
        } else {
            base.join(file)
        };
        let rel = abs
            .strip_prefix(base)
            .map_err(|_| ArchiveError::OutsideBase {
                path: abs.clone(),
                base: base.to_path_buf(),
            })?;

        builder
            .append_path_with_name(&abs, rel)
            .map_err(io_at(&abs))?;
        count += 1;
    }

    let encoder = builder.into_inner().map_err(io_at(out))?;
    let mut writer = encoder.finish().map_err(io_at(out))?;
    writer.flush().map_err(io_at(out))?;
    drop(writer);

    let bytes = fs::metadata(out).map_err(io_at(out))?.len();
    debug!(files = count, bytes, archive = %out.display(), "packed archive");
    Ok(PackSummary {
        files: count,
        bytes,
    })
}

/// Unpack every entry of `blob` under `target`.
pub fn unpack(blob: &Path, target: &Path) -> Result<UnpackSummary, ArchiveError> {
    unpack_matching(blob, target, |_| true)
}

/// Unpack the entries of `blob` whose relative path satisfies `keep`.
///
/// Intermediate directories are created as needed. The first failure aborts
/// the extraction; files already written stay on disk but the error is
/// returned.
pub fn unpack_matching<F>(blob: &Path, target: &Path, mut keep: F) -> Result<UnpackSummary, ArchiveError>
where
    F: FnMut(&Path) -> bool,
{
    fs::create_dir_all(target).map_err(io_at(target))?;

    let file = File::open(blob).map_err(io_at(blob))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_mtime(true);

    let mut summary = UnpackSummary::default();
    for entry in archive.entries().map_err(io_at(blob))? {
        let mut entry = entry.map_err(io_at(blob))?;
        let rel = entry.path().map_err(io_at(blob))?.into_owned();

        if !keep(&rel) {
            summary.skipped += 1;
            continue;
        }

        let dest = target.join(&rel);
        let unpacked = entry.unpack_in(target).map_err(io_at(&dest))?;
        if !unpacked {
            return Err(ArchiveError::UnsafeEntry { path: rel });
        }
        summary.extracted += 1;
    }

    debug!(
        extracted = summary.extracted,
        skipped = summary.skipped,
        target = %target.display(),
        "unpacked archive"
    );
    Ok(summary)
}

/// Every output file of every project for `configuration`, as absolute
/// paths under the structure root, sorted.
///
/// Looks in `<project>/bin/<Configuration>` and `<project>/obj/<Configuration>`;
/// projects that have not been built contribute nothing.
pub fn collect_outputs(
    structure: &ProjectStructure,
    configuration: BuildConfiguration,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut files = Vec::new();

    for project in structure.projects() {
        for dir in project.output_dirs(configuration) {
            let dir = structure.root().join(dir);
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&dir) {
                let entry = entry.map_err(|source| ArchiveError::Walk {
                    path: dir.clone(),
                    source,
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }
    }

    files.sort();
    Ok(files)
}
