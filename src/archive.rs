//! Zip archive extraction and repackaging.

use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// What `extract` unpacked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub total_size: u64,
    /// Entries whose names would escape the destination
    pub skipped_entries: usize,
}

/// Unpack every entry of the zip archive at `archive_path` into `destination`,
/// creating it if needed.
pub fn extract(archive_path: &Path, destination: &Path) -> Result<ExtractStats> {
    let file = File::open(archive_path).map_err(|e| PipelineError::archive_read(archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| PipelineError::archive_read(archive_path, e))?;

    fs::create_dir_all(destination).map_err(|e| PipelineError::filesystem(destination, e))?;

    let mut stats = ExtractStats::default();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PipelineError::archive_read(archive_path, e))?;

        let outpath = match entry.enclosed_name() {
            Some(path) => destination.join(path),
            None => {
                debug!("Skipping unsafe entry name {:?}", entry.name());
                stats.skipped_entries += 1;
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| PipelineError::filesystem(&outpath, e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::filesystem(parent, e))?;
        }

        let mut outfile = File::create(&outpath).map_err(|e| PipelineError::filesystem(&outpath, e))?;
        // A truncated or corrupt entry surfaces here as a read error.
        let size = io::copy(&mut entry, &mut outfile)
            .map_err(|e| PipelineError::archive_read(archive_path, e))?;

        stats.files += 1;
        stats.total_size += size;
    }

    Ok(stats)
}

/// Zip the whole of `source_dir` into `destination`.
///
/// The archive is built in a temporary file next to `destination` and renamed
/// into place once complete, so a stale output is replaced wholesale and a
/// failure never leaves a partial file at `destination`. Returns the number
/// of entries written.
pub fn repackage(source_dir: &Path, destination: &Path) -> Result<u64> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let staging = tempfile::Builder::new()
        .prefix(".repack-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| PipelineError::archive_write(destination, e))?;

    let writer = BufWriter::new(
        staging
            .reopen()
            .map_err(|e| PipelineError::archive_write(destination, e))?,
    );
    let entries = write_tree(source_dir, writer)
        .map_err(|e| PipelineError::archive_write(destination, e))?;

    staging
        .persist(destination)
        .map_err(|e| PipelineError::archive_write(destination, e.error))?;

    Ok(entries)
}

fn write_tree<W: io::Write + io::Seek>(source_dir: &Path, writer: W) -> anyhow::Result<u64> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0u64;

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source_dir)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
        } else {
            zip.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
        }
        entries += 1;
    }

    let mut inner = zip.finish()?;
    inner.flush()?;
    Ok(entries)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Read, Write};

    /// Build a zip archive from `(name, contents)` pairs.
    pub(crate) fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut out = String::new();
        entry.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_extract_creates_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("mod1.jar");
        write_zip(
            &jar,
            &[
                ("assets/mod1/lang/en_us.json", r#"{"a": "b"}"#),
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0"),
            ],
        );

        let dest = dir.path().join("scratch/mod1");
        let stats = extract(&jar, &dest).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.skipped_entries, 0);
        assert!(dest.join("assets/mod1/lang/en_us.json").is_file());
        assert!(dest.join("META-INF/MANIFEST.MF").is_file());
    }

    #[test]
    fn test_extract_skips_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("evil.jar");
        write_zip(&jar, &[("../outside.txt", "x"), ("inside.txt", "y")]);

        let dest = dir.path().join("out");
        let stats = extract(&jar, &dest).unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(stats.skipped_entries, 1);
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("not-a-zip.jar");
        fs::write(&jar, "plain text").unwrap();

        let err = extract(&jar, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveRead { .. }));
    }

    #[test]
    fn test_extract_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract(&dir.path().join("nope.jar"), dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveRead { .. }));
    }

    #[test]
    fn test_repackage_contains_full_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tree");
        fs::create_dir_all(src.join("assets/mod1/lang")).unwrap();
        fs::write(src.join("assets/mod1/lang/en_us.json"), "{}").unwrap();
        fs::write(src.join("assets/mod1/lang/ko_kr.json"), "{\"a\": \"가\"}").unwrap();

        let out = dir.path().join("mod1_modified.jar");
        let entries = repackage(&src, &out).unwrap();

        // assets/, assets/mod1/, assets/mod1/lang/ plus two files
        assert_eq!(entries, 5);
        assert_eq!(read_entry(&out, "assets/mod1/lang/ko_kr.json"), "{\"a\": \"가\"}");
        assert_eq!(read_entry(&out, "assets/mod1/lang/en_us.json"), "{}");
    }

    #[test]
    fn test_repackage_replaces_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mod1_modified.jar");
        write_zip(&out, &[("stale.txt", "old run")]);

        let src = dir.path().join("tree");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("fresh.txt"), "new run").unwrap();

        repackage(&src, &out).unwrap();

        let archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names, vec!["fresh.txt"]);
    }

    #[test]
    fn test_failed_repackage_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mod1_modified.jar");

        let err = repackage(&dir.path().join("missing-tree"), &out).unwrap_err();

        assert!(matches!(err, PipelineError::ArchiveWrite { .. }));
        assert!(!out.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "staging file should be removed");
    }
}
