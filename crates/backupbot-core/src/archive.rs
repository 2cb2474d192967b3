//! Streaming tar.gz construction for backup runs.
//!
//! Files are written straight from disk into a `tar::Builder` over a gzip
//! encoder over the output file; nothing is buffered in memory. Failures on a
//! single entry are recorded in the [`BuildReport`] and never abort the archive.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

use chrono::Utc;
use flate2::{write::GzEncoder, Compression};
use tar::{Builder, EntryType, Header, HeaderMode};
use walkdir::WalkDir;

use crate::{
    backup::BackupSpec, config::PathMap, errors::Error, exclude::ExclusionMatcher,
    paths::expand_path, Result,
};

/// A finished archive on disk, opened for reading.
///
/// Dropping it closes the handle and deletes the file, so every exit path of a
/// run releases the archive.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    file: Option<File>,
    size: u64,
}

impl Archive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    #[cfg(test)]
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        self.file.take();
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(file_name = %self.file_name(), "Archive removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                file_path = %self.path.display(),
                error = %e,
                "Failed to remove archive"
            ),
        }
    }
}

/// Why a single entry did not make it into the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Excluded { pattern: String },
    Open(String),
    Stat(String),
    NotRegularFile,
    /// Header or content could not be written to the stream.
    Write(String),
    Walk(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded { pattern } => write!(f, "excluded by {pattern:?}"),
            SkipReason::Open(e) => write!(f, "cannot open: {e}"),
            SkipReason::Stat(e) => write!(f, "cannot stat: {e}"),
            SkipReason::NotRegularFile => f.write_str("not a regular file"),
            SkipReason::Write(e) => write!(f, "cannot write entry: {e}"),
            SkipReason::Walk(e) => write!(f, "cannot walk: {e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Added { bytes: u64 },
    /// In the archive with its full header size, but the source shrank or
    /// failed mid-read and the missing tail is zero-filled.
    Truncated { bytes: u64, reason: String },
    Skipped(SkipReason),
}

impl EntryOutcome {
    pub fn in_archive(&self) -> bool {
        !matches!(self, EntryOutcome::Skipped(_))
    }
}

#[derive(Clone, Debug)]
pub struct EntryReport {
    pub source: PathBuf,
    pub dest: Option<String>,
    pub outcome: EntryOutcome,
}

/// Per-entry results of one build, in the order entries were visited.
#[derive(Clone, Debug, Default)]
pub struct BuildReport {
    pub entries: Vec<EntryReport>,
}

impl BuildReport {
    /// Entries written to the archive, truncated ones included.
    pub fn added(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| e.outcome.in_archive())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Skipped(_)))
    }

    /// Truncations and skips other than exclusions.
    pub fn failures(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| match &e.outcome {
            EntryOutcome::Added { .. } => false,
            EntryOutcome::Truncated { .. } => true,
            EntryOutcome::Skipped(r) => !matches!(r, SkipReason::Excluded { .. }),
        })
    }
}

/// Build the archive described by `spec`.
///
/// Only failing to create the output file (or to finalize the stream) is an
/// error; everything per entry ends up in the report.
pub fn build(spec: &BackupSpec) -> Result<(Archive, BuildReport)> {
    let stem = archive_stem(spec);
    let (out, path) = create_archive_file(&spec.output_dir, &stem)?;
    let mut archive = Archive {
        path,
        file: None,
        size: 0,
    };
    tracing::info!(file_name = %archive.file_name(), "Creating archive");

    let mut writer = EntryWriter {
        tar: Builder::new(GzEncoder::new(out, Compression::default())),
        exclusions: &spec.exclusions,
        report: BuildReport::default(),
    };

    for entry in &spec.files {
        writer.add_file_entry(entry);
    }
    for entry in &spec.dirs {
        writer.add_dir_entry(entry);
    }

    let EntryWriter { tar, report, .. } = writer;

    // Tar footer first, then the gzip trailer, then the bytes on disk.
    let encoder = tar
        .into_inner()
        .map_err(|e| finalize_err(archive.path(), "tar footer", e))?;
    let out = encoder
        .finish()
        .map_err(|e| finalize_err(archive.path(), "gzip trailer", e))?;
    out.sync_all()
        .map_err(|e| finalize_err(archive.path(), "sync", e))?;
    drop(out);

    let file = File::open(archive.path())?;
    archive.size = file.metadata()?.len();
    archive.file = Some(file);

    tracing::info!(
        file_name = %archive.file_name(),
        file_size = archive.size,
        added = report.added().count(),
        skipped = report.skipped().count(),
        "Archive created"
    );

    Ok((archive, report))
}

fn finalize_err(path: &Path, stage: &str, e: io::Error) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason: format!("failed to write {stage}: {e}"),
    }
}

/// `<archive_name>_<hostname>_<YYYY-MM-DD_HH-MM-SS>` in the configured timezone.
pub fn archive_stem(spec: &BackupSpec) -> String {
    let timestamp = Utc::now()
        .with_timezone(&spec.timezone)
        .format("%Y-%m-%d_%H-%M-%S");
    let host = match hostname::get() {
        Ok(h) => h.to_string_lossy().replace('/', "_"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to get hostname");
            "unknown".to_string()
        }
    };
    format!("{}_{}_{}", spec.archive_name, host, timestamp)
}

/// Create `<stem>.tar.gz`, or `<stem>-N.tar.gz` if a run in the same second got there first.
fn create_archive_file(dir: &Path, stem: &str) -> Result<(File, PathBuf)> {
    const MAX_ATTEMPTS: usize = 100;

    fs::create_dir_all(dir).map_err(|e| Error::Archive {
        path: dir.to_path_buf(),
        reason: format!("cannot create output directory: {e}"),
    })?;

    for n in 0..MAX_ATTEMPTS {
        let name = if n == 0 {
            format!("{stem}.tar.gz")
        } else {
            format!("{stem}-{n}.tar.gz")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => return Ok((f, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                tracing::error!(
                    file_path = %path.display(),
                    error = %e,
                    "Failed to create archive file"
                );
                return Err(Error::Archive {
                    path,
                    reason: format!("cannot create archive file: {e}"),
                });
            }
        }
    }

    Err(Error::Archive {
        path: dir.join(format!("{stem}.tar.gz")),
        reason: "too many archives with the same name".to_string(),
    })
}

struct EntryWriter<'a, W: io::Write> {
    tar: Builder<W>,
    exclusions: &'a ExclusionMatcher,
    report: BuildReport,
}

impl<W: io::Write> EntryWriter<'_, W> {
    fn add_file_entry(&mut self, entry: &PathMap) {
        let source = expand_path(&entry.path);
        let dest = normalize_dest(&entry.archive_path);

        if let Some(pattern) = self.excluded_by(&source) {
            tracing::info!(file_path = %source.display(), "File excluded from archive");
            let outcome = EntryOutcome::Skipped(SkipReason::Excluded { pattern });
            self.record(source, Some(dest), outcome);
            return;
        }

        let outcome = self.write_file(&source, &dest);
        self.record(source, Some(dest), outcome);
    }

    fn add_dir_entry(&mut self, entry: &PathMap) {
        let root = expand_path(&entry.path);

        if let Some(pattern) = self.excluded_by(&root) {
            tracing::info!(dir_path = %root.display(), "Directory excluded from archive");
            let outcome = EntryOutcome::Skipped(SkipReason::Excluded { pattern });
            self.record(root, None, outcome);
            return;
        }

        let mut walk = WalkDir::new(&root).sort_by_file_name().into_iter();
        while let Some(next) = walk.next() {
            let dent = match next {
                Ok(d) => d,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.clone());
                    let outcome = EntryOutcome::Skipped(SkipReason::Walk(e.to_string()));
                    self.record(path, None, outcome);
                    continue;
                }
            };

            let is_dir = dent.file_type().is_dir();
            if dent.depth() > 0 {
                if let Some(pattern) = self.excluded_by(dent.path()) {
                    if is_dir {
                        walk.skip_current_dir();
                    }
                    tracing::info!(
                        file_path = %dent.path().display(),
                        "Path excluded from archive"
                    );
                    self.record(
                        dent.path().to_path_buf(),
                        None,
                        EntryOutcome::Skipped(SkipReason::Excluded { pattern }),
                    );
                    continue;
                }
            }

            if is_dir {
                continue;
            }
            if dent.path_is_symlink() && fs::metadata(dent.path()).is_ok_and(|m| m.is_dir()) {
                tracing::debug!(
                    dir_path = %dent.path().display(),
                    "Symlinked directory not followed"
                );
                continue;
            }

            let rel = dent.path().strip_prefix(&root).unwrap_or(dent.path());
            let dest = join_archive_path(&entry.archive_path, rel);
            let outcome = self.write_file(dent.path(), &dest);
            self.record(dent.path().to_path_buf(), Some(dest), outcome);
        }
    }

    fn write_file(&mut self, source: &Path, dest: &str) -> EntryOutcome {
        let file = match File::open(source) {
            Ok(f) => f,
            Err(e) => return EntryOutcome::Skipped(SkipReason::Open(e.to_string())),
        };
        let meta = match file.metadata() {
            Ok(m) => m,
            Err(e) => return EntryOutcome::Skipped(SkipReason::Stat(e.to_string())),
        };
        if !meta.is_file() {
            return EntryOutcome::Skipped(SkipReason::NotRegularFile);
        }

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&meta, HeaderMode::Complete);
        header.set_entry_type(EntryType::Regular);

        self.append(&mut header, dest, file, meta.len())
    }

    /// Write `size` bytes of `source` under `header`.
    fn append<R: Read>(
        &mut self,
        header: &mut Header,
        dest: &str,
        source: R,
        size: u64,
    ) -> EntryOutcome {
        let mut reader = ExactLen::new(source, size);
        if let Err(e) = self.tar.append_data(header, dest, &mut reader) {
            return EntryOutcome::Skipped(SkipReason::Write(e.to_string()));
        }

        match reader.fault {
            Some(reason) => EntryOutcome::Truncated { bytes: size, reason },
            None => EntryOutcome::Added { bytes: size },
        }
    }

    fn excluded_by(&self, path: &Path) -> Option<String> {
        self.exclusions.matching_pattern(path).map(str::to_string)
    }

    fn record(&mut self, source: PathBuf, dest: Option<String>, outcome: EntryOutcome) {
        match &outcome {
            EntryOutcome::Skipped(SkipReason::Excluded { .. }) | EntryOutcome::Added { .. } => {}
            EntryOutcome::Skipped(reason) => {
                tracing::error!(file_path = %source.display(), reason = %reason, "Entry skipped");
            }
            EntryOutcome::Truncated { reason, .. } => {
                tracing::error!(
                    file_path = %source.display(),
                    reason = %reason,
                    "Entry zero-filled after short read"
                );
            }
        }
        self.report.entries.push(EntryReport {
            source,
            dest,
            outcome,
        });
    }
}

/// Yields exactly `len` bytes from `inner`, zero-filling if it ends or fails early.
///
/// The tar header has already promised `len` bytes, so anything less would
/// leave the stream unreadable for every following entry.
struct ExactLen<R> {
    inner: R,
    remaining: u64,
    fault: Option<String>,
}

impl<R: Read> ExactLen<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
            fault: None,
        }
    }
}

impl<R: Read> Read for ExactLen<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = self.remaining.min(buf.len() as u64) as usize;
        let buf = &mut buf[..max];

        let n = if self.fault.is_some() {
            0
        } else {
            match self.inner.read(buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
                Err(e) => {
                    self.fault = Some(e.to_string());
                    0
                }
            }
        };

        let n = if n == 0 {
            if self.fault.is_none() {
                self.fault = Some(format!("file shrank, {} bytes missing", self.remaining));
            }
            buf.fill(0);
            max
        } else {
            n
        };

        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Archive names never start with `/`.
fn normalize_dest(raw: &str) -> String {
    raw.trim_start_matches('/').to_string()
}

/// `prefix` + `/` + `rel` with forward slashes regardless of platform.
fn join_archive_path(prefix: &str, rel: &Path) -> String {
    let rel = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let prefix = normalize_dest(prefix);
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), rel.is_empty()) {
        (true, _) => rel,
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{rel}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeliveryTarget;
    use flate2::read::GzDecoder;

    fn spec(dir: &Path, files: Vec<PathMap>, dirs: Vec<PathMap>, exclude: &[&str]) -> BackupSpec {
        BackupSpec {
            files,
            dirs,
            exclusions: ExclusionMatcher::new(exclude),
            target: DeliveryTarget::new(1, None),
            threshold: 1024,
            output_dir: dir.to_path_buf(),
            archive_name: "test".to_string(),
            timezone: chrono_tz::UTC,
        }
    }

    fn map(path: &Path, archive_path: &str) -> PathMap {
        PathMap {
            path: path.to_string_lossy().into_owned(),
            archive_path: archive_path.to_string(),
        }
    }

    fn entries(archive: &Archive) -> Vec<(String, Vec<u8>, u32, u64)> {
        let f = File::open(archive.path()).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(f));
        tar.entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mode = e.header().mode().unwrap();
                let mtime = e.header().mtime().unwrap();
                let mut data = Vec::new();
                e.read_to_end(&mut data).unwrap();
                (name, data, mode, mtime)
            })
            .collect()
    }

    #[test]
    fn joins_archive_paths_with_forward_slashes() {
        assert_eq!(join_archive_path("data", Path::new("a/b.txt")), "data/a/b.txt");
        assert_eq!(join_archive_path("data/", Path::new("b.txt")), "data/b.txt");
        assert_eq!(join_archive_path("", Path::new("b.txt")), "b.txt");
        assert_eq!(join_archive_path("/abs/root", Path::new("")), "abs/root");
    }

    #[test]
    fn exact_len_pads_short_sources() {
        let mut r = ExactLen::new(&b"abc"[..], 5);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc\0\0");
        assert!(r.fault.is_some());

        let mut r = ExactLen::new(&b"abcdef"[..], 4);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcd");
        assert!(r.fault.is_none());
    }

    #[test]
    fn archive_name_includes_prefix_host_and_timestamp() {
        let out = tempfile::tempdir().unwrap();
        let s = spec(out.path(), vec![], vec![], &[]);
        let (archive, _) = build(&s).unwrap();
        let name = archive.file_name();
        assert!(name.starts_with("test_"), "{name}");
        assert!(name.ends_with(".tar.gz"), "{name}");
        // test_<host>_YYYY-MM-DD_HH-MM-SS.tar.gz
        let stem = name.trim_end_matches(".tar.gz");
        let stamp = &stem[stem.len() - 19..];
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d_%H-%M-%S").is_ok());
    }

    #[test]
    fn same_second_runs_do_not_collide() {
        let out = tempfile::tempdir().unwrap();
        let (a, _) = create_archive_file(out.path(), "same").unwrap();
        let (b, _) = create_archive_file(out.path(), "same").unwrap();
        drop((a, b));
        assert!(out.path().join("same.tar.gz").exists());
        assert!(out.path().join("same-1.tar.gz").exists());
    }

    #[test]
    fn preserves_mode_and_mtime() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let p = src.path().join("run.sh");
        fs::write(&p, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&p, fs::Permissions::from_mode(0o750)).unwrap();
        }
        let mtime = fs::metadata(&p)
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let s = spec(out.path(), vec![map(&p, "bin/run.sh")], vec![], &[]);
        let (archive, report) = build(&s).unwrap();
        assert_eq!(report.added().count(), 1);

        let got = entries(&archive);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "bin/run.sh");
        assert_eq!(got[0].1, b"#!/bin/sh\n");
        #[cfg(unix)]
        assert_eq!(got[0].2 & 0o777, 0o750);
        assert_eq!(got[0].3, mtime);
    }

    #[test]
    fn directories_are_not_written_as_entries() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("a/b/empty")).unwrap();
        fs::write(src.path().join("a/b/f.txt"), b"f").unwrap();

        let s = spec(out.path(), vec![], vec![map(src.path(), "root")], &[]);
        let (archive, _) = build(&s).unwrap();
        let names: Vec<_> = entries(&archive).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["root/a/b/f.txt".to_string()]);
    }

    #[test]
    fn walk_order_is_lexical() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["c.txt", "a.txt", "b/z.txt", "b/a.txt"] {
            let p = src.path().join(name);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(&p, name).unwrap();
        }

        let s = spec(out.path(), vec![], vec![map(src.path(), "d")], &[]);
        let (archive, _) = build(&s).unwrap();
        let names: Vec<_> = entries(&archive).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["d/a.txt", "d/b/a.txt", "d/b/z.txt", "d/c.txt"]);
    }

    #[test]
    fn excluded_directory_root_skips_everything() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let root = src.path().join("cache");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("x"), b"x").unwrap();

        let s = spec(out.path(), vec![], vec![map(&root, "cache")], &["cache"]);
        let (archive, report) = build(&s).unwrap();
        assert!(entries(&archive).is_empty());
        assert_eq!(report.entries.len(), 1);
        assert!(matches!(
            report.entries[0].outcome,
            EntryOutcome::Skipped(SkipReason::Excluded { .. })
        ));
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn missing_directory_is_a_skip_not_an_error() {
        let out = tempfile::tempdir().unwrap();
        let s = spec(
            out.path(),
            vec![],
            vec![map(&out.path().join("nope"), "nope")],
            &[],
        );
        let (archive, report) = build(&s).unwrap();
        assert!(entries(&archive).is_empty());
        assert!(matches!(
            report.entries[0].outcome,
            EntryOutcome::Skipped(SkipReason::Walk(_))
        ));
    }

    #[test]
    fn dropping_archive_removes_file() {
        let out = tempfile::tempdir().unwrap();
        let s = spec(out.path(), vec![], vec![], &[]);
        let (archive, _) = build(&s).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        assert!(archive.file().is_some());
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_output_dir_is_fatal() {
        let out = tempfile::tempdir().unwrap();
        let blocker = out.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let s = spec(&blocker.join("sub"), vec![], vec![], &[]);
        assert!(matches!(build(&s), Err(Error::Archive { .. })));
    }

    #[test]
    fn excluded_file_name_leaves_siblings_in_place() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(src.path().join("keep.txt"), b"keep").unwrap();
        fs::write(src.path().join("secret.key"), b"secret").unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/secret.key"), b"nested").unwrap();
        fs::write(src.path().join("sub/other.txt"), b"other").unwrap();

        let s = spec(out.path(), vec![], vec![map(src.path(), "d")], &["secret.key"]);
        let (archive, report) = build(&s).unwrap();
        let names: Vec<_> = entries(&archive).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["d/keep.txt", "d/sub/other.txt"]);
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn later_entry_with_same_path_wins_on_extract() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let first = src.path().join("first");
        let second = src.path().join("second");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let s = spec(
            out.path(),
            vec![map(&first, "same"), map(&second, "same")],
            vec![],
            &[],
        );
        let (archive, report) = build(&s).unwrap();
        assert_eq!(report.added().count(), 2);
        assert_eq!(entries(&archive).len(), 2);

        let dest = tempfile::tempdir().unwrap();
        let f = File::open(archive.path()).unwrap();
        tar::Archive::new(GzDecoder::new(f)).unpack(dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("same")).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_skipped_quietly() {
        let src = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(other.path().join("elsewhere.txt"), b"x").unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(other.path(), src.path().join("link")).unwrap();

        let s = spec(out.path(), vec![], vec![map(src.path(), "d")], &[]);
        let (archive, report) = build(&s).unwrap();
        let names: Vec<_> = entries(&archive).into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["d/a.txt"]);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(report.entries.len(), 1);
    }

    #[test]
    fn short_read_is_reported_as_truncated_entry() {
        let exclusions = ExclusionMatcher::default();
        let mut writer = EntryWriter {
            tar: Builder::new(Vec::new()),
            exclusions: &exclusions,
            report: BuildReport::default(),
        };

        let mut header = Header::new_gnu();
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        let outcome = writer.append(&mut header, "short.txt", &b"abc"[..], 5);
        assert!(matches!(outcome, EntryOutcome::Truncated { bytes: 5, .. }));
        writer.record(PathBuf::from("/src/short.txt"), Some("short.txt".to_string()), outcome);

        assert_eq!(writer.report.added().count(), 1);
        assert_eq!(writer.report.failures().count(), 1);
        assert_eq!(writer.report.skipped().count(), 0);

        let bytes = writer.tar.into_inner().unwrap();
        let mut tar = tar::Archive::new(&bytes[..]);
        let mut entry = tar.entries().unwrap().next().unwrap().unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"abc\0\0");
    }
}
