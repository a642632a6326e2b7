use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level archive directory that holds fetched attachments.
pub const UPLOADS_DIR: &str = "__uploads";

/// Configuration required to run the fetch process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub input_archive: PathBuf,
    pub output_archive: PathBuf,
    pub api_token: Option<String>,
    pub attachments_dir: Option<PathBuf>,
    pub quiet: bool,
}

/// What happened to a single file descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentOutcome {
    /// Fetched over HTTP and written to the output archive.
    Downloaded,
    /// Download failed or was impossible; bytes came from the attachments directory.
    LocalFallback,
    /// No local file and the descriptor lacks an id, a name or a URL. Nothing written.
    SkippedMissingFields,
    /// Download failed and no local file exists. The output entry is left empty.
    SkippedNoSource,
    /// An entry could not be created or its bytes could not be copied. The entry may be short.
    Failed(String),
}

/// Outcome of one descriptor, keyed by file id and the timestamp of its post.
#[derive(Clone, Debug)]
pub struct AttachmentRecord {
    pub file_id: String,
    pub ts: String,
    pub outcome: AttachmentOutcome,
}

/// Counters and per-descriptor outcomes of one run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub entries_copied: usize,
    pub channel_files: usize,
    /// `file_share` posts that had no `file` object.
    pub broken_shares: usize,
    pub attachments: Vec<AttachmentRecord>,
}

impl RunSummary {
    pub fn count(&self, pred: impl Fn(&AttachmentOutcome) -> bool) -> usize {
        self.attachments.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn outcome_of(&self, file_id: &str) -> Option<&AttachmentOutcome> {
        self.attachments
            .iter()
            .find(|r| r.file_id == file_id)
            .map(|r| &r.outcome)
    }

    pub fn line(&self) -> String {
        let skipped = self.count(|o| {
            matches!(
                o,
                AttachmentOutcome::SkippedMissingFields | AttachmentOutcome::SkippedNoSource
            )
        }) + self.broken_shares;
        format!(
            "Done. {} entries copied, {} channel files scanned, {} attachments downloaded, {} from local files, {} skipped, {} failed.",
            self.entries_copied,
            self.channel_files,
            self.count(|o| *o == AttachmentOutcome::Downloaded),
            self.count(|o| *o == AttachmentOutcome::LocalFallback),
            skipped,
            self.count(|o| matches!(o, AttachmentOutcome::Failed(_))),
        )
    }
}

/// True for `<channel>/<day>.json` entries outside the `__`-prefixed directories.
pub fn is_channel_file(entry_name: &str) -> bool {
    let segments: Vec<&str> = entry_name.split('/').collect();
    matches!(
        segments.as_slice(),
        [dir, file] if !dir.starts_with("__") && file.ends_with(".json")
    )
}

/// Archive path for an attachment: `__uploads/<id>/<name>`.
pub fn upload_path(file_id: &str, name: &str) -> String {
    format!("{}/{}/{}", UPLOADS_DIR, file_id, name)
}

/// Find the first regular file in `dir` whose name starts with `file_id`.
/// Names are compared in lexicographic order so the match is stable.
pub fn find_local_attachment(file_id: &str, dir: &Path) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("Failed to list attachments dir: {}", dir.display()))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.starts_with(file_id))
        .collect();
    names.sort();

    Ok(names.into_iter().next().map(|name| dir.join(name)))
}

/// Derive a display name from a local attachment file name.
///
/// `F123-My File!!.png` becomes `My_File.png`: the `<id>-` prefix is dropped and
/// each run of whitespace or punctuation in the stem collapses into one `_`.
pub fn derive_display_name(file_id: &str, local_name: &str) -> String {
    let prefix = format!("{}-", file_id);
    let name = local_name.strip_prefix(&prefix).unwrap_or(local_name);

    let (stem, ext) = match name.rfind('.') {
        Some(i) => name.split_at(i),
        None => (name, ""),
    };

    let stem = stem
        .split(|c: char| c.is_ascii_whitespace() || c.is_ascii_punctuation())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if stem.is_empty() {
        format!("{}{}", file_id, ext)
    } else {
        format!("{}{}", stem, ext)
    }
}
