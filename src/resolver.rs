use crate::importer::FileDescriptor;
use crate::utils::{AttachmentOutcome, derive_display_name, find_local_attachment, upload_path};
use eyre::{Context, Result, eyre};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use zip::ZipWriter;
use zip::write::FileOptions;

/// Source of remote attachment bytes.
pub trait Fetch {
    /// Start a download. Anything but a 200 response is an error.
    fn fetch(&self, url: &Url) -> Result<Box<dyn Read>>;
}

/// Blocking HTTP downloader, authenticated with a bearer token when one is set.
pub struct HttpFetcher {
    client: Client,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self::with_client(client, token))
    }

    pub fn with_client(client: Client, token: Option<String>) -> Self {
        Self {
            client,
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Box<dyn Read>> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .wrap_err_with(|| format!("Request failed: {}", url))?;
        if response.status() != StatusCode::OK {
            return Err(eyre!("Unexpected status {} from {}", response.status(), url));
        }
        Ok(Box::new(response))
    }
}

/// Resolves file descriptors into `__uploads/<id>/<name>` entries of the output archive,
/// downloading them or falling back to a local attachments directory.
pub struct AttachmentResolver<F> {
    fetcher: F,
    attachments_dir: Option<PathBuf>,
}

impl<F: Fetch> AttachmentResolver<F> {
    pub fn new(fetcher: F, attachments_dir: Option<PathBuf>) -> Self {
        Self {
            fetcher,
            attachments_dir,
        }
    }

    /// Resolve one descriptor. `file.name` is filled in from the local file when empty.
    ///
    /// The output entry is created before the download starts, so a failed
    /// download without a local copy leaves an empty entry behind.
    pub fn resolve<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        ts: &str,
        file: &mut FileDescriptor,
    ) -> AttachmentOutcome {
        debug!(file_id = %file.id, "Processing file");

        let local_path = self.local_attachment(&file.id);
        if let Some(path) = &local_path {
            if file.name.is_empty()
                && let Some(local_name) = path.file_name().and_then(|n| n.to_str())
            {
                file.name = derive_display_name(&file.id, local_name);
            }
            debug!(file_id = %file.id, path = %path.display(), "Found local attachment");
        }

        if local_path.is_none() && !file.is_downloadable() {
            warn!(ts, file_id = %file.id, "File object has missing properties, skipping");
            return AttachmentOutcome::SkippedMissingFields;
        }

        let entry = upload_path(&file.id, &file.name);
        if let Err(e) = zip.start_file(entry.as_str(), FileOptions::default()) {
            warn!(entry = %entry, error = %e, "Failed to create output entry");
            return AttachmentOutcome::Failed(format!("Failed to create entry {}: {}", entry, e));
        }

        let body = match file.download_url() {
            Some(raw) => Url::parse(raw)
                .wrap_err_with(|| format!("Invalid download URL: {}", raw))
                .and_then(|url| {
                    debug!(file_id = %file.id, name = %file.name, %url, "Downloading file");
                    self.fetcher.fetch(&url)
                }),
            None => Err(eyre!("No download URL")),
        };

        match body {
            Ok(mut body) => match io::copy(&mut body, zip) {
                Ok(_) => {
                    info!(file_id = %file.id, entry = %entry, "Downloaded attachment into output archive");
                    AttachmentOutcome::Downloaded
                }
                Err(e) => {
                    warn!(entry = %entry, error = %e, "Failed to write downloaded file to output archive");
                    AttachmentOutcome::Failed(format!("Failed to write {}: {}", entry, e))
                }
            },
            Err(e) => {
                debug!(file_id = %file.id, error = %format!("{:#}", e), "Download failed");
                self.copy_local(&file.id, &entry, zip)
            }
        }
    }

    fn local_attachment(&self, file_id: &str) -> Option<PathBuf> {
        let dir = self.attachments_dir.as_deref()?;
        if file_id.is_empty() {
            return None;
        }
        match find_local_attachment(file_id, dir) {
            Ok(found) => found,
            Err(e) => {
                warn!(file_id, error = %format!("{:#}", e), "Local attachment lookup failed");
                None
            }
        }
    }

    fn copy_local<W: Write + Seek>(
        &self,
        file_id: &str,
        entry: &str,
        zip: &mut ZipWriter<W>,
    ) -> AttachmentOutcome {
        let Some(path) = self.local_attachment(file_id) else {
            warn!(file_id, entry, "Download failed and no local attachment");
            return AttachmentOutcome::SkippedNoSource;
        };
        match copy_file_into(&path, zip) {
            Ok(()) => {
                info!(file_id, path = %path.display(), "Used local attachment");
                AttachmentOutcome::LocalFallback
            }
            Err(e) => {
                warn!(file_id, path = %path.display(), error = %format!("{:#}", e), "Failed to copy local attachment");
                AttachmentOutcome::Failed(format!("{:#}", e))
            }
        }
    }
}

fn copy_file_into<W: Write>(path: &Path, out: &mut W) -> Result<()> {
    let mut src = File::open(path)
        .wrap_err_with(|| format!("Failed to open local file: {}", path.display()))?;
    io::copy(&mut src, out)
        .wrap_err_with(|| format!("Failed to copy local file: {}", path.display()))?;
    Ok(())
}
