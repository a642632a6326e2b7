//! # slack-export-attachments
//!
//! A CLI tool that completes a [Slack](https://slack.com) workspace export with the
//! files its messages link to.
//!
//! ## What it does
//!
//! A Slack export is a zip archive of JSON message logs. Uploaded files are only
//! referenced by private URLs, so the archive alone is not a complete backup. This
//! tool copies every entry of the export into a new archive and, for every file
//! attachment it finds in the channel logs, adds the file itself under
//! `__uploads/<file-id>/<file-name>`.
//!
//! The input archive is opened **read-only**; the output is always a new file.
//!
//! ## Sources
//!
//! Each attachment is downloaded with the API token given by `--api-token`. When the
//! download fails, or the message carries no usable URL, a local directory of
//! previously downloaded files (`--attachments-dir`) is searched for a file whose
//! name starts with the attachment id.
//!
//! ## Usage
//!
//! ```sh
//! slack-export-attachments fetch-attachments \
//!     --input-archive export.zip \
//!     --output-archive export-with-files.zip \
//!     --api-token xoxp-... \
//!     --attachments-dir ~/slack-files
//! ```
//!
//! The token and directory can be persisted in
//! `~/.config/slack-export-attachments/config.toml`.
pub mod importer;
pub mod process;
pub mod resolver;
pub mod utils;
