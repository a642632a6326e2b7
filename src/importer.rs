/// Type definitions for the channel message files of a Slack workspace export.
///
/// An export is a zip archive laid out as:
/// ```text
/// channels.json
/// users.json
/// general/2021-01-01.json     <- one file per channel per day
/// general/2021-01-02.json
/// random/2021-01-01.json
/// ```
///
/// Each channel file is a JSON array of message objects. Only the fields needed
/// to locate attachments are modelled; everything else is ignored.
///
/// Two attachment shapes exist in the wild:
/// - current posts carry a `files` array;
/// - legacy posts have `"subtype": "file_share"` and a single `file` object.
use eyre::{Context, Result};
use serde::{Deserialize, Deserializer};

/// Subtype that marks the legacy single-file share shape.
pub const FILE_SHARE_SUBTYPE: &str = "file_share";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(default, deserialize_with = "null_as_default")]
    ts: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    file: Option<FileDescriptor>,
    #[serde(default)]
    files: Option<Vec<FileDescriptor>>,
}

/// Metadata for one uploaded file referenced by a post.
///
/// Slack emits `null` for some of these on deleted or external files, so every
/// field collapses `null` into the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileDescriptor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_private: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_private_download: String,
}

impl FileDescriptor {
    /// The URL to download from: `url_private_download` wins over `url_private`.
    pub fn download_url(&self) -> Option<&str> {
        [&self.url_private_download, &self.url_private]
            .into_iter()
            .find(|u| !u.is_empty())
            .map(String::as_str)
    }

    /// True when the descriptor alone is enough to fetch the file over HTTP.
    pub fn is_downloadable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty() && self.download_url().is_some()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// The attachments carried by a post, normalised once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachments {
    /// `file_share` post with its single `file` object.
    LegacyShare(FileDescriptor),
    /// Post with a non-empty `files` array.
    MultiFile(Vec<FileDescriptor>),
    /// `file_share` post whose `file` object is missing.
    ShareWithoutFile,
    NoFile,
}

impl Attachments {
    /// Descriptors in encounter order. Empty for the file-less variants.
    pub fn into_files(self) -> Vec<FileDescriptor> {
        match self {
            Attachments::LegacyShare(file) => vec![file],
            Attachments::MultiFile(files) => files,
            Attachments::ShareWithoutFile | Attachments::NoFile => Vec::new(),
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Slack message timestamp, e.g. `"1609459200.000100"`.
    pub ts: String,
    pub subtype: Option<String>,
    pub attachments: Attachments,
}

impl From<RawPost> for Post {
    fn from(raw: RawPost) -> Self {
        let is_share = raw.subtype.as_deref() == Some(FILE_SHARE_SUBTYPE);
        // A file_share post always resolves to its legacy file, even if a
        // files array is present alongside it.
        let attachments = match (is_share, raw.file, raw.files) {
            (true, Some(file), _) => Attachments::LegacyShare(file),
            (true, None, _) => Attachments::ShareWithoutFile,
            (false, _, Some(files)) if !files.is_empty() => Attachments::MultiFile(files),
            _ => Attachments::NoFile,
        };
        Post {
            ts: raw.ts,
            subtype: raw.subtype,
            attachments,
        }
    }
}

/// Parse the body of a channel file into its posts, in file order.
pub fn parse_channel_file(bytes: &[u8]) -> Result<Vec<Post>> {
    let raw: Vec<RawPost> =
        serde_json::from_slice(bytes).wrap_err("Channel file is not a JSON array of posts")?;
    Ok(raw.into_iter().map(Post::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str) -> FileDescriptor {
        FileDescriptor {
            id: id.into(),
            name: format!("{id}.txt"),
            url_private: format!("https://files.slack.com/{id}"),
            url_private_download: String::new(),
        }
    }

    #[test]
    fn legacy_share_becomes_single_descriptor() {
        let json = br#"[{
            "ts": "1.0",
            "subtype": "file_share",
            "file": {"id": "F1", "name": "", "url_private": "http://x/f"}
        }]"#;
        let posts = parse_channel_file(json).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].attachments,
            Attachments::LegacyShare(FileDescriptor {
                id: "F1".into(),
                name: String::new(),
                url_private: "http://x/f".into(),
                url_private_download: String::new(),
            })
        );
    }

    #[test]
    fn legacy_share_overrides_files_array() {
        let json = br#"[{
            "ts": "1.0",
            "subtype": "file_share",
            "file": {"id": "F1", "name": "a.txt", "url_private": "https://files.slack.com/F1"},
            "files": [{"id": "F2"}, {"id": "F3"}]
        }]"#;
        let posts = parse_channel_file(json).unwrap();
        let files = posts[0].attachments.clone().into_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "F1");
    }

    #[test]
    fn share_without_file_is_flagged_not_empty() {
        let json = br#"[{"ts": "2.0", "subtype": "file_share", "files": [{"id": "F2"}]}]"#;
        let posts = parse_channel_file(json).unwrap();
        assert_eq!(posts[0].attachments, Attachments::ShareWithoutFile);
    }

    #[test]
    fn files_array_keeps_order() {
        let json = br#"[{"ts": "3.0", "files": [
            {"id": "F1", "name": "F1.txt", "url_private": "https://files.slack.com/F1"},
            {"id": "F2", "name": "F2.txt", "url_private": "https://files.slack.com/F2"}
        ]}]"#;
        let posts = parse_channel_file(json).unwrap();
        assert_eq!(
            posts[0].attachments,
            Attachments::MultiFile(vec![file("F1"), file("F2")])
        );
    }

    #[test]
    fn plain_messages_and_empty_arrays_have_no_files() {
        let json = br#"[
            {"ts": "4.0", "text": "hello", "user": "U1"},
            {"ts": "5.0", "files": []},
            {"ts": "6.0", "subtype": "channel_join", "file": {"id": "F9"}}
        ]"#;
        let posts = parse_channel_file(json).unwrap();
        assert!(posts.iter().all(|p| p.attachments == Attachments::NoFile));
    }

    #[test]
    fn null_fields_collapse_to_empty() {
        let json = br#"[{"ts": null, "files": [
            {"id": "F1", "name": null, "url_private": null, "url_private_download": "https://d/F1"}
        ]}]"#;
        let posts = parse_channel_file(json).unwrap();
        assert_eq!(posts[0].ts, "");
        let files = posts[0].attachments.clone().into_files();
        assert_eq!(files[0].name, "");
        assert_eq!(files[0].download_url(), Some("https://d/F1"));
    }

    #[test]
    fn download_url_prefers_download_field() {
        let mut f = file("F1");
        assert_eq!(f.download_url(), Some("https://files.slack.com/F1"));
        f.url_private_download = "https://files.slack.com/download/F1".into();
        assert_eq!(f.download_url(), Some("https://files.slack.com/download/F1"));
        f.url_private.clear();
        f.url_private_download.clear();
        assert_eq!(f.download_url(), None);
        assert!(!f.is_downloadable());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_channel_file(b"[{\"ts\": ").is_err());
        assert!(parse_channel_file(b"{\"ts\": \"1\"}").is_err());
    }
}
