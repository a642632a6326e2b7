use crate::importer::{Attachments, parse_channel_file};
use crate::resolver::{AttachmentResolver, Fetch, HttpFetcher};
use crate::utils::{AttachmentRecord, FetchConfig, RunSummary, is_channel_file};
use eyre::{Context, Result, eyre};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The main entry point for the fetch logic, downloading over HTTP.
pub fn execute(config: &FetchConfig) -> Result<RunSummary> {
    let fetcher = HttpFetcher::new(config.api_token.clone())?;
    let resolver = AttachmentResolver::new(fetcher, config.attachments_dir.clone());
    run(config, &resolver)
}

/// Copy every entry of the input archive into the output archive and append the
/// attachments referenced by channel files under `__uploads/`.
///
/// Errors abort the run and leave whatever was written so far in the output.
pub fn run<F: Fetch>(config: &FetchConfig, resolver: &AttachmentResolver<F>) -> Result<RunSummary> {
    if let (Ok(input), Ok(output)) = (
        fs::canonicalize(&config.input_archive),
        fs::canonicalize(&config.output_archive),
    ) && input == output
    {
        return Err(eyre!(
            "Output archive must differ from the input archive: {}",
            config.output_archive.display()
        ));
    }

    let input = File::open(&config.input_archive).wrap_err_with(|| {
        format!(
            "Could not open input archive for reading: {}",
            config.input_archive.display()
        )
    })?;
    let mut archive = ZipArchive::new(BufReader::new(input)).wrap_err_with(|| {
        format!(
            "Could not read input archive: {}",
            config.input_archive.display()
        )
    })?;

    let output = File::create(&config.output_archive).wrap_err_with(|| {
        format!(
            "Could not open the output archive for writing: {}",
            config.output_archive.display()
        )
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(output));

    let mut summary = RunSummary::default();
    for index in 0..archive.len() {
        let (name, body) = copy_entry(&mut archive, index, &mut zip)?;
        summary.entries_copied += 1;

        if let Some(body) = body
            && is_channel_file(&name)
        {
            summary.channel_files += 1;
            process_channel_file(&name, &body, resolver, &mut zip, &mut summary)?;
        }
    }

    let mut out = zip.finish().wrap_err("Failed to close the output archive")?;
    out.flush().wrap_err("Failed to flush the output archive")?;
    Ok(summary)
}

/// Copy one entry verbatim. Returns its name and, unless it is a directory or
/// could not be read completely, its contents.
fn copy_entry<R: Read + Seek, W: Write + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    zip: &mut ZipWriter<W>,
) -> Result<(String, Option<Vec<u8>>)> {
    let mut entry = archive
        .by_index(index)
        .wrap_err_with(|| format!("Failed to open entry #{} in input archive", index))?;
    let name = entry.name().to_string();
    debug!(entry = %name, "Processing entry");

    let compression = match entry.compression() {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    };
    let mut options = FileOptions::default()
        .compression_method(compression)
        .last_modified_time(entry.last_modified())
        .large_file(entry.size() >= u64::from(u32::MAX));
    if let Some(mode) = entry.unix_mode() {
        options = options.unix_permissions(mode);
    }

    if entry.is_dir() {
        zip.add_directory(name.as_str(), options)
            .wrap_err_with(|| format!("Failed to create directory in output archive: {}", name))?;
        return Ok((name, None));
    }

    let mut body = Vec::new();
    let read = entry.read_to_end(&mut body);

    zip.start_file(name.as_str(), options)
        .wrap_err_with(|| format!("Failed to create file in output archive: {}", name))?;
    if let Err(e) = zip.write_all(&body) {
        warn!(entry = %name, error = %e, "Failed to write file in output archive");
    }

    match read {
        Ok(_) => Ok((name, Some(body))),
        Err(e) => {
            warn!(entry = %name, error = %e, "Failed to read file in input archive, not scanning it");
            Ok((name, None))
        }
    }
}

fn process_channel_file<F: Fetch, W: Write + Seek>(
    name: &str,
    body: &[u8],
    resolver: &AttachmentResolver<F>,
    zip: &mut ZipWriter<W>,
    summary: &mut RunSummary,
) -> Result<()> {
    debug!(entry = name, "Scanning channel file for attachments");

    let posts = parse_channel_file(body)
        .wrap_err_with(|| format!("Couldn't parse the JSON file: {}", name))?;

    for post in posts {
        let files = match post.attachments {
            Attachments::ShareWithoutFile => {
                warn!(ts = %post.ts, entry = name, "file_share post has no file object");
                summary.broken_shares += 1;
                continue;
            }
            other => other.into_files(),
        };

        for mut file in files {
            let outcome = resolver.resolve(zip, &post.ts, &mut file);
            summary.attachments.push(AttachmentRecord {
                file_id: file.id,
                ts: post.ts.clone(),
                outcome,
            });
        }
    }

    Ok(())
}
