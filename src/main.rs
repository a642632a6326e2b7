use clap::{Args, Parser, Subcommand};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use slack_export_attachments::process;
use slack_export_attachments::utils::FetchConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

/// Add the file attachments of a Slack export to the archive itself.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/slack-export-attachments/config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log every entry and attachment processed.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors and skip the final summary.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch all file attachments and add them to the output archive.
    FetchAttachments(FetchArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Slack export archive to read.
    #[arg(short, long, value_name = "PATH")]
    input_archive: PathBuf,

    /// Archive to create. Overwritten if it exists.
    #[arg(short, long, value_name = "PATH")]
    output_archive: PathBuf,

    /// Slack API token used as a bearer token for downloads.
    #[arg(long, value_name = "TOKEN", env = "SLACK_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Local directory containing already downloaded attachments, named `<file-id>...`.
    #[arg(long, value_name = "PATH")]
    attachments_dir: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    api_token: Option<String>,
    attachments_dir: Option<PathBuf>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("slack-export-attachments/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "warn,slack_export_attachments=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge CLI/env arguments over the config file (CLI/env > Config).
fn resolve_config(args: FetchArgs, file_cfg: FileConfig, quiet: bool) -> Result<FetchConfig> {
    let api_token = args
        .api_token
        .filter(|t| !t.is_empty())
        .or(file_cfg.api_token)
        .filter(|t| !t.is_empty());
    let attachments_dir = args.attachments_dir.or(file_cfg.attachments_dir);

    if let Some(dir) = &attachments_dir
        && !dir.is_dir()
    {
        return Err(eyre!(
            "Attachments directory not found: {}",
            dir.display()
        ));
    }

    Ok(FetchConfig {
        input_archive: args.input_archive,
        output_archive: args.output_archive,
        api_token,
        attachments_dir,
        quiet,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    match cli.command {
        Command::FetchAttachments(args) => {
            // 2. Resolve token and attachments dir
            let config = resolve_config(args, file_cfg, cli.quiet)?;

            // 3. Run the Business Logic
            let summary = process::execute(&config)?;
            if !config.quiet {
                eprintln!("{}", summary.line());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(api_token: Option<&str>, attachments_dir: Option<PathBuf>) -> FetchArgs {
        FetchArgs {
            input_archive: PathBuf::from("export.zip"),
            output_archive: PathBuf::from("out.zip"),
            api_token: api_token.map(String::from),
            attachments_dir,
        }
    }

    #[test]
    fn missing_explicit_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = load_file_config(Some(dir.path().join("nope.toml").as_path()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn unparsable_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_token = [unterminated").unwrap();
        let err = load_file_config(Some(path.as_path())).err().unwrap();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn reads_config_file_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            format!(
                "api_token = \"xoxp-file\"\nattachments_dir = {:?}\n",
                dir.path().to_str().unwrap()
            ),
        )
        .unwrap();
        let cfg = load_file_config(Some(path.as_path())).unwrap();
        assert_eq!(cfg.api_token.as_deref(), Some("xoxp-file"));
        assert_eq!(cfg.attachments_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn cli_wins_over_config_file() {
        let cli_dir = TempDir::new().unwrap();
        let file_dir = TempDir::new().unwrap();
        let file_cfg = FileConfig {
            api_token: Some("xoxp-file".into()),
            attachments_dir: Some(file_dir.path().to_path_buf()),
        };
        let config = resolve_config(
            args(Some("xoxp-cli"), Some(cli_dir.path().to_path_buf())),
            file_cfg,
            false,
        )
        .unwrap();
        assert_eq!(config.api_token.as_deref(), Some("xoxp-cli"));
        assert_eq!(config.attachments_dir.as_deref(), Some(cli_dir.path()));
    }

    #[test]
    fn config_file_fills_missing_args() {
        let file_dir = TempDir::new().unwrap();
        let file_cfg = FileConfig {
            api_token: Some("xoxp-file".into()),
            attachments_dir: Some(file_dir.path().to_path_buf()),
        };
        let config = resolve_config(args(None, None), file_cfg, true).unwrap();
        assert_eq!(config.api_token.as_deref(), Some("xoxp-file"));
        assert_eq!(config.attachments_dir.as_deref(), Some(file_dir.path()));
        assert!(config.quiet);
    }

    #[test]
    fn empty_token_counts_as_none() {
        let config = resolve_config(args(Some(""), None), FileConfig::default(), false).unwrap();
        assert_eq!(config.api_token, None);

        let file_cfg = FileConfig {
            api_token: Some(String::new()),
            attachments_dir: None,
        };
        let config = resolve_config(args(Some(""), None), file_cfg, false).unwrap();
        assert_eq!(config.api_token, None);

        let file_cfg = FileConfig {
            api_token: Some("xoxp-file".into()),
            attachments_dir: None,
        };
        let config = resolve_config(args(Some(""), None), file_cfg, false).unwrap();
        assert_eq!(config.api_token.as_deref(), Some("xoxp-file"));
    }

    #[test]
    fn attachments_dir_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir.txt");
        fs::write(&file, b"x").unwrap();

        for path in [file, dir.path().join("missing")] {
            let err = resolve_config(args(None, Some(path)), FileConfig::default(), false)
                .err()
                .unwrap();
            assert!(err.to_string().contains("Attachments directory not found"));
        }
    }

    #[test]
    fn parses_fetch_subcommand() {
        let cli = Cli::try_parse_from([
            "slack-export-attachments",
            "fetch-attachments",
            "-i",
            "export.zip",
            "-o",
            "out.zip",
            "--api-token",
            "xoxp-cli",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::FetchAttachments(args) = cli.command;
        assert_eq!(args.input_archive, PathBuf::from("export.zip"));
        assert_eq!(args.output_archive, PathBuf::from("out.zip"));
        assert_eq!(args.api_token.as_deref(), Some("xoxp-cli"));
    }
}
