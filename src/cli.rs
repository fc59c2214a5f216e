//! Command line surface for the `skulink` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::session::LinkingMode;
use crate::infrastructure::AppConfig;
use crate::linking::LinkingOptions;

#[derive(Parser, Debug)]
#[command(
    name = "skulink",
    version,
    about = "Link product images in object storage to catalog SKUs"
)]
pub struct Cli {
    /// Path to the config file. Default: skulink_config.json in the platform config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the bucket and link images to products.
    Run(RunArgs),
    /// Show the current state of one session.
    Status(SessionArgs),
    /// Ask a running session to pause at the next safe point.
    Pause(SessionArgs),
    /// List recent sessions, newest first.
    Sessions,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Incremental run that skips already linked images.
    Standard,
    /// Drop auto-matched links first, then relink everything.
    Refresh,
    /// Classify without writing anything.
    Audit,
    /// Continue a paused session from its cursor, with its recorded options.
    Resume,
}

impl From<ModeArg> for LinkingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Standard => LinkingMode::Standard,
            ModeArg::Refresh => LinkingMode::Refresh,
            ModeArg::Audit => LinkingMode::Audit,
            ModeArg::Resume => LinkingMode::Resume,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Run mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Standard)]
    pub mode: ModeArg,

    /// Session to resume. Only meaningful with --mode resume.
    #[arg(long)]
    pub session: Option<String>,

    /// Bucket to scan instead of the configured one.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Folder prefix to scan instead of the bucket root.
    #[arg(long)]
    pub path: Option<String>,

    /// Minimum confidence for a definitive link, 0-100.
    #[arg(long)]
    pub confidence_threshold: Option<u8>,

    /// Minimum confidence for a review candidate, 0-100.
    #[arg(long)]
    pub candidate_threshold: Option<u8>,

    /// Cap on automatically linked images per product.
    #[arg(long)]
    pub max_images: Option<u32>,

    /// Reclassify images that already have a link row.
    #[arg(long, default_value_t = false)]
    pub no_skip_existing: bool,

    /// Print progress lines until the run finishes.
    #[arg(long, default_value_t = false)]
    pub watch: bool,
}

impl RunArgs {
    /// Layer the command line over the configured defaults.
    pub fn into_options(self, config: &AppConfig) -> LinkingOptions {
        let mut options = LinkingOptions::from_config(config);
        options.mode = self.mode.into();
        options.session_id = self.session;
        if self.bucket.is_some() {
            options.bucket_name = self.bucket;
        }
        if self.path.is_some() {
            options.scan_path = self.path;
        }
        if let Some(threshold) = self.confidence_threshold {
            options.confidence_threshold = threshold;
        }
        if let Some(threshold) = self.candidate_threshold {
            options.candidate_threshold = threshold;
        }
        if let Some(cap) = self.max_images {
            options.max_images_per_product = cap;
        }
        if self.no_skip_existing {
            options.skip_existing = false;
        }
        options
    }
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session id as printed by `skulink run` or `skulink sessions`.
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config_defaults() {
        let cli = Cli::try_parse_from([
            "skulink",
            "run",
            "--mode",
            "refresh",
            "--path",
            "catalog/2024",
            "--confidence-threshold",
            "90",
            "--max-images",
            "5",
            "--no-skip-existing",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let options = args.into_options(&AppConfig::default());
        assert_eq!(options.mode, LinkingMode::Refresh);
        assert_eq!(options.scan_path.as_deref(), Some("catalog/2024"));
        assert_eq!(options.confidence_threshold, 90);
        assert_eq!(options.max_images_per_product, 5);
        assert!(!options.skip_existing);
        // untouched flags keep the configured values
        assert_eq!(options.candidate_threshold, 60);
        assert!(options.scan_all_folders);
    }

    #[test]
    fn resume_carries_the_session_id() {
        let cli = Cli::try_parse_from([
            "skulink",
            "run",
            "--mode",
            "resume",
            "--session",
            "abc-123",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let options = args.into_options(&AppConfig::default());
        assert_eq!(options.mode, LinkingMode::Resume);
        assert_eq!(options.session_id.as_deref(), Some("abc-123"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn status_takes_a_positional_session_id() {
        let cli = Cli::try_parse_from(["skulink", "status", "abc-123"]).unwrap();
        let Commands::Status(args) = cli.command else {
            panic!("expected status subcommand");
        };
        assert_eq!(args.session_id, "abc-123");
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["skulink", "sessions", "--config", "/tmp/skulink.json"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/skulink.json")));
        assert!(matches!(cli.command, Commands::Sessions));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = Cli::try_parse_from(["skulink", "run", "--mode", "turbo"]);
        assert!(err.is_err());
    }
}
