//! Publisher CLI: scan, sign, and summarise a directory of release
//! artifacts, or generate a signing keypair.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use updraft::crypto::ecdsa;
use updraft::events::Relay;
use updraft::releaser::{ReleaserConfig, ReleaserSvc, SummaryOutput};

#[derive(Parser)]
#[command(name = "updraft-release", version, about = "Build release manifests for updraft")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory of artifacts and emit the release summary,
    /// checksums, and signatures.
    Publish {
        /// Directory holding the built artifacts.
        #[arg(long, default_value = ".")]
        target: PathBuf,

        /// Directory receiving version.json, checksums.txt, and .asc files.
        /// Defaults to the target directory.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Filename template, e.g. "myapp-{platform}-{arch}{variant}{version}".
        #[arg(long)]
        pattern: String,

        /// Release version applied to artifacts without one in their name.
        #[arg(long)]
        release_version: String,

        /// Prefix for asset download URLs.
        #[arg(long, default_value = "")]
        download_prefix: String,

        /// Path to the signing key (PGP armor or ECDSA PEM).
        #[arg(long)]
        private_key: Option<PathBuf>,

        /// Accept any archive extension after the pattern.
        #[arg(long, default_value_t = true)]
        allow_any_extension: bool,

        /// Fail on files that do not match the pattern.
        #[arg(long)]
        strict: bool,

        /// Emit version.yaml instead of version.json.
        #[arg(long)]
        yaml: bool,

        /// Emit compact JSON instead of indented.
        #[arg(long)]
        compact: bool,
    },

    /// Generate an ECDSA P-256 signing keypair.
    Keygen {
        /// Where to write the private key.
        #[arg(long, default_value = "updraft-signing.pem")]
        private_out: PathBuf,

        /// Where to write the public key.
        #[arg(long, default_value = "updraft-signing.pub.pem")]
        public_out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Publish {
            target,
            output,
            pattern,
            release_version,
            download_prefix,
            private_key,
            allow_any_extension,
            strict,
            yaml,
            compact,
        } => {
            let output = output.unwrap_or_else(|| target.clone());
            let summary_output = if yaml {
                SummaryOutput::Yaml
            } else if compact {
                SummaryOutput::Json
            } else {
                SummaryOutput::JsonIndented
            };

            let mut config = ReleaserConfig::default()
                .with_target_path(&target)
                .with_output_path(&output)
                .with_file_pattern(pattern)
                .with_version(release_version)
                .with_download_prefix(download_prefix)
                .with_allow_any_extension(allow_any_extension)
                .with_strict(strict)
                .with_summary_output_type(summary_output);

            match private_key {
                Some(path) => config = config.with_private_key_path(path),
                None => config = config.with_generate_signatures(false),
            }

            let mut releaser = ReleaserSvc::new(config, Arc::new(Relay::with_tracing()));
            releaser.hydrate().context("failed to initialise releaser")?;
            let summary = releaser
                .generate_release_summary()
                .context("failed to generate release summary")?;

            println!(
                "published {} assets for version {}",
                summary.assets.len(),
                summary.version
            );
            Ok(())
        }

        Commands::Keygen { private_out, public_out } => {
            let (private_pem, public_pem) =
                ecdsa::generate_keypair().context("key generation failed")?;
            std::fs::write(&private_out, private_pem)
                .with_context(|| format!("writing {}", private_out.display()))?;
            std::fs::write(&public_out, public_pem)
                .with_context(|| format!("writing {}", public_out.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(
                    &private_out,
                    std::fs::Permissions::from_mode(0o600),
                )?;
            }

            println!("wrote {} and {}", private_out.display(), public_out.display());
            Ok(())
        }
    }
}
