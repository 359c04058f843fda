//! `arcfs` — mirror a directory tree over FUSE, presenting `.rar`/`.zip`
//! archives inside it as browsable folders.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use arcfs_core::{Mirror, ToolRunner, DEFAULT_STATE_BASE};
use arcfs_fuse::ArcFs;
use clap::Parser;

#[derive(Parser)]
#[command(name = "arcfs", version, about = "Mirror a directory tree, exposing archives as folders")]
struct Cli {
    /// Directory tree to mirror
    root: PathBuf,

    /// Where to mount the mirrored tree
    mountpoint: PathBuf,

    /// Allow access by users other than the mounting one
    #[arg(long)]
    allow_other: bool,

    /// Keep per-archive mount directories under this directory
    #[arg(long, default_value = DEFAULT_STATE_BASE)]
    state_dir: PathBuf,
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Mirror::new(&cli.root, &cli.state_dir, Box::new(ToolRunner))?;

    // The kernel needs an existing directory to mount over.
    if !cli.mountpoint.exists() {
        fs::create_dir_all(&cli.mountpoint)?;
    }

    // Blocks until the filesystem is unmounted.
    ArcFs::new(engine).mount_foreground(&cli.mountpoint, cli.allow_other)?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("arcfs: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_parse_positionally() {
        let cli = Cli::try_parse_from(["arcfs", "/srv/media", "/mnt/media"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/srv/media"));
        assert_eq!(cli.mountpoint, PathBuf::from("/mnt/media"));
        assert!(!cli.allow_other);
        assert_eq!(cli.state_dir, PathBuf::from(DEFAULT_STATE_BASE));
    }

    #[test]
    fn allow_other_is_opt_in() {
        let cli =
            Cli::try_parse_from(["arcfs", "/srv/media", "/mnt/media", "--allow-other"]).unwrap();
        assert!(cli.allow_other);
    }

    #[test]
    fn state_dir_can_be_overridden() {
        let cli = Cli::try_parse_from([
            "arcfs",
            "/srv/media",
            "/mnt/media",
            "--state-dir",
            "/tmp/archmnt",
        ])
        .unwrap();
        assert_eq!(cli.state_dir, PathBuf::from("/tmp/archmnt"));
    }

    #[test]
    fn mountpoint_is_required() {
        assert!(Cli::try_parse_from(["arcfs", "/srv/media"]).is_err());
    }
}
