//! flightfs CLI
//!
//! Builds and inspects archive images served by the read-only backend.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use flightfs::{Backend, Config, FsError, MemoryArchive, OpenFlags, RomfsBackend};
use tracing_subscriber::{fmt, EnvFilter};

/// flightfs archive tool
#[derive(Parser, Debug)]
#[command(name = "flightfs")]
#[command(about = "Build and inspect flightfs archive images")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a directory tree into an image
    Pack {
        /// Directory to pack
        dir: PathBuf,

        /// Output image file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List a directory inside an image
    Ls {
        /// Image file
        image: PathBuf,

        /// Directory inside the image
        #[arg(default_value = "/")]
        dir: String,
    },

    /// Print a file from an image
    Cat {
        /// Image file
        image: PathBuf,

        /// File inside the image
        file: String,
    },

    /// Show size and type of a path inside an image
    Stat {
        /// Image file
        image: PathBuf,

        /// Path inside the image
        path: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,flightfs=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> flightfs::Result<()> {
    match command {
        Commands::Pack { dir, output } => {
            let mut builder = MemoryArchive::builder();
            let mut count = 0;
            collect(&dir, &dir, &mut |name, contents| {
                builder = std::mem::take(&mut builder).file(name, contents);
                count += 1;
            })?;
            builder.build().save(&output)?;
            tracing::info!("packed {} files into {}", count, output.display());
        }

        Commands::Ls { image, dir } => {
            let backend = open_image(&image)?;
            let handle = backend.opendir(&dir)?;
            while let Some(entry) = backend.readdir(handle)? {
                let suffix = if entry.is_dir() { "/" } else { "" };
                println!("{}{}", entry.name, suffix);
            }
            backend.closedir(handle)?;
        }

        Commands::Cat { image, file } => {
            let backend = open_image(&image)?;
            let fd = backend.open(&file, OpenFlags::RDONLY)?;
            let mut stdout = io::stdout().lock();
            let mut buf = [0u8; 4096];
            loop {
                let n = backend.read(fd, &mut buf)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
            }
            backend.close(fd)?;
        }

        Commands::Stat { image, path } => {
            let backend = open_image(&image)?;
            let stat = backend.stat(&path)?;
            let kind = if stat.is_dir() { "directory" } else { "file" };
            println!("{}: {} ({} bytes, mode {:o})", path, kind, stat.size, stat.mode);
        }
    }
    Ok(())
}

fn open_image(path: &Path) -> flightfs::Result<RomfsBackend<MemoryArchive>> {
    let archive = MemoryArchive::load(path)?;
    Ok(RomfsBackend::new(archive, &Config::default()))
}

/// Walk `dir`, handing every regular file to `add` with its archive name
fn collect(
    root: &Path,
    dir: &Path,
    add: &mut dyn FnMut(&str, Vec<u8>),
) -> flightfs::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(root, &path, add)?;
            continue;
        }
        let relative = path.strip_prefix(root).map_err(|_| FsError::InvalidArgument)?;
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        add(&name, fs::read(&path)?);
    }
    Ok(())
}
