//! A thin CLI over [`minibitcask::Store`], in the style of the teacher
//! crate's `args.rs` + `bin/cli.rs`. Glue, not core (spec §1's Non-goals
//! name the driver program explicitly), kept around because every engine
//! in this lineage ships one.

use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use log::{error, LevelFilter};

use minibitcask::{get_default_data_dir, Result, Store, StoreOptions};

/// Command-line arguments for `minibitcaskctl`.
#[derive(Parser)]
#[clap(author, version, about)]
#[clap(propagate_version = true)]
struct Args {
    /// Store directory; defaults to `./data/minibitcask`.
    #[clap(long, value_parser)]
    dir: Option<PathBuf>,
    /// Fsync every write before returning (off by default, matching the
    /// reference's no-fsync behavior).
    #[clap(long)]
    sync_on_write: bool,
    /// Subcommand.
    #[clap(subcommand)]
    command: Commands,
}

/// Subcommands for `minibitcaskctl`.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Set the value of a key.
    Put {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Print the value of a key, or "Key not found".
    Get {
        /// Key
        key: String,
    },
    /// Remove a key.
    Delete {
        /// Key
        key: String,
    },
    /// Compact the log to contain only live records.
    Merge,
}

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    if let Err(e) = run() {
        error!("{}", e);
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let dir = args.dir.unwrap_or_else(get_default_data_dir);
    let options = StoreOptions {
        sync_on_write: args.sync_on_write,
    };
    let store = Store::open_with_options(dir, options)?;

    match args.command {
        Commands::Put { key, value } => store.put(key, value)?,
        Commands::Get { key } => match store.get_opt(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("Key not found"),
        },
        Commands::Delete { key } => store.delete(key)?,
        Commands::Merge => store.merge()?,
    }

    store.close()?;
    Ok(())
}
