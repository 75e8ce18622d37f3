#![deny(missing_docs)]
//! An embeddable, single-writer key-value store following the Bitcask
//! design: an append-only log on disk plus an in-memory hash index
//! mapping each live key to the byte offset of its most recent record.
//!
//! ```no_run
//! # use minibitcask::Store;
//! # fn main() -> minibitcask::Result<()> {
//! let store = Store::open("/tmp/t1")?;
//! store.put("dbname", "minibitcask")?;
//! assert_eq!(store.get("dbname")?, b"minibitcask");
//! # Ok(())
//! # }
//! ```

mod error;
mod log_file;
mod record;
mod store;

pub use error::{KvsError, Result};
pub use record::{Mark, Record};
pub use store::{Store, StoreOptions};

use std::path::PathBuf;

/// Default data directory for the CLI demo binary: `./data/minibitcask`
/// under the current working directory.
pub fn get_default_data_dir() -> PathBuf {
    let mut dir = std::env::current_dir().unwrap();
    dir.push("data/minibitcask");
    dir
}
