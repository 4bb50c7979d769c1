//! Parallel decoding of many packages.
//!
//! Each package still decodes on a single thread; only independent
//! packages are spread across the pool.

use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;
use upk_format::{Result, UpkError};

use crate::{open_with, OpenOptions, Package};

/// Thread pool configuration for [`open_many`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelConfig {
    /// Cap on worker threads; `None` uses rayon's default
    pub max_threads: Option<usize>,
}

/// Outcome of decoding one package in a batch
#[derive(Debug)]
pub struct BatchItem {
    /// Source path
    pub path: PathBuf,
    /// Decoded package or the error that stopped it
    pub result: Result<Package>,
}

/// Decode every path in parallel, preserving input order.
///
/// A failing package does not affect the others.
pub fn open_many<P>(paths: &[P], opts: &OpenOptions, config: ParallelConfig) -> Result<Vec<BatchItem>>
where
    P: AsRef<Path> + Sync,
{
    let mut builder = ThreadPoolBuilder::new().thread_name(|idx| format!("upk-decode-{}", idx));
    if let Some(threads) = config.max_threads {
        builder = builder.num_threads(threads.max(1));
    }
    let pool = builder.build().map_err(|e| {
        UpkError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("Failed to create thread pool: {}", e),
        ))
    })?;

    debug!(packages = paths.len(), threads = pool.current_num_threads(), "decoding batch");

    Ok(pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                BatchItem {
                    path: path.to_path_buf(),
                    result: open_with(path, opts),
                }
            })
            .collect()
    }))
}
