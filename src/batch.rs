//! Directory batch solving.
//!
//! Reinstated standalone mode: every `.equ` file in an input directory is
//! decoded with the host-order file framing, its equations are evaluated on
//! the worker pool, and a solved counterpart with the same name is written
//! to the output directory. A file that fails to decode or write is logged
//! and counted; it never aborts the rest of the batch.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    pool::{PoolError, ThreadPool},
    protocol::{Framing, ProtocolError, RequestEnvelope},
};

const EQUATION_FILE_EXT: &str = "equ";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to list {path}: {source}")]
    ListDir { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Totals for one directory run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub solved: usize,
    pub failed: usize,
}

/// Solves every `.equ` file under `input`, writing solved files of the
/// same name under `output`, using `thread_count` workers.
pub fn solve_directory(
    input: &Path,
    output: &Path,
    thread_count: u8,
) -> Result<BatchSummary, BatchError> {
    let entries = fs::read_dir(input).map_err(|source| BatchError::ListDir {
        path: input.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == EQUATION_FILE_EXT))
        .collect();
    files.sort();

    let mut pool = ThreadPool::new(thread_count)?;
    let solved = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    for path in files {
        let Some(name) = path.file_name() else {
            continue;
        };
        let out_path = output.join(name);
        let solved = Arc::clone(&solved);
        let failed = Arc::clone(&failed);
        let failed_closure = Arc::clone(&failed);

        let submitted = pool.submit(move || match solve_file(&path, &out_path) {
            Ok(count) => {
                debug!("{}: solved {count} equations", path.display());
                solved.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                warn!("{}: {e}", path.display());
                failed_closure.fetch_add(1, Ordering::SeqCst);
            }
        });
        if submitted.is_err() {
            failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pool.wait();
    pool.shutdown();

    Ok(BatchSummary {
        solved: solved.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
    })
}

/// Solves one equation file, returning the number of equations it held.
fn solve_file(input: &Path, output: &Path) -> Result<usize, ProtocolError> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut envelope = RequestEnvelope::decode(&mut reader, Framing::File)?;

    envelope.solve_all();

    let mut writer = BufWriter::new(File::create(output)?);
    envelope.encode_reply(&mut writer, Framing::File)?;
    writer.flush()?;

    Ok(envelope.equations.len())
}
