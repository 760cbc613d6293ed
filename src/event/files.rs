//! Turn filesystem paths into a base64 document batch.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use frames::FileObject;
use futures_util::future::join_all;

use crate::error::StackError;
use crate::logger::Logger;

/// Read every path concurrently and encode the readable ones.
///
/// Unreadable paths are logged at warn level and left out. Output order
/// follows input order.
///
/// # Errors
///
/// Returns [`StackError::NoValidFiles`] if nothing could be read.
pub async fn encode_files(paths: &[PathBuf], logger: &dyn Logger) -> Result<Vec<FileObject>, StackError> {
    let reads = join_all(paths.iter().map(|path| async move { (path, tokio::fs::read(path).await) })).await;

    let mut files = Vec::with_capacity(reads.len());
    for (path, read) in reads {
        match read {
            Ok(bytes) => files.push(FileObject { name: file_name(path), content: STANDARD.encode(bytes) }),
            Err(e) => logger.warn(&format!("File not found: {} ({e})", path.display())),
        }
    }

    if files.is_empty() {
        logger.error("No valid files to store");
        return Err(StackError::NoValidFiles);
    }
    Ok(files)
}

/// Final path component, or `""` when there is none.
fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
#[path = "files_test.rs"]
mod tests;
