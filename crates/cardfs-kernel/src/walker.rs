//! Recursive directory enumeration.

use futures::future::BoxFuture;
use std::path::Path;

use crate::vfs::{FileEntry, VfsResult, VolumeOps};

/// List everything under `root`, pre-order, at most `max_depth` levels
/// below its direct children.
///
/// `max_depth == 0` yields only the direct children. Entry paths are
/// relative to `root`. A directory's descendants follow its own entry.
///
/// Only a failure to list `root` itself is an error; a sub-directory that
/// cannot be listed is logged and skipped.
pub async fn walk(volume: &dyn VolumeOps, root: &Path, max_depth: u32) -> VfsResult<Vec<FileEntry>> {
    let mut entries = Vec::new();
    collect(volume, root, String::new(), max_depth, &mut entries).await?;
    Ok(entries)
}

fn collect<'a>(
    volume: &'a dyn VolumeOps,
    root: &'a Path,
    prefix: String,
    depth: u32,
    out: &'a mut Vec<FileEntry>,
) -> BoxFuture<'a, VfsResult<()>> {
    Box::pin(async move {
        let dir = if prefix.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&prefix)
        };
        for child in volume.list_one_level(&dir).await? {
            let path = if prefix.is_empty() {
                child.name
            } else {
                format!("{}/{}", prefix, child.name)
            };
            let is_dir = child.kind.is_dir();
            out.push(FileEntry::new(path.clone(), child.size, is_dir));

            if is_dir && depth > 0 {
                if let Err(e) = collect(volume, root, path.clone(), depth - 1, out).await {
                    tracing::warn!("skipping {}: {}", path, e);
                }
            }
        }
        Ok(())
    })
}
