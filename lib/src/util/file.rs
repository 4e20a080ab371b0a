use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use memmap2::Mmap;

/// Maps a container file into memory, read-only.
///
/// Decoders borrow payload slices out of the mapping, so the whole file
/// stays addressable without copying it.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Cannot open '{}'", path.display()))?;
    let map = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Cannot memory-map '{}'", path.display()))?;
    Ok(map)
}
