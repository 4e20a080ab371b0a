use anyhow::Result;

/// Source of container payloads referenced by file hash.
///
/// Filename tables never store text; they store hash pairs resolved against
/// the game archive. The decoder itself stays storage-agnostic behind this
/// trait so callers can back it with a .dat reader, a loose-file directory
/// or a fixture map in tests.
pub trait ArchiveSource {
    /// Reads the file at an archive index.
    fn read_file(&self, index: u32) -> Result<Vec<u8>>;

    /// Resolves a content hash to an archive index, if present.
    fn index_for_hash(&self, hash: u32) -> Option<u32>;

    /// Convenience lookup straight from a filename-table hash.
    fn read_by_hash(&self, hash: u32) -> Option<Result<Vec<u8>>> {
        self.index_for_hash(hash).map(|index| self.read_file(index))
    }
}
