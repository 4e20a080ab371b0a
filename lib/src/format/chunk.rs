use indexmap::IndexMap;

use crate::format::cursor::ByteCursor;

// Geometry
pub const K_CHUNK_GEOMETRY: u32 = 0x0000_0FA0;
// Geometry, "other" model format
pub const K_CHUNK_GEOMETRY_OTHER: u32 = 0x0000_0FA1;
// Raw texture, plain
pub const K_CHUNK_RAW_TEXTURE_PLAIN: u32 = 0x0000_0FA5;
// Texture filename table
pub const K_CHUNK_TEXTURE_FILENAMES: u32 = 0x0000_0FA6;
// Material filename table
pub const K_CHUNK_MATERIAL_FILENAMES: u32 = 0x0000_0FA7;
// Main header
pub const K_CHUNK_MAIN_HEADER: u32 = 0x0000_0F90;
// Map bounds
pub const K_CHUNK_MAP_BOUNDS: u32 = 0x0000_0FB0;

/// One `(id, size, payload)` record located during the directory scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkRecord {
    pub id: u32,
    pub size: u32,
    pub payload_offset: u32,
}

/// Index of top-level chunks in one container, keyed by chunk id.
///
/// Duplicate ids overwrite earlier entries (map insertion semantics).
/// Whether last-wins is intended game-format behavior or an artifact of the
/// reverse engineering is unconfirmed; it is preserved for compatibility.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkDirectory {
    records: IndexMap<u32, ChunkRecord>,
}

impl ChunkDirectory {
    /// Walks `(u32 id, u32 size)` headers starting at `header_len`.
    ///
    /// A zero id or zero size terminates the scan early; corrupted files
    /// reach one quickly and this keeps the walk from looping. A final chunk
    /// whose declared payload extends past the buffer is indexed with its
    /// size clamped to the bytes actually present, so its decoder can still
    /// report a truncation at the precise offset.
    pub fn scan(data: &[u8], header_len: usize) -> ChunkDirectory {
        let mut records = IndexMap::new();
        let Ok(mut cursor) = ByteCursor::at(data, header_len) else {
            return Self { records };
        };
        loop {
            if cursor.remaining() < 8 {
                break;
            }
            let id = cursor.read_u32().unwrap_or(0);
            let size = cursor.read_u32().unwrap_or(0);
            if id == 0 || size == 0 {
                break;
            }
            let payload_offset = cursor.offset();
            let stored = (size as usize).min(cursor.remaining());
            records.insert(id, ChunkRecord {
                id,
                size: stored as u32,
                payload_offset: payload_offset as u32,
            });
            if cursor.skip(size as usize).is_err() {
                break;
            }
        }
        Self { records }
    }

    pub fn get(&self, id: u32) -> Option<&ChunkRecord> { self.records.get(&id) }

    pub fn contains(&self, id: u32) -> bool { self.records.contains_key(&id) }

    /// Payload slice for a chunk, borrowed from the scanned buffer.
    pub fn payload<'a>(&self, data: &'a [u8], id: u32) -> Option<&'a [u8]> {
        let rec = self.records.get(&id)?;
        data.get(rec.payload_offset as usize..(rec.payload_offset + rec.size) as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> { self.records.values() }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }
}
