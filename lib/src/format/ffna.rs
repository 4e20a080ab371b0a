use binrw::binrw;

use crate::format::{
    chunk::{ChunkDirectory, K_CHUNK_MAIN_HEADER, K_CHUNK_MAP_BOUNDS},
    cursor::{ByteCursor, ParseError},
    Partial,
};

pub const FFNA_SIGNATURE: [u8; 4] = *b"ffna";
// 4-byte signature + 1-byte type discriminator
pub const FFNA_HEADER_LEN: usize = 5;

/// Container type discriminator stored in the fifth byte of the file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FfnaType {
    Map,
    Model,
    Other(u8),
}

impl FfnaType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            2 => FfnaType::Map,
            3 => FfnaType::Model,
            n => FfnaType::Other(n),
        }
    }
}

/// Validates the signature and returns the container type.
pub fn parse_header(data: &[u8]) -> Result<FfnaType, ParseError> {
    let mut cursor = ByteCursor::new(data);
    let signature: [u8; 4] = cursor.read()?;
    if signature != FFNA_SIGNATURE {
        return Err(ParseError::BadSignature { found: signature });
    }
    Ok(FfnaType::from_raw(cursor.read_u8()?))
}

/// Main header chunk. All but `file_id` remain unknown.
#[binrw]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MainHeader {
    pub version: u32,
    pub file_id: u32,
    pub flags: u32,
    pub unk: [u32; 2],
}

/// Map bounds chunk (type-2 containers), world-plane extents.
#[binrw]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// Filename-table entry. Filenames are not stored as text; the two id
/// halves encode a content hash resolvable through the archive layer.
#[binrw]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FileRef {
    pub id0: u16,
    pub id1: u16,
    pub flags: u32,
}

impl FileRef {
    /// Content hash for the archive lookup, or `None` when the id pair is
    /// below the encoding base (seen in padding entries).
    pub fn file_hash(&self) -> Option<u32> {
        (self.id0 as u32 + self.id1 as u32 * 0xFF00).checked_sub(0xFF00FF)
    }
}

/// Decodes a filename-table payload: a flat run of 8-byte entries.
pub fn decode_filename_table(payload: &[u8]) -> Partial<Vec<FileRef>> {
    let mut refs = Vec::with_capacity(payload.len() / 8);
    let mut cursor = ByteCursor::new(payload);
    while cursor.remaining() >= 8 {
        match cursor.read_binrw::<FileRef>() {
            Ok(r) => refs.push(r),
            Err(e) => return Partial::failed(refs, e),
        }
    }
    if cursor.remaining() != 0 {
        let err = ParseError::Truncated {
            offset: payload.len() - cursor.remaining(),
            needed: 8,
            len: payload.len(),
        };
        return Partial::failed(refs, err);
    }
    Partial::ok(refs)
}

/// Decoded view of a type-2 (map) container.
///
/// Only the primitive records are interpreted; everything else stays
/// reachable through the chunk directory as opaque payloads.
#[derive(Clone, Debug, PartialEq)]
pub struct MapDocument {
    pub file_type: FfnaType,
    pub directory: ChunkDirectory,
    pub header: Option<MainHeader>,
    pub bounds: Option<MapBounds>,
}

impl MapDocument {
    pub fn decode(data: &[u8]) -> Result<Partial<MapDocument>, ParseError> {
        let file_type = parse_header(data)?;
        let directory = ChunkDirectory::scan(data, FFNA_HEADER_LEN);
        let mut doc = MapDocument { file_type, directory, header: None, bounds: None };
        let mut first_error = None;

        if let Some(payload) = doc.directory.payload(data, K_CHUNK_MAIN_HEADER) {
            match ByteCursor::new(payload).read_binrw::<MainHeader>() {
                Ok(h) => doc.header = Some(h),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(payload) = doc.directory.payload(data, K_CHUNK_MAP_BOUNDS) {
            match ByteCursor::new(payload).read_binrw::<MapBounds>() {
                Ok(b) => doc.bounds = Some(b),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        Ok(match first_error {
            None => Partial::ok(doc),
            Some(e) => Partial::failed(doc, e),
        })
    }
}
