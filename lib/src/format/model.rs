use log::warn;
use zerocopy::{FromBytes, FromZeroes, LittleEndian, U16, U32};

use crate::format::{
    chunk::{
        ChunkDirectory, K_CHUNK_GEOMETRY, K_CHUNK_GEOMETRY_OTHER, K_CHUNK_MATERIAL_FILENAMES,
        K_CHUNK_TEXTURE_FILENAMES,
    },
    cursor::{
        check_count, ByteCursor, ParseError, MAX_BINDING_DIM, MAX_COMPLEX_COUNT, MAX_INDEX_COUNT,
        MAX_MODEL_COUNT, MAX_VERTEX_COUNT,
    },
    ffna::{decode_filename_table, parse_header, FfnaType, FileRef, FFNA_HEADER_LEN},
    fvf::VertexLayout,
    CAABox, CVector3f, Partial,
};

type U16L = U16<LittleEndian>;
type U32L = U32<LittleEndian>;

// Complex-struct section present
const GEOMETRY_FLAG_COMPLEX: u32 = 0x8;

/// Which of the two near-identical geometry chunk layouts is being decoded.
/// The "other" model format carries one extra header word per sub-model;
/// everything else is shared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormatVariant {
    Standard,
    Other,
}

impl FormatVariant {
    pub fn from_chunk_id(id: u32) -> Option<Self> {
        match id {
            K_CHUNK_GEOMETRY => Some(FormatVariant::Standard),
            K_CHUNK_GEOMETRY_OTHER => Some(FormatVariant::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, FromBytes, FromZeroes)]
#[repr(C, packed)]
struct RawGeometryHeader {
    unk0: U32L,
    flags: U32L,
    num_models: U32L,
    max_uv_index: U16L,
    num_slots: U16L,
    num_strings: U16L,
    string_block_len: U16L,
    aux_counts: [U16L; 4],
    poly: [u8; 16],
}

#[derive(Clone, Debug, FromBytes, FromZeroes)]
#[repr(C, packed)]
struct RawModelHeader {
    num_indices: [U32L; 3],
    num_vertices: U32L,
    dat_fvf: U32L,
    vertex_size: U32L,
    aux_counts: [u8; 3],
    pad: u8,
    slot_offset: U16L,
    slot_count: U16L,
}

/// Decoded geometry chunk header. Most fields feed size arithmetic for the
/// optional sections and stay otherwise uninterpreted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GeometryHeader {
    pub unk0: u32,
    pub flags: u32,
    pub num_models: u32,
    pub max_uv_index: u16,
    pub num_slots: u16,
    pub num_strings: u16,
    pub string_block_len: u16,
    pub aux_counts: [u16; 4],
    pub poly: [u8; 16],
}

impl GeometryHeader {
    fn from_raw(raw: &RawGeometryHeader) -> Self {
        Self {
            unk0: raw.unk0.get(),
            flags: raw.flags.get(),
            num_models: raw.num_models.get(),
            max_uv_index: raw.max_uv_index.get(),
            num_slots: raw.num_slots.get(),
            num_strings: raw.num_strings.get(),
            string_block_len: raw.string_block_len.get(),
            aux_counts: raw.aux_counts.map(|v| v.get()),
            poly: raw.poly,
        }
    }
}

// Ported size formulas. Reverse-engineered arithmetic with no known simpler
// semantic model; must not be "simplified".

fn string_table_len(h: &GeometryHeader) -> usize {
    h.num_strings as usize * 2 + h.string_block_len as usize
}

fn aux_block_len(h: &GeometryHeader) -> usize {
    let [a0, a1, a2, a3] = h.aux_counts.map(usize::from);
    (a0 + a1 * 2 + a2 + a3 * 6) * 4
}

fn complex_elem_len(p: &[u8; 16]) -> usize {
    let p = p.map(usize::from);
    16 + p[1] * 8
        + p[2] * 8
        + p[3] * 4
        + p[4] * 4
        + p[5] * 2
        + p[6] * 2
        + p[7] * 2
        + p[8]
        + p[9]
        + p[10] * 12
        + p[11] * 4
        + p[12] * 2
        + p[13] * 8
        + p[14] * 4
        + p[15] * 24
}

fn model_aux_len(c: [u8; 3]) -> usize {
    (c[0] as usize + c[1] as usize + c[2] as usize * 3) * 4
}

/// Texture/vertex-shader binding slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TextureBinding {
    pub uv_index: u8,
    pub texture_index: u8,
    pub blend_flag: u8,
}

/// One vertex, fields present per the model's [`VertexLayout`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: CVector3f,
    pub group: Option<u32>,
    pub normal: Option<CVector3f>,
    pub tangent: Option<CVector3f>,
    pub bitangent: Option<CVector3f>,
    pub diffuse: Option<u32>,
    pub specular: Option<u32>,
    pub tex_coords: Vec<[f32; 2]>,
    pub unknown: Vec<f32>,
}

/// One decoded sub-model: concatenated LOD index streams over a shared
/// vertex buffer, plus an opaque trailing auxiliary block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryModel {
    /// Declared index count per LOD tier. Tiers re-declaring a previous
    /// tier's count are not stored again; see [`GeometryModel::lod_indices`].
    pub lod_counts: [u32; 3],
    pub indices: Vec<u16>,
    pub vertices: Vec<Vertex>,
    pub layout: Option<VertexLayout>,
    pub aux_data: Vec<u8>,
    pub bounds: CAABox,
    pub centroid: CVector3f,
    pub slot_offset: u16,
    pub slot_count: u16,
    pub unk_other: u32,
}

impl GeometryModel {
    fn lod_segments(&self) -> [(usize, usize); 3] {
        let [n0, n1, n2] = self.lod_counts.map(|n| n as usize);
        let seg0 = (0, n0);
        let mut stored = n0;
        let seg1 = if n1 == n0 {
            seg0
        } else {
            let s = (stored, n1);
            stored += n1;
            s
        };
        let seg2 = if n2 == n0 {
            seg0
        } else if n2 == n1 {
            seg1
        } else {
            (stored, n2)
        };
        [seg0, seg1, seg2]
    }

    /// Index slice for one LOD tier, re-sliced from the concatenated index
    /// array using the declared per-tier counts. Empty for models whose
    /// decode stopped before the index stream.
    pub fn lod_indices(&self, tier: usize) -> &[u16] {
        let (offset, len) = self.lod_segments()[tier.min(2)];
        self.indices.get(offset..offset + len).unwrap_or(&[])
    }
}

// Position, normal, tangent and bitangent triples are serialized (x, z, y)
// with y negated.
fn read_swizzled_vec3(cur: &mut ByteCursor) -> Result<CVector3f, ParseError> {
    let x = cur.read_f32()?;
    let z = cur.read_f32()?;
    let y = cur.read_f32()?;
    Ok(CVector3f { x, y: -y, z })
}

fn read_vertex(cur: &mut ByteCursor, layout: &VertexLayout) -> Result<Vertex, ParseError> {
    let mut v = Vertex::default();
    if layout.has_position {
        v.position = read_swizzled_vec3(cur)?;
    }
    if layout.has_group {
        v.group = Some(cur.read_u32()?);
    }
    if layout.has_normal {
        v.normal = Some(read_swizzled_vec3(cur)?);
    }
    if layout.has_diffuse {
        v.diffuse = Some(cur.read_u32()?);
    }
    if layout.has_specular {
        v.specular = Some(cur.read_u32()?);
    }
    if layout.has_tangent {
        v.tangent = Some(read_swizzled_vec3(cur)?);
    }
    if layout.has_bitangent {
        v.bitangent = Some(read_swizzled_vec3(cur)?);
    }
    for _ in 0..layout.num_texcoords {
        let u = cur.read_f32()?;
        let t = cur.read_f32()?;
        v.tex_coords.push([u, t]);
    }
    for _ in 0..layout.num_unknown_floats {
        v.unknown.push(cur.read_f32()?);
    }
    Ok(v)
}

/// Decodes one sub-model at the cursor. On failure the partially-populated
/// model is returned for inspection but must not be rendered.
pub fn decode_model(cur: &mut ByteCursor, variant: FormatVariant) -> Partial<GeometryModel> {
    let mut model = GeometryModel::default();
    match decode_model_into(&mut model, cur, variant) {
        Ok(()) => Partial::ok(model),
        Err(e) => Partial::failed(model, e),
    }
}

fn decode_model_into(
    model: &mut GeometryModel,
    cur: &mut ByteCursor,
    variant: FormatVariant,
) -> Result<(), ParseError> {
    let raw: RawModelHeader = cur.read()?;
    if variant == FormatVariant::Other {
        model.unk_other = cur.read_u32()?;
    }
    model.lod_counts =
        [raw.num_indices[0].get(), raw.num_indices[1].get(), raw.num_indices[2].get()];
    model.slot_offset = raw.slot_offset.get();
    model.slot_count = raw.slot_count.get();

    let n0 = check_count("lod0 index", model.lod_counts[0], MAX_INDEX_COUNT)?;
    let n1 = check_count("lod1 index", model.lod_counts[1], MAX_INDEX_COUNT)?;
    let n2 = check_count("lod2 index", model.lod_counts[2], MAX_INDEX_COUNT)?;
    let num_vertices = check_count("vertex", raw.num_vertices.get(), MAX_VERTEX_COUNT)?;

    // tiers re-declaring an earlier tier's count alias its data
    let mut total_num_indices = n0;
    if n1 != n0 {
        total_num_indices += n1;
    }
    if n2 != n0 && n2 != n1 {
        total_num_indices += n2;
    }
    let index_bytes = cur.read_bytes(total_num_indices * 2)?;
    model.indices = index_bytes.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
    for &index in &model.indices {
        // reject, never clamp
        if index as usize >= num_vertices {
            return Err(ParseError::IndexOutOfRange {
                index,
                vertex_count: raw.num_vertices.get(),
            });
        }
    }

    let layout = VertexLayout::resolve(raw.dat_fvf.get(), raw.vertex_size.get())?;
    model.layout = Some(layout);

    let mut sum = CVector3f::default();
    for _ in 0..num_vertices {
        let v = read_vertex(cur, &layout)?;
        model.bounds.extend(v.position);
        sum.x += v.position.x;
        sum.y += v.position.y;
        sum.z += v.position.z;
        model.vertices.push(v);
    }
    if num_vertices > 0 {
        let n = num_vertices as f32;
        model.centroid = CVector3f::new(sum.x / n, sum.y / n, sum.z / n);
    }

    model.aux_data = cur.read_bytes(model_aux_len(raw.aux_counts))?.to_vec();
    Ok(())
}

/// Fully decoded geometry chunk: binding table, optional string/auxiliary
/// and complex-struct sections, then the sub-models.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryChunk {
    pub variant: FormatVariant,
    pub header: GeometryHeader,
    pub bindings: Vec<TextureBinding>,
    /// Cleared when the binding table was dropped because a dimension
    /// exceeded its sanity ceiling. Geometry remains usable.
    pub textures_ok: bool,
    pub string_block: Vec<u8>,
    pub aux_block: Vec<u8>,
    pub complex: Vec<Vec<u8>>,
    /// Layout of the first fully decoded model, as the chunk-representative
    /// layout for buffer setup.
    pub layout: Option<VertexLayout>,
    pub models: Vec<GeometryModel>,
}

impl GeometryChunk {
    pub fn decode(payload: &[u8], variant: FormatVariant) -> Partial<GeometryChunk> {
        let mut chunk = GeometryChunk {
            variant,
            header: GeometryHeader::default(),
            bindings: Vec::new(),
            textures_ok: true,
            string_block: Vec::new(),
            aux_block: Vec::new(),
            complex: Vec::new(),
            layout: None,
            models: Vec::new(),
        };
        let mut cur = ByteCursor::new(payload);
        match Self::decode_into(&mut chunk, &mut cur) {
            Ok(()) => Partial::ok(chunk),
            Err(e) => Partial::failed(chunk, e),
        }
    }

    fn decode_into(chunk: &mut GeometryChunk, cur: &mut ByteCursor) -> Result<(), ParseError> {
        let raw: RawGeometryHeader = cur.read()?;
        chunk.header = GeometryHeader::from_raw(&raw);
        let h = chunk.header;

        let table_bytes = h.max_uv_index as usize * h.num_slots as usize * 3;
        if h.max_uv_index as u32 > MAX_BINDING_DIM || h.num_slots as u32 > MAX_BINDING_DIM {
            // dropping textures is preferable to losing the geometry, so the
            // table is skipped rather than aborting the chunk
            warn!(
                "binding table {}x{} exceeds ceiling, dropping texture bindings",
                h.max_uv_index, h.num_slots
            );
            chunk.textures_ok = false;
            cur.skip(table_bytes)?;
        } else {
            let bytes = cur.read_bytes(table_bytes)?;
            chunk.bindings = bytes
                .chunks_exact(3)
                .map(|t| TextureBinding { uv_index: t[0], texture_index: t[1], blend_flag: t[2] })
                .collect();
        }

        if h.num_strings != 0 {
            chunk.string_block = cur.read_bytes(string_table_len(&h))?.to_vec();
            chunk.aux_block = cur.read_bytes(aux_block_len(&h))?.to_vec();
        }

        if h.flags & GEOMETRY_FLAG_COMPLEX != 0 {
            let count = check_count("complex struct", h.poly[0] as u32, MAX_COMPLEX_COUNT)?;
            let elem_len = complex_elem_len(&h.poly);
            for _ in 0..count {
                chunk.complex.push(cur.read_bytes(elem_len)?.to_vec());
            }
        }

        let num_models = check_count("model", h.num_models, MAX_MODEL_COUNT)?;
        for i in 0..num_models {
            let decoded = decode_model(cur, chunk.variant);
            if chunk.layout.is_none() && decoded.parsed_correctly() {
                chunk.layout = decoded.value.layout;
            }
            let error = decoded.error;
            chunk.models.push(decoded.value);
            if let Some(e) = error {
                warn!("geometry model {i} failed: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Binding slots for one sub-model, or `None` when textures were
    /// dropped or the model's declared slot range exceeds the table.
    pub fn model_bindings(&self, index: usize) -> Option<&[TextureBinding]> {
        if !self.textures_ok {
            return None;
        }
        let m = self.models.get(index)?;
        let start = m.slot_offset as usize;
        self.bindings.get(start..start + m.slot_count as usize)
    }

    /// NUL-separated entries of the optional string table.
    pub fn strings(&self) -> Vec<&[u8]> {
        self.string_block.split(|&b| b == 0).filter(|s| !s.is_empty()).collect()
    }
}

/// Decoded view of a type-3 (model) container.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelDocument {
    pub file_type: FfnaType,
    pub directory: ChunkDirectory,
    pub geometry: Option<GeometryChunk>,
    pub texture_filenames: Vec<FileRef>,
    pub material_filenames: Vec<FileRef>,
}

impl ModelDocument {
    /// Decodes everything recognized in the container. A failure deep in
    /// one chunk is reported through the returned [`Partial`] while the
    /// sections decoded before it stay populated.
    pub fn decode(data: &[u8]) -> Result<Partial<ModelDocument>, ParseError> {
        let file_type = parse_header(data)?;
        let directory = ChunkDirectory::scan(data, FFNA_HEADER_LEN);
        let mut doc = ModelDocument {
            file_type,
            directory,
            geometry: None,
            texture_filenames: Vec::new(),
            material_filenames: Vec::new(),
        };
        let mut first_error = None;

        let geometry = [K_CHUNK_GEOMETRY, K_CHUNK_GEOMETRY_OTHER].into_iter().find_map(|id| {
            let variant = FormatVariant::from_chunk_id(id)?;
            Some((doc.directory.payload(data, id)?, variant))
        });
        if let Some((payload, variant)) = geometry {
            let decoded = GeometryChunk::decode(payload, variant);
            first_error = decoded.error;
            doc.geometry = Some(decoded.value);
        }

        if let Some(payload) = doc.directory.payload(data, K_CHUNK_TEXTURE_FILENAMES) {
            let refs = decode_filename_table(payload);
            if first_error.is_none() {
                first_error = refs.error;
            }
            doc.texture_filenames = refs.value;
        }
        if let Some(payload) = doc.directory.payload(data, K_CHUNK_MATERIAL_FILENAMES) {
            let refs = decode_filename_table(payload);
            if first_error.is_none() {
                first_error = refs.error;
            }
            doc.material_filenames = refs.value;
        }

        Ok(match first_error {
            None => Partial::ok(doc),
            Some(e) => Partial::failed(doc, e),
        })
    }
}
