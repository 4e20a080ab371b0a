use crate::format::cursor::{check_count, ParseError, MAX_VERTEX_STRIDE};

// Legacy fixed-function vertex-format encoding. The raw flags value stored
// in model headers is not usable directly; it is remapped into an internal
// bit layout first and the stride recovered from three lookup tables over
// 4-bit sub-fields. Ported arithmetic, not derivable from first principles.

const FVF_POSITION: u32 = 0x1;
const FVF_GROUP: u32 = 0x2;
const FVF_NORMAL: u32 = 0x4;
const FVF_DIFFUSE: u32 = 0x8;
const FVF_SPECULAR: u32 = 0x800;
const FVF_TANGENT: u32 = 0x1000;
const FVF_BITANGENT: u32 = 0x2000;

// position/group/normal/diffuse nibble
const FVF_SIZES_BASE: [u32; 16] =
    [0, 12, 4, 16, 12, 24, 16, 28, 4, 16, 8, 20, 16, 28, 20, 32];
// texcoord count (3 bits) + specular nibble
const FVF_SIZES_TEX: [u32; 16] =
    [0, 8, 16, 24, 32, 40, 48, 56, 4, 12, 20, 28, 36, 44, 52, 60];
// tangent/bitangent nibble
const FVF_SIZES_TANGENT: [u32; 16] =
    [0, 12, 12, 24, 0, 12, 12, 24, 0, 12, 12, 24, 0, 12, 12, 24];

/// Remaps the on-disk flags value into the internal FVF bit layout:
/// texcoord-count and specular bits move up to bits 8..11, the tangent pair
/// relocates from bits 16..17 down to 12..13, and the low attribute nibble
/// stays put.
pub fn remap_fvf(raw: u32) -> u32 {
    ((raw & 0xf0) << 4) | ((raw & 0x3_0000) >> 4) | (raw & 0xf)
}

/// Which attributes one model's vertices carry, fixed for every vertex in
/// the model.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VertexLayout {
    pub has_position: bool,
    pub has_group: bool,
    pub has_normal: bool,
    pub has_diffuse: bool,
    pub has_specular: bool,
    pub has_tangent: bool,
    pub has_bitangent: bool,
    pub num_texcoords: u32,
    pub num_unknown_floats: u32,
    pub stride: u32,
}

impl VertexLayout {
    /// Resolves raw format flags plus the header-declared per-vertex byte
    /// size into a layout.
    ///
    /// Trailing bytes not covered by any known attribute become
    /// `num_unknown_floats`; a negative or non-multiple-of-4 remainder
    /// flags the model unparseable. Raw flags of exactly zero select the
    /// legacy fallback layout (position plus unknown floats).
    pub fn resolve(raw_flags: u32, declared_stride: u32) -> Result<VertexLayout, ParseError> {
        check_count("vertex stride", declared_stride, MAX_VERTEX_STRIDE)?;
        if raw_flags == 0 {
            return Self::resolve_legacy(declared_stride);
        }

        let fvf = remap_fvf(raw_flags);
        let known = FVF_SIZES_BASE[(fvf & 0xf) as usize]
            + FVF_SIZES_TEX[((fvf >> 8) & 0xf) as usize]
            + FVF_SIZES_TANGENT[((fvf >> 12) & 0xf) as usize];
        let num_unknown_floats = Self::unknown_floats(declared_stride, known)?;

        Ok(VertexLayout {
            has_position: fvf & FVF_POSITION != 0,
            has_group: fvf & FVF_GROUP != 0,
            has_normal: fvf & FVF_NORMAL != 0,
            has_diffuse: fvf & FVF_DIFFUSE != 0,
            has_specular: fvf & FVF_SPECULAR != 0,
            has_tangent: fvf & FVF_TANGENT != 0,
            has_bitangent: fvf & FVF_BITANGENT != 0,
            num_texcoords: ((fvf >> 8) & 0x7).min(8),
            num_unknown_floats,
            stride: declared_stride,
        })
    }

    fn resolve_legacy(declared_stride: u32) -> Result<VertexLayout, ParseError> {
        let num_unknown_floats = Self::unknown_floats(declared_stride, 12)?;
        Ok(VertexLayout {
            has_position: true,
            num_unknown_floats,
            stride: declared_stride,
            ..Default::default()
        })
    }

    fn unknown_floats(declared: u32, known: u32) -> Result<u32, ParseError> {
        if declared < known {
            return Err(ParseError::NegativeDerivedSize { context: "vertex stride remainder" });
        }
        let rest = declared - known;
        if rest % 4 != 0 {
            return Err(ParseError::NegativeDerivedSize { context: "vertex stride remainder" });
        }
        Ok(rest / 4)
    }

    /// Byte total of all attributes flagged present, excluding unknowns.
    pub fn known_attribute_bytes(&self) -> u32 {
        let mut n = 0;
        if self.has_position {
            n += 12;
        }
        if self.has_group {
            n += 4;
        }
        if self.has_normal {
            n += 12;
        }
        if self.has_diffuse {
            n += 4;
        }
        if self.has_specular {
            n += 4;
        }
        if self.has_tangent {
            n += 12;
        }
        if self.has_bitangent {
            n += 12;
        }
        n + self.num_texcoords * 8
    }
}
