use binrw::binrw;
use log::warn;

use crate::format::{
    cursor::{
        check_count, ByteCursor, ParseError, MAX_BLOB_BYTES, MAX_SIGNATURE_LEN, MAX_TEXTURE_REFS,
    },
    ffna::FileRef,
    model::TextureBinding,
    Partial,
};

// Tiers are numbered 2 (highest) down to 0.
pub const NUM_TECHNIQUE_TIERS: usize = 3;

#[binrw]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaterialHeader {
    pub unk0: u32,
    pub version: u32,
    pub flags: u32,
    pub reserved: u32,
}

/// Per-texture entry of a material file. The id pair encodes a content hash
/// the same way filename tables do.
#[binrw]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MaterialTextureRef {
    pub id0: u16,
    pub id1: u16,
    pub slot: u8,
    pub uv_set: u8,
    pub flags: u16,
    pub unk: u32,
}

impl MaterialTextureRef {
    pub fn file_hash(&self) -> Option<u32> {
        FileRef { id0: self.id0, id1: self.id1, flags: 0 }.file_hash()
    }
}

/// One shader technique record: a signature string, its quality tier, an
/// opaque constant blob and an optional texture-ordering permutation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Technique {
    pub signature: String,
    pub tier: u32,
    pub unk: [u32; 2],
    pub blob: Vec<u8>,
    pub texture_order: Vec<u32>,
}

fn decode_technique(cur: &mut ByteCursor) -> Result<Technique, ParseError> {
    let declared = check_count("technique record", cur.read_u32()?, MAX_BLOB_BYTES)?;
    let start = cur.offset();

    let signature_bytes = cur.read_cstr(MAX_SIGNATURE_LEN as usize)?;
    let signature = String::from_utf8_lossy(signature_bytes).into_owned();
    let tier = cur.read_u32()?;
    let unk = [cur.read_u32()?, cur.read_u32()?];
    let blob_len = check_count("technique blob", cur.read_u32()?, MAX_BLOB_BYTES)?;
    let blob = cur.read_bytes(blob_len)?.to_vec();

    let consumed = cur.offset() - start;
    let Some(rest) = declared.checked_sub(consumed) else {
        return Err(ParseError::NegativeDerivedSize { context: "technique record size" });
    };
    // whatever declared bytes remain are read as a texture-order list; a
    // remainder below word size is padding and gets skipped
    let mut texture_order = Vec::with_capacity(rest / 4);
    for _ in 0..rest / 4 {
        texture_order.push(cur.read_u32()?);
    }
    cur.skip(rest % 4)?;

    Ok(Technique { signature, tier, unk, blob, texture_order })
}

/// Decoded material (.mtl-equivalent) file: header, texture references,
/// two opaque sub-blocks, then technique records keyed by tier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialFile {
    pub header: MaterialHeader,
    pub textures: Vec<MaterialTextureRef>,
    pub sub_blocks: [Vec<u8>; 2],
    pub techniques: [Option<Technique>; NUM_TECHNIQUE_TIERS],
}

impl MaterialFile {
    /// Decodes a material payload. `texture_count` comes from the owning
    /// model's texture filename table; the file itself does not restate it.
    pub fn decode(data: &[u8], texture_count: u32) -> Partial<MaterialFile> {
        let mut mat = MaterialFile::default();
        let mut cur = ByteCursor::new(data);
        match Self::decode_into(&mut mat, &mut cur, texture_count) {
            Ok(()) => Partial::ok(mat),
            Err(e) => Partial::failed(mat, e),
        }
    }

    fn decode_into(
        mat: &mut MaterialFile,
        cur: &mut ByteCursor,
        texture_count: u32,
    ) -> Result<(), ParseError> {
        mat.header = cur.read_binrw::<MaterialHeader>()?;

        let num_textures = check_count("material texture ref", texture_count, MAX_TEXTURE_REFS)?;
        for _ in 0..num_textures {
            mat.textures.push(cur.read_binrw::<MaterialTextureRef>()?);
        }

        for block in mat.sub_blocks.iter_mut() {
            let len = check_count("material sub-block", cur.read_u32()?, MAX_BLOB_BYTES)?;
            *block = cur.read_bytes(len)?.to_vec();
        }

        while cur.remaining() >= 4 {
            let technique = decode_technique(cur)?;
            match mat.techniques.get_mut(technique.tier as usize) {
                Some(slot) => *slot = Some(technique),
                None => warn!(
                    "technique '{}' declares unknown tier {}, ignored",
                    technique.signature, technique.tier
                ),
            }
        }
        Ok(())
    }

    /// Best technique present, highest tier first.
    pub fn best_technique(&self) -> Option<&Technique> {
        self.techniques.iter().rev().flatten().next()
    }
}

/// Applies a technique's texture-order permutation to a model's binding
/// slots. A permutation whose length or indices do not match the slots is
/// ignored and the original order kept.
pub fn reorder_bindings(bindings: &[TextureBinding], technique: &Technique) -> Vec<TextureBinding> {
    let order = &technique.texture_order;
    if order.is_empty() {
        return bindings.to_vec();
    }
    if order.len() != bindings.len() {
        warn!(
            "technique '{}' orders {} textures but model binds {}, keeping original order",
            technique.signature,
            order.len(),
            bindings.len()
        );
        return bindings.to_vec();
    }
    let mut out = Vec::with_capacity(bindings.len());
    for &i in order {
        match bindings.get(i as usize) {
            Some(b) => out.push(*b),
            None => {
                warn!(
                    "technique '{}' references texture {} past the binding table",
                    technique.signature, i
                );
                return bindings.to_vec();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn texture_ref(id0: u16, id1: u16, slot: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id0.to_le_bytes());
        out.extend_from_slice(&id1.to_le_bytes());
        out.push(slot);
        out.push(0); // uv_set
        out.extend_from_slice(&0u16.to_le_bytes());
        push_u32(&mut out, 0);
        out
    }

    fn technique_record(signature: &str, tier: u32, blob: &[u8], order: &[u32], pad: usize) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(signature.as_bytes());
        body.push(0);
        push_u32(&mut body, tier);
        push_u32(&mut body, 0);
        push_u32(&mut body, 0);
        push_u32(&mut body, blob.len() as u32);
        body.extend_from_slice(blob);
        for &i in order {
            push_u32(&mut body, i);
        }
        body.extend_from_slice(&vec![0u8; pad]);

        let mut out = Vec::new();
        push_u32(&mut out, body.len() as u32);
        out.extend_from_slice(&body);
        out
    }

    fn material_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        for v in [7u32, 1, 0, 0] {
            push_u32(&mut data, v); // header
        }
        data.extend_from_slice(&texture_ref(0x200, 0x100, 0));
        data.extend_from_slice(&texture_ref(0x300, 0x100, 1));
        push_u32(&mut data, 3); // first sub-block
        data.extend_from_slice(&[9, 9, 9]);
        push_u32(&mut data, 0); // second sub-block empty
        data
    }

    #[test]
    fn decodes_header_textures_and_technique() {
        let mut data = material_bytes();
        data.extend_from_slice(&technique_record("vs_basic", 0, &[1, 2], &[1, 0], 0));

        let mat = MaterialFile::decode(&data, 2);
        assert!(mat.parsed_correctly());
        let mat = mat.value;
        assert_eq!(mat.header.unk0, 7);
        assert_eq!(mat.textures.len(), 2);
        assert!(mat.textures[0].file_hash().is_some());
        assert_eq!(mat.sub_blocks[0], &[9, 9, 9]);
        assert!(mat.sub_blocks[1].is_empty());

        let t = mat.techniques[0].as_ref().unwrap();
        assert_eq!(t.signature, "vs_basic");
        assert_eq!(t.blob, &[1, 2]);
        assert_eq!(t.texture_order, &[1, 0]);
        assert_eq!(mat.best_technique().unwrap().signature, "vs_basic");
    }

    #[test]
    fn sub_word_record_padding_is_skipped() {
        let mut data = material_bytes();
        // declared size leaves 2 trailing bytes: not enough for an order
        // entry, must be consumed without desyncing the next record
        data.extend_from_slice(&technique_record("a", 0, &[], &[], 2));
        data.extend_from_slice(&technique_record("b", 2, &[], &[], 0));

        let mat = MaterialFile::decode(&data, 2);
        assert!(mat.parsed_correctly());
        assert!(mat.value.techniques[0].is_some());
        assert_eq!(mat.value.techniques[2].as_ref().unwrap().signature, "b");
        assert_eq!(mat.value.best_technique().unwrap().signature, "b");
    }

    #[test]
    fn record_smaller_than_consumed_rejected() {
        let mut data = material_bytes();
        let mut record = technique_record("longname", 0, &[1, 2, 3, 4], &[], 0);
        record[..4].copy_from_slice(&4u32.to_le_bytes()); // lie about the size
        data.extend_from_slice(&record);

        let mat = MaterialFile::decode(&data, 2);
        assert!(matches!(mat.error, Some(ParseError::NegativeDerivedSize { .. })));
        // sections before the bad record stay decoded
        assert_eq!(mat.value.textures.len(), 2);
    }

    #[test]
    fn unknown_tier_is_ignored() {
        let mut data = material_bytes();
        data.extend_from_slice(&technique_record("x", 9, &[], &[], 0));
        let mat = MaterialFile::decode(&data, 2);
        assert!(mat.parsed_correctly());
        assert!(mat.value.techniques.iter().all(Option::is_none));
        assert!(mat.value.best_technique().is_none());
    }

    #[test]
    fn oversized_sub_block_rejected_keeps_textures() {
        let mut data = Vec::new();
        for v in [0u32; 4] {
            push_u32(&mut data, v);
        }
        data.extend_from_slice(&texture_ref(0x200, 0x100, 0));
        push_u32(&mut data, MAX_BLOB_BYTES + 1);

        let mat = MaterialFile::decode(&data, 1);
        assert!(matches!(mat.error, Some(ParseError::UnreasonableSize { .. })));
        assert_eq!(mat.value.textures.len(), 1);
    }

    #[test]
    fn reorder_applies_permutation() {
        let bindings = [
            TextureBinding { uv_index: 0, texture_index: 10, blend_flag: 0 },
            TextureBinding { uv_index: 1, texture_index: 11, blend_flag: 0 },
            TextureBinding { uv_index: 2, texture_index: 12, blend_flag: 0 },
        ];
        let technique = Technique { texture_order: vec![2, 0, 1], ..Default::default() };
        let out = reorder_bindings(&bindings, &technique);
        assert_eq!(out[0].texture_index, 12);
        assert_eq!(out[1].texture_index, 10);
        assert_eq!(out[2].texture_index, 11);
    }

    #[test]
    fn reorder_falls_back_on_mismatch() {
        let bindings = [
            TextureBinding { uv_index: 0, texture_index: 10, blend_flag: 0 },
            TextureBinding { uv_index: 1, texture_index: 11, blend_flag: 0 },
        ];
        // wrong length
        let technique = Technique { texture_order: vec![0], ..Default::default() };
        assert_eq!(reorder_bindings(&bindings, &technique), bindings);
        // index past the table
        let technique = Technique { texture_order: vec![0, 5], ..Default::default() };
        assert_eq!(reorder_bindings(&bindings, &technique), bindings);
        // no order at all
        let technique = Technique::default();
        assert_eq!(reorder_bindings(&bindings, &technique), bindings);
    }
}
