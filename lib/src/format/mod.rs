pub mod chunk;
pub mod cursor;
pub mod ffna;
pub mod fvf;
pub mod material;
pub mod model;

use cursor::ParseError;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CVector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CVector3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self { Self { x, y, z } }

    pub const fn splat(v: f32) -> Self { Self { x: v, y: v, z: v } }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CAABox {
    pub min: CVector3f,
    pub max: CVector3f,
}

impl CAABox {
    pub const EMPTY: Self = Self {
        min: CVector3f::splat(f32::INFINITY),
        max: CVector3f::splat(f32::NEG_INFINITY),
    };

    pub fn is_empty(&self) -> bool { self.min.x > self.max.x }

    pub fn extend(&mut self, p: CVector3f) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }
}

impl Default for CAABox {
    fn default() -> Self { Self::EMPTY }
}

/// Outcome of a chunk-level decode: whatever was decoded before the failure
/// point, plus the failure itself when the stream stopped being trustworthy.
#[derive(Clone, Debug, PartialEq)]
pub struct Partial<T> {
    pub value: T,
    pub error: Option<ParseError>,
}

impl<T> Partial<T> {
    pub fn ok(value: T) -> Self { Self { value, error: None } }

    pub fn failed(value: T, error: ParseError) -> Self { Self { value, error: Some(error) } }

    pub fn parsed_correctly(&self) -> bool { self.error.is_none() }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U> {
        Partial { value: f(self.value), error: self.error }
    }
}
