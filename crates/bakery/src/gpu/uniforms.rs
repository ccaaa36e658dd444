use std::collections::BTreeMap;

use tracing::warn;

/// Host-side value for a named shader uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for UniformValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        Self::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        Self::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        Self::Vec4(value)
    }
}

/// GLSL type of a uniform slot. Booleans are stored as `uint` on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Bool,
    Int,
    UInt,
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    /// Maps a GLSL type keyword to a supported kind.
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        match keyword {
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int),
            "uint" => Some(Self::UInt),
            "float" => Some(Self::Float),
            "vec2" => Some(Self::Vec2),
            "vec3" => Some(Self::Vec3),
            "vec4" => Some(Self::Vec4),
            _ => None,
        }
    }

    /// Type keyword used inside the generated std140 block.
    pub fn block_type(self) -> &'static str {
        match self {
            Self::Bool | Self::UInt => "uint",
            Self::Int => "int",
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
        }
    }

    /// `(alignment, size)` in bytes under std140.
    fn std140(self) -> (u32, u32) {
        match self {
            Self::Bool | Self::Int | Self::UInt | Self::Float => (4, 4),
            Self::Vec2 => (8, 8),
            Self::Vec3 => (16, 12),
            Self::Vec4 => (16, 16),
        }
    }
}

impl UniformValue {
    /// Encodes the value for a slot of `kind`.
    ///
    /// Integer and boolean scalars convert between each other and widen to
    /// float; vectors must match exactly.
    pub fn encode(self, kind: UniformKind) -> Option<Vec<u8>> {
        use UniformKind as K;
        use UniformValue as V;

        let bytes = match (kind, self) {
            (K::Float, V::Float(v)) => bytemuck::bytes_of(&v).to_vec(),
            (K::Float, V::Int(v)) => bytemuck::bytes_of(&(v as f32)).to_vec(),
            (K::Float, V::UInt(v)) => bytemuck::bytes_of(&(v as f32)).to_vec(),
            (K::Int, V::Int(v)) => bytemuck::bytes_of(&v).to_vec(),
            (K::Int, V::UInt(v)) => bytemuck::bytes_of(&i32::try_from(v).ok()?).to_vec(),
            (K::Int, V::Bool(v)) => bytemuck::bytes_of(&i32::from(v)).to_vec(),
            (K::UInt, V::UInt(v)) => bytemuck::bytes_of(&v).to_vec(),
            (K::UInt, V::Int(v)) => bytemuck::bytes_of(&u32::try_from(v).ok()?).to_vec(),
            (K::UInt, V::Bool(v)) => bytemuck::bytes_of(&u32::from(v)).to_vec(),
            (K::Bool, V::Bool(v)) => bytemuck::bytes_of(&u32::from(v)).to_vec(),
            (K::Bool, V::Int(v)) => bytemuck::bytes_of(&u32::from(v != 0)).to_vec(),
            (K::Bool, V::UInt(v)) => bytemuck::bytes_of(&u32::from(v != 0)).to_vec(),
            (K::Vec2, V::Vec2(v)) => bytemuck::cast_slice(&v).to_vec(),
            (K::Vec3, V::Vec3(v)) => bytemuck::cast_slice(&v).to_vec(),
            (K::Vec4, V::Vec4(v)) => bytemuck::cast_slice(&v).to_vec(),
            _ => return None,
        };
        Some(bytes)
    }

    fn decode(kind: UniformKind, bytes: &[u8]) -> Self {
        let floats = |count: usize| -> Vec<f32> { bytemuck::pod_collect_to_vec(&bytes[..count * 4]) };
        match kind {
            UniformKind::Bool => Self::Bool(bytemuck::pod_read_unaligned::<u32>(&bytes[..4]) != 0),
            UniformKind::Int => Self::Int(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformKind::UInt => Self::UInt(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformKind::Float => Self::Float(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformKind::Vec2 => {
                let v = floats(2);
                Self::Vec2([v[0], v[1]])
            }
            UniformKind::Vec3 => {
                let v = floats(3);
                Self::Vec3([v[0], v[1], v[2]])
            }
            UniformKind::Vec4 => {
                let v = floats(4);
                Self::Vec4([v[0], v[1], v[2], v[3]])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Byte layout of the generated uniform block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    size: u32,
    order: Vec<String>,
    slots: BTreeMap<String, UniformSlot>,
}

impl UniformLayout {
    /// Lays the fields out in declaration order following std140 rules.
    pub fn std140<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, UniformKind)>,
    {
        let mut layout = Self::default();
        let mut cursor = 0u32;
        for (name, kind) in fields {
            if layout.slots.contains_key(name) {
                continue;
            }
            let (align, size) = kind.std140();
            let offset = cursor.next_multiple_of(align);
            cursor = offset + size;
            layout.order.push(name.to_owned());
            layout.slots.insert(name.to_owned(), UniformSlot { offset, kind });
        }
        layout.size = cursor.next_multiple_of(16);
        layout
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }

    /// Field names in block order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, UniformKind)> + '_ {
        self.order
            .iter()
            .map(|name| (name.as_str(), self.slots[name].kind))
    }
}

/// CPU shadow of a program's uniform block.
///
/// Writes land here first; the device uploads the bytes before the next draw
/// when [`UniformBlock::take_dirty`] reports a change.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    data: Vec<u8>,
    dirty: bool,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let data = vec![0u8; layout.size() as usize];
        Self {
            layout,
            data,
            dirty: true,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.layout.get(name).is_some()
    }

    /// Writes `value` into `name`'s slot. Unknown names are a silent no-op;
    /// type mismatches are logged and skipped.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        let Some(slot) = self.layout.get(name) else {
            return false;
        };
        let Some(bytes) = value.encode(slot.kind) else {
            warn!(uniform = name, ?value, kind = ?slot.kind, "uniform type mismatch; value ignored");
            return false;
        };
        let start = slot.offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(&bytes);
        self.dirty = true;
        true
    }

    pub fn value(&self, name: &str) -> Option<UniformValue> {
        let slot = self.layout.get(name)?;
        Some(UniformValue::decode(
            slot.kind,
            &self.data[slot.offset as usize..],
        ))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns whether the block changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_offsets_match_glsl_rules() {
        let layout = UniformLayout::std140([
            ("u_time", UniformKind::Float),
            ("u_campos", UniformKind::Vec3),
            ("u_drawbg", UniformKind::Bool),
            ("u_size", UniformKind::Vec2),
            ("u_tint", UniformKind::Vec4),
        ]);

        assert_eq!(layout.get("u_time").unwrap().offset, 0);
        assert_eq!(layout.get("u_campos").unwrap().offset, 16);
        // a scalar may pack into the tail of a vec3
        assert_eq!(layout.get("u_drawbg").unwrap().offset, 28);
        assert_eq!(layout.get("u_size").unwrap().offset, 32);
        assert_eq!(layout.get("u_tint").unwrap().offset, 48);
        assert_eq!(layout.size(), 64);
    }

    #[test]
    fn unknown_uniform_is_a_no_op() {
        let mut block = UniformBlock::new(UniformLayout::std140([("u_time", UniformKind::Float)]));
        block.take_dirty();
        assert!(!block.set("u_missing", UniformValue::Float(1.0)));
        assert!(!block.take_dirty());
    }

    #[test]
    fn set_then_read_back_with_coercion() {
        let mut block = UniformBlock::new(UniformLayout::std140([
            ("u_width", UniformKind::Float),
            ("u_drawbg", UniformKind::Bool),
            ("u_campos", UniformKind::Vec3),
        ]));

        assert!(block.set("u_width", UniformValue::Int(512)));
        assert!(block.set("u_drawbg", UniformValue::Bool(true)));
        assert!(block.set("u_campos", [1.0, 2.0, 3.0].into()));

        assert_eq!(block.value("u_width"), Some(UniformValue::Float(512.0)));
        assert_eq!(block.value("u_drawbg"), Some(UniformValue::Bool(true)));
        assert_eq!(
            block.value("u_campos"),
            Some(UniformValue::Vec3([1.0, 2.0, 3.0]))
        );
        assert!(block.take_dirty());
    }

    #[test]
    fn vector_mismatch_is_rejected() {
        let mut block = UniformBlock::new(UniformLayout::std140([("u_campos", UniformKind::Vec3)]));
        assert!(!block.set("u_campos", UniformValue::Vec2([1.0, 2.0])));
        assert!(!block.set("u_campos", UniformValue::Float(1.0)));
    }
}
