//! Fixed record layouts: ordered `(name, primitive type)` field lists

/// Primitive field types a layout can be made of
///
/// All multi-byte integers are little-endian on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Signed byte
    I8,
    /// Unsigned byte
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// Fixed-length byte array
    Bytes(usize),
    /// Fixed-length, null-terminated byte array
    CStr(usize),
}

impl FieldType {
    /// Number of bytes the field occupies
    pub const fn width(self) -> usize {
        match self {
            FieldType::I8 | FieldType::U8 => 1,
            FieldType::I16 | FieldType::U16 => 2,
            FieldType::I32 | FieldType::U32 => 4,
            FieldType::Bytes(n) | FieldType::CStr(n) => n,
        }
    }
}

/// One named field of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name used for lookups in decoded records
    pub name: &'static str,
    /// Primitive type of the field
    pub ty: FieldType,
}

/// Shorthand for building static field tables
pub const fn field(name: &'static str, ty: FieldType) -> Field {
    Field { name, ty }
}

/// An ordered, immutable sequence of fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    name: &'static str,
    fields: &'static [Field],
}

impl Layout {
    /// Create a layout from a static field table
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self { name, fields }
    }

    /// Layout name, used in diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the layout declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total byte size of the declared fields
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|f| f.ty.width()).sum()
    }

    /// Whether the layout declares a field with this name
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}
