//! Decoded values and the renderers that produce them

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A decoded column value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// No stored value
    Null,
    /// Boolean
    Bool(bool),
    /// Any integer type
    Int(i64),
    /// Any floating point type
    Float(f64),
    /// Text
    Text(String),
    /// Uninterpreted bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// True for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer content, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Byte content, if any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", if *b { "t" } else { "f" }),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => {
                f.write_str("\\x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Turns the bytes of one stored value into a [`Value`]
pub trait ValueRenderer {
    /// Render `bytes`: the fixed-width field, or the varlena payload after
    /// decompression and external resolution
    fn render(&self, bytes: &[u8]) -> Value;
}

impl<F> ValueRenderer for F
where
    F: Fn(&[u8]) -> Value,
{
    fn render(&self, bytes: &[u8]) -> Value {
        self(bytes)
    }
}

fn padded_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Default for fixed-width columns without a renderer
///
/// Widths 1, 2 and 4 read as signed integers, anything else as NUL-padded
/// text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDefault;

impl ValueRenderer for FixedDefault {
    fn render(&self, bytes: &[u8]) -> Value {
        match *bytes {
            [b] => Value::Int(i64::from(b as i8)),
            [a, b] => Value::Int(i64::from(i16::from_le_bytes([a, b]))),
            [a, b, c, d] => Value::Int(i64::from(i32::from_le_bytes([a, b, c, d]))),
            _ => Value::Text(padded_text(bytes)),
        }
    }
}

/// Default for variable-length columns without a renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct VarlenaDefault;

impl ValueRenderer for VarlenaDefault {
    fn render(&self, bytes: &[u8]) -> Value {
        Value::Bytes(bytes.to_vec())
    }
}

fn render_bool(bytes: &[u8]) -> Value {
    match bytes.first() {
        Some(b) => Value::Bool(*b != 0),
        None => Value::Null,
    }
}

fn render_char(bytes: &[u8]) -> Value {
    Value::Text(padded_text(&bytes[..bytes.len().min(1)]))
}

fn render_signed(bytes: &[u8]) -> Value {
    match *bytes {
        [a, b, c, d, e, f, g, h] => Value::Int(i64::from_le_bytes([a, b, c, d, e, f, g, h])),
        _ => FixedDefault.render(bytes),
    }
}

fn render_unsigned(bytes: &[u8]) -> Value {
    match *bytes {
        [a, b, c, d] => Value::Int(i64::from(u32::from_le_bytes([a, b, c, d]))),
        _ => FixedDefault.render(bytes),
    }
}

fn render_float(bytes: &[u8]) -> Value {
    match *bytes {
        [a, b, c, d] => Value::Float(f64::from(f32::from_le_bytes([a, b, c, d]))),
        [a, b, c, d, e, f, g, h] => Value::Float(f64::from_le_bytes([a, b, c, d, e, f, g, h])),
        _ => Value::Bytes(bytes.to_vec()),
    }
}

fn render_text(bytes: &[u8]) -> Value {
    Value::Text(String::from_utf8_lossy(bytes).into_owned())
}

fn render_name(bytes: &[u8]) -> Value {
    Value::Text(padded_text(bytes))
}

/// Item pointer: block number as two 16-bit halves, then the slot
fn render_tid(bytes: &[u8]) -> Value {
    match *bytes {
        [a, b, c, d, e, f] => {
            let block = u32::from(u16::from_le_bytes([a, b])) << 16
                | u32::from(u16::from_le_bytes([c, d]));
            Value::Text(format!("({block},{})", u16::from_le_bytes([e, f])))
        }
        _ => Value::Bytes(bytes.to_vec()),
    }
}

fn render_bytes(bytes: &[u8]) -> Value {
    Value::Bytes(bytes.to_vec())
}

/// Type name to renderer mapping
#[derive(Default)]
pub struct RendererRegistry {
    renderers: HashMap<String, Box<dyn ValueRenderer>>,
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.renderers.keys().collect();
        names.sort();
        f.debug_struct("RendererRegistry")
            .field("types", &names)
            .finish()
    }
}

impl RendererRegistry {
    /// Registry without any renderer: every column uses the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with renderers for the built-in scalar types
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("bool", render_bool);
        registry.register("char", render_char);
        for name in ["int2", "int4", "int8"] {
            registry.register(name, render_signed);
        }
        for name in ["oid", "regproc", "xid", "cid"] {
            registry.register(name, render_unsigned);
        }
        for name in ["float4", "float8"] {
            registry.register(name, render_float);
        }
        for name in ["text", "varchar", "bpchar"] {
            registry.register(name, render_text);
        }
        for name in ["name", "cstring"] {
            registry.register(name, render_name);
        }
        registry.register("tid", render_tid);
        registry.register("bytea", render_bytes);
        registry
    }

    /// Register or replace the renderer for a type name
    pub fn register<S, R>(&mut self, type_name: S, renderer: R)
    where
        S: Into<String>,
        R: ValueRenderer + 'static,
    {
        self.renderers.insert(type_name.into(), Box::new(renderer));
    }

    /// Renderer registered for a type name
    pub fn get(&self, type_name: &str) -> Option<&dyn ValueRenderer> {
        self.renderers.get(type_name).map(AsRef::as_ref)
    }

    /// Whether a renderer is registered for a type name
    pub fn contains(&self, type_name: &str) -> bool {
        self.renderers.contains_key(type_name)
    }
}
