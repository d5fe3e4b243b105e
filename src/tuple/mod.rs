//! Heap tuples: header, column schema, values and the decoder

pub mod decoder;
pub mod header;
pub mod schema;
pub mod value;

pub use decoder::{decode_tuple, DecodeContext, DecodeError, DecodedTuple, RenderMode};
pub use header::TupleHeader;
pub use schema::{ColumnDef, ColumnSchema, TypeRegistry};
pub use value::{FixedDefault, RendererRegistry, Value, ValueRenderer, VarlenaDefault};
