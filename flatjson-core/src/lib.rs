//! A schema-driven JSON codec with transparent flattening.
//!
//! Shapes are described up front in a [`SchemaSet`]. An element marked as flattened has no key of
//! its own: the elements of its object (or the entries of its map) appear directly among the keys
//! of the enclosing object, in any order and interleaved with the enclosing object's own keys.
//!
//! Decoding stays single-pass over the input as long as keys arrive in an order the frames can
//! take them in. Keys that show up before the structure that owns them is open are remembered by
//! position and replayed once the enclosing object has been scanned, so no intermediate tree is
//! ever built. Structures are only entered when something of them is present; see
//! [`Decoder::structures_entered`].
//!
//! ```
//! use flatjson_core::{Codec, Element, ScalarKind, SchemaBuilder, ShapeKind, Value};
//!
//! let mut b = SchemaBuilder::new();
//! let string = b.scalar(ScalarKind::String);
//! let int = b.scalar(ScalarKind::Int);
//! let inner = b
//!     .add("Inner", ShapeKind::Object { elements: vec![Element::new("c", int)] })
//!     .unwrap();
//! let outer = b
//!     .add(
//!         "Outer",
//!         ShapeKind::Object {
//!             elements: vec![Element::new("a", string), Element::new("b", inner).flatten()],
//!         },
//!     )
//!     .unwrap();
//! let codec = Codec::new(b.build_shared().unwrap());
//!
//! let value = codec.decode_value(outer, r#"{"c": 1, "a": "x"}"#).unwrap();
//! assert_eq!(value.get("a"), Some(&Value::String("x".into())));
//! assert_eq!(codec.encode_value(outer, &value).unwrap(), r#"{"a":"x","c":1}"#);
//! ```

mod cache;
mod codec;
mod config;
mod decode;
mod decoder;
mod deferred;
mod descriptor;
mod element_info;
mod encoder;
mod error;
mod pool;
mod reader;
mod resolver;
mod shape;
mod span;
mod stack;
mod value;
mod writer;

pub use cache::{
    cache_for, CacheKey, DescriptorCache, ExclusiveCache, SharedCache, ThreadLocalCache,
    TwoLevelCache,
};
pub use codec::{Codec, CodecBuilder};
pub use config::{
    CacheMode, Config, DescriptorConfig, NamingStrategy, DEFAULT_CLASS_DISCRIMINATOR,
    DEFAULT_MAX_INLINE_PROPERTIES, DEFAULT_MAX_POOLED_SESSIONS, DEFAULT_MAX_STRUCTURE_DEPTH,
    STRUCTURE_DEPTH_RANGE,
};
pub use decode::Decode;
pub use decoder::{Decoder, Subtype};
pub use descriptor::{
    DescriptorKind, ElementMeta, EnumTable, SchemaDescriptor, MAX_INLINE_DEPTH,
    MAX_TOTAL_ELEMENTS, VALUE_WRAPPER_ELEMENT,
};
pub use element_info::ElementInfo;
pub use error::{DecodeError, DecodeErrorKind, DecodeResult, EncodeError, SchemaError};
pub use indexmap::IndexMap;
pub use pool::SessionPool;
pub use reader::{Reader, ReaderOptions};
pub use resolver::{SchemaResolver, SubtypeResolver};
pub use shape::{
    Element, ScalarKind, SchemaBuilder, SchemaSet, SchemaSetId, Shape, ShapeId, ShapeKind,
};
pub use span::Span;
pub use value::{decode_value, Value};
pub use writer::Writer;
