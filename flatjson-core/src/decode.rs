//! Typed decoding on top of [`Decoder`].
//!
//! A [`Decode`] implementation is handed the shape it is expected to match and drives the
//! decoder itself. Implementations for scalars and the standard collections are provided; user
//! types implement the trait by walking their elements:
//!
//! ```
//! use flatjson_core::{Decode, DecodeResult, Decoder, ShapeId};
//!
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! impl Decode for Point {
//!     fn decode(d: &mut Decoder<'_>, shape: ShapeId) -> DecodeResult<Self> {
//!         let (mut x, mut y) = (0, 0);
//!         d.begin_structure(shape)?;
//!         while let Some(index) = d.next_element_index()? {
//!             match index {
//!                 0 => x = d.decode_i64()?,
//!                 _ => y = d.decode_i64()?,
//!             }
//!         }
//!         d.end_structure()?;
//!         Ok(Point { x, y })
//!     }
//! }
//! ```

use indexmap::IndexMap;

use crate::decoder::Decoder;
use crate::error::{DecodeError, DecodeResult};
use crate::shape::ShapeId;

pub trait Decode: Sized {
    fn decode(d: &mut Decoder<'_>, shape: ShapeId) -> DecodeResult<Self>;
}

impl Decode for bool {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        d.decode_bool()
    }
}

impl Decode for i64 {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        d.decode_i64()
    }
}

impl Decode for i32 {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        let position = d.position();
        let value = d.decode_i64()?;
        i32::try_from(value)
            .map_err(|_| DecodeError::syntax(format!("{value} does not fit in i32"), position))
    }
}

impl Decode for u64 {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        d.decode_u64()
    }
}

impl Decode for u32 {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        let position = d.position();
        let value = d.decode_u64()?;
        u32::try_from(value)
            .map_err(|_| DecodeError::syntax(format!("{value} does not fit in u32"), position))
    }
}

impl Decode for f64 {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        d.decode_f64()
    }
}

impl Decode for String {
    fn decode(d: &mut Decoder<'_>, _: ShapeId) -> DecodeResult<Self> {
        d.decode_string()
    }
}

/// `None` for `null`, including an absent element that decodes as `null`.
impl<T: Decode> Decode for Option<T> {
    fn decode(d: &mut Decoder<'_>, shape: ShapeId) -> DecodeResult<Self> {
        if d.decode_not_null_mark()? {
            T::decode(d, shape).map(Some)
        } else {
            d.decode_null().map(|_| None)
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(d: &mut Decoder<'_>, shape: ShapeId) -> DecodeResult<Self> {
        let mut items = Vec::new();
        d.begin_structure(shape)?;
        while d.next_element_index()?.is_some() {
            let item = d.current_element_shape()?;
            items.push(T::decode(d, item)?);
        }
        d.end_structure()?;
        Ok(items)
    }
}

/// Entries keep wire order. A repeated key keeps its last value.
impl<T: Decode> Decode for IndexMap<String, T> {
    fn decode(d: &mut Decoder<'_>, shape: ShapeId) -> DecodeResult<Self> {
        let mut entries = IndexMap::new();
        d.begin_structure(shape)?;
        while d.next_element_index()?.is_some() {
            let key = d.decode_string()?;
            if d.next_element_index()?.is_none() {
                break;
            }
            let value = d.current_element_shape()?;
            entries.insert(key, T::decode(d, value)?);
        }
        d.end_structure()?;
        Ok(entries)
    }
}
