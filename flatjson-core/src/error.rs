//! Error types for descriptor construction and decoding.
//!
//! Construction problems (a schema that cannot be flattened, a cycle, a name collision) are
//! [`SchemaError`]s and are reported before any input is read. Everything that goes wrong while
//! reading input is a [`DecodeError`], which carries the byte span it was detected at and the
//! logical path of the value being decoded.

use std::fmt;

use thiserror::Error;

use crate::shape::ShapeId;
use crate::span::Span;

/// Result alias for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised while building a [`SchemaDescriptor`](crate::SchemaDescriptor) or a
/// [`SchemaSet`](crate::SchemaSet).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A shape flattens into itself, directly or through other flattened shapes.
    #[error("cyclic flattening of shape `{shape}`")]
    CyclicFlatten { shape: String },

    /// More than one map element is flattened into the same root.
    #[error("`{shape}`: only one map-like element can be flattened")]
    MultipleInlineMaps { shape: String },

    /// Two reachable elements answer to the same spelling.
    #[error("element with name `{name}` appeared twice in shape `{shape}`")]
    DuplicateName { shape: String, name: String },

    #[error("maximum nesting level of flattened elements is {max}")]
    InlineDepthExceeded { max: u32 },

    /// Only object and map shapes may be flattened.
    #[error("`{shape}.{element}`: only object and map shapes can be flattened")]
    NotFlattenable { shape: String, element: String },

    #[error("`{shape}.{element}`: polymorphic shapes can not be flattened")]
    PolymorphicFlatten { shape: String, element: String },

    /// The class discriminator name is also used by a flattened element.
    #[error("`{shape}`: discriminator `{discriminator}` conflicts with a flattened element")]
    DiscriminatorConflict { shape: String, discriminator: String },

    #[error("shape `{name}` was declared but never defined")]
    UndefinedShape { name: String },

    #[error("shape id {id} does not exist in this schema")]
    UnknownShapeId { id: usize },

    #[error("shape `{name}` is defined more than once")]
    ShapeRedefined { name: String },

    /// The absolute index space of a flattened tree is limited by the packed element encoding.
    #[error("`{shape}` has {count} reachable elements, the maximum is {max}")]
    TooManyElements { shape: String, count: usize, max: usize },
}

/// What went wrong while decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeErrorKind {
    #[error(
        "encountered an unknown key `{key}`; enable `ignore_unknown_keys` to skip unknown keys"
    )]
    UnknownKey {
        key: String,
        /// Shape whose names were searched, flattened elements included.
        shape: ShapeId,
    },

    #[error("key `{key}` encountered multiple times")]
    DuplicateKey { key: String },

    #[error("field `{field}` is required, but it was missing")]
    MissingField { field: String },

    #[error("maximum structure depth of {max} exceeded")]
    MaxDepthExceeded { max: usize },

    #[error(
        "too many flattened elements buffered in current decoding ({limit} allowed); \
         try increasing `max_inline_properties`"
    )]
    MaxBufferedElementsExceeded { limit: usize },

    #[error("class discriminator `{discriminator}` was missing and `{base}` has no default subtype")]
    MissingDiscriminator { base: String, discriminator: String },

    #[error("subtype `{tag}` is not registered in the polymorphic scope of `{base}`")]
    UnknownSubtype { base: String, tag: String },

    #[error("unknown entry `{variant}` of enum `{shape}`")]
    UnknownEnumVariant { shape: String, variant: String },

    /// Propagated from the reader as-is.
    #[error("{message}")]
    Syntax { message: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The decoder was driven out of order, e.g. `end_structure` without a structure.
    #[error("invalid decoder state: {message}")]
    InvalidState { message: String },
}

/// Errors raised while writing a [`Value`](crate::Value) against a shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("expected {expected} for shape `{shape}`, found {found}")]
    Mismatch {
        shape: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("required element `{element}` of `{shape}` is missing")]
    MissingField { shape: String, element: String },

    #[error("`{shape}` has no subtype tagged `{tag}`")]
    UnknownSubtype { shape: String, tag: String },

    /// A flattened element has no key of its own, so `null` can only be expressed by leaving it
    /// out, which reads back as absent or as an implicit `null`.
    #[error("flattened element `{element}` of `{shape}` can not be written as `null`")]
    FlattenedNull { shape: String, element: String },

    #[error("unknown entry `{variant}` of enum `{shape}`")]
    UnknownEnumVariant { shape: String, variant: String },

    #[error("{value} can not be written as a JSON number")]
    NonFiniteFloat { value: f64 },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A decoding failure with the position and logical path it was detected at.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub span: Option<Span>,
    pub path: Option<String>,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind) -> Self {
        DecodeError {
            kind,
            span: None,
            path: None,
        }
    }

    pub fn at(kind: DecodeErrorKind, span: Span) -> Self {
        DecodeError {
            kind,
            span: Some(span),
            path: None,
        }
    }

    pub fn syntax(message: impl Into<String>, position: u32) -> Self {
        Self::at(
            DecodeErrorKind::Syntax {
                message: message.into(),
            },
            Span::point(position),
        )
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::InvalidState {
            message: message.into(),
        })
    }

    /// Byte offset the error was detected at.
    pub fn position(&self) -> Option<u32> {
        self.span.map(|s| s.lo)
    }

    pub(crate) fn with_path_if_missing(mut self, path: impl FnOnce() -> String) -> Self {
        if self.path.is_none() {
            self.path = Some(path());
        }
        self
    }
}

impl From<SchemaError> for DecodeError {
    fn from(err: SchemaError) -> Self {
        DecodeError::new(DecodeErrorKind::Schema(err))
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote_prefix = false;
        if let Some(path) = &self.path {
            write!(f, "path={path}")?;
            wrote_prefix = true;
        }
        if let Some(pos) = self.position() {
            if wrote_prefix {
                f.write_str(", ")?;
            }
            write!(f, "position={pos}")?;
            wrote_prefix = true;
        }
        if wrote_prefix {
            f.write_str(": ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_and_position() {
        let mut err = DecodeError::at(
            DecodeErrorKind::UnknownKey {
                key: "z".into(),
                shape: ShapeId::new(0),
            },
            Span::new(8, 11),
        );
        err.path = Some("$.z".into());
        let rendered = err.to_string();
        assert!(rendered.starts_with("path=$.z, position=8: "), "{rendered}");
        assert!(rendered.contains("unknown key `z`"), "{rendered}");
    }

    #[test]
    fn display_without_location_is_bare_message() {
        let err = DecodeError::new(DecodeErrorKind::MaxDepthExceeded { max: 3 });
        assert_eq!(err.to_string(), "maximum structure depth of 3 exceeded");
    }
}
