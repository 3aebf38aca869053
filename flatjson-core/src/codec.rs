use std::sync::Arc;

use tracing::*;

use crate::cache::{cache_for, DescriptorCache};
use crate::config::{Config, DescriptorConfig};
use crate::decode::Decode;
use crate::decoder::Decoder;
use crate::descriptor::SchemaDescriptor;
use crate::encoder::Encoder;
use crate::error::{DecodeResult, EncodeError, SchemaError};
use crate::pool::SessionPool;
use crate::resolver::{SchemaResolver, SubtypeResolver};
use crate::shape::{SchemaSet, ShapeId, ShapeKind};
use crate::value::{decode_value, Value};

#[derive(Debug)]
pub(crate) struct CodecState {
    pub schema: Arc<SchemaSet>,
    pub config: Config,
    pub descriptor_config: DescriptorConfig,
    pub cache: Arc<dyn DescriptorCache>,
    pub resolver: Arc<dyn SubtypeResolver>,
    pub pool: SessionPool,
}

/// A schema set bound to a configuration. Cloning is cheap and clones share their descriptor
/// cache and session pool.
#[derive(Debug, Clone)]
pub struct Codec {
    state: Arc<CodecState>,
}

impl Codec {
    pub fn new(schema: Arc<SchemaSet>) -> Self {
        Self::builder(schema).build()
    }

    pub fn builder(schema: Arc<SchemaSet>) -> CodecBuilder {
        CodecBuilder {
            schema,
            config: Config::default(),
            cache: None,
            resolver: None,
        }
    }

    pub fn schema(&self) -> &SchemaSet {
        &self.state.schema
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn shape_id(&self, name: &str) -> Option<ShapeId> {
        self.state.schema.shape_id(name)
    }

    pub fn descriptor(&self, shape: ShapeId) -> Result<Arc<SchemaDescriptor>, SchemaError> {
        self.state
            .cache
            .get_or_build(&self.state.schema, shape, &self.state.descriptor_config)
    }

    /// Builds the descriptor of every object and polymorphic shape, surfacing schema errors
    /// before any input is read.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (id, shape) in self.state.schema.shapes() {
            if matches!(
                shape.kind,
                ShapeKind::Object { .. } | ShapeKind::Polymorphic { .. }
            ) {
                self.descriptor(id)?;
            }
        }
        Ok(())
    }

    pub fn decode<T: Decode>(&self, shape: ShapeId, input: &str) -> DecodeResult<T> {
        self.decode_slice(shape, input.as_bytes())
    }

    pub fn decode_slice<T: Decode>(&self, shape: ShapeId, input: &[u8]) -> DecodeResult<T> {
        self.decode_with(input, |d| T::decode(d, shape))
    }

    pub fn decode_value(&self, shape: ShapeId, input: &str) -> DecodeResult<Value> {
        self.decode_with(input.as_bytes(), |d| decode_value(d, shape, false))
    }

    /// Runs `decode` against a fresh decoder and checks that the whole input was consumed.
    pub fn decode_with<R>(
        &self,
        input: &[u8],
        decode: impl FnOnce(&mut Decoder<'_>) -> DecodeResult<R>,
    ) -> DecodeResult<R> {
        let mut decoder = Decoder::new(&self.state, input)?;
        let value = decode(&mut decoder)?;
        decoder.finish()?;
        Ok(value)
    }

    pub fn encode_value(&self, shape: ShapeId, value: &Value) -> Result<String, EncodeError> {
        let mut encoder = Encoder::new(&self.state);
        encoder.encode(shape, value, false)?;
        Ok(encoder.finish())
    }

    /// Decode sessions kept for reuse.
    pub fn idle_sessions(&self) -> usize {
        self.state.pool.idle()
    }
}

pub struct CodecBuilder {
    schema: Arc<SchemaSet>,
    config: Config,
    cache: Option<Arc<dyn DescriptorCache>>,
    resolver: Option<Arc<dyn SubtypeResolver>>,
}

impl CodecBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Uses `cache` instead of the one selected by [`Config::cache_mode`].
    pub fn cache(mut self, cache: Arc<dyn DescriptorCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn SubtypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Codec {
        let config = self.config.normalized();
        let cache = self.cache.unwrap_or_else(|| cache_for(config.cache_mode));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SchemaResolver::new()));
        let pool = SessionPool::new(
            config.max_pooled_sessions,
            config.max_structure_depth,
            config.max_inline_properties,
        );
        debug!(
            shapes = self.schema.len(),
            cache_mode = ?config.cache_mode,
            "codec created"
        );
        Codec {
            state: Arc::new(CodecState {
                schema: self.schema,
                descriptor_config: config.descriptor_config(),
                config,
                cache,
                resolver,
                pool,
            }),
        }
    }
}
