use std::path::Path;

use anyhow::Context;
use confique::Config as DeriveConfig;
use flatjson_core::{CacheMode, NamingStrategy};

pub const DEFAULT_CONFIG_FILE: &str = "flatjson.toml";

/// Settings read from `flatjson.toml` and `FLATJSON_*` environment variables. Environment
/// variables win over the file.
#[derive(Debug, DeriveConfig)]
pub struct Config {
    /// Shape the input document is decoded as, when `--root` is not given.
    #[config(env = "FLATJSON_ROOT")]
    pub root: Option<String>,

    /// Skip keys that no element answers to instead of failing.
    #[config(env = "FLATJSON_IGNORE_UNKNOWN_KEYS", default = false)]
    pub ignore_unknown_keys: bool,

    /// When disabled, absent nullable elements decode as `null` and `null` elements are left
    /// out when re-encoding.
    #[config(default = true)]
    pub explicit_nulls: bool,

    /// Treat `null` for a non-nullable optional element, and unknown enum entries, as absent.
    #[config(default = false)]
    pub coerce_input_values: bool,

    #[config(default = false)]
    pub decode_enums_case_insensitive: bool,

    /// Honour `#[alias("...")]` names.
    #[config(default = true)]
    pub use_alternative_names: bool,

    /// `snake-case` or `kebab-case`; element names are used as written when unset.
    pub naming_strategy: Option<NamingStrategy>,

    /// Key holding the subtype tag of sealed shapes that do not name their own.
    #[config(default = "type")]
    pub class_discriminator: String,

    /// Clamped to `2..=200`.
    #[config(default = 60)]
    pub max_structure_depth: usize,

    /// How many flattened elements may be buffered while decoding one object.
    #[config(default = 4096)]
    pub max_inline_properties: usize,

    #[config(default = false)]
    pub allow_trailing_comma: bool,

    /// Accept `//` and `/* */` comments in the input document.
    #[config(default = false)]
    pub allow_comments: bool,

    /// Allow struct, list and map keys in maps, written as JSON text inside the key string.
    #[config(default = true)]
    pub structured_map_keys: bool,

    /// `shared`, `exclusive`, `thread-local` or `two-level`.
    #[config(default = "shared")]
    pub cache_mode: CacheMode,
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Config::builder()
            .env()
            .file(path)
            .load()
            .with_context(|| format!("failed to load configuration from `{}`", path.display()))
    }

    pub fn codec_config(&self) -> flatjson_core::Config {
        flatjson_core::Config {
            ignore_unknown_keys: self.ignore_unknown_keys,
            explicit_nulls: self.explicit_nulls,
            coerce_input_values: self.coerce_input_values,
            decode_enums_case_insensitive: self.decode_enums_case_insensitive,
            use_alternative_names: self.use_alternative_names,
            naming_strategy: self.naming_strategy,
            class_discriminator: self.class_discriminator.clone(),
            max_structure_depth: self.max_structure_depth,
            max_inline_properties: self.max_inline_properties,
            allow_trailing_comma: self.allow_trailing_comma,
            allow_comments: self.allow_comments,
            structured_map_keys: self.structured_map_keys,
            cache_mode: self.cache_mode,
            ..flatjson_core::Config::default()
        }
    }
}
