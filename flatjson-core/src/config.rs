//! Codec configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CLASS_DISCRIMINATOR: &str = "type";
pub const DEFAULT_MAX_STRUCTURE_DEPTH: usize = 60;
pub const DEFAULT_MAX_INLINE_PROPERTIES: usize = 4096;
pub const DEFAULT_MAX_POOLED_SESSIONS: usize = 16;

/// Accepted range for [`Config::max_structure_depth`].
pub const STRUCTURE_DEPTH_RANGE: std::ops::RangeInclusive<usize> = 2..=200;

/// How element names are spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    /// `fooBar` -> `foo_bar`
    SnakeCase,
    /// `fooBar` -> `foo-bar`
    KebabCase,
}

impl NamingStrategy {
    pub fn apply(self, name: &str) -> String {
        let sep = match self {
            NamingStrategy::SnakeCase => '_',
            NamingStrategy::KebabCase => '-',
        };
        let mut out = String::with_capacity(name.len() + 4);
        let mut prev_lower_or_digit = false;
        for c in name.chars() {
            if c.is_uppercase() {
                if prev_lower_or_digit {
                    out.push(sep);
                }
                out.extend(c.to_lowercase());
                prev_lower_or_digit = false;
            } else if c == '_' || c == '-' {
                out.push(sep);
                prev_lower_or_digit = false;
            } else {
                out.push(c);
                prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
            }
        }
        out
    }
}

/// Where built descriptors are memoized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// One process-wide map.
    #[default]
    Shared,
    /// A map owned by a single codec.
    Exclusive,
    /// One map per thread.
    ThreadLocal,
    /// Thread-local front backed by the process-wide map.
    TwoLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ignore_unknown_keys: bool,
    /// When `false`, `null` properties are omitted on encode and absent nullable
    /// elements decode as `null`.
    pub explicit_nulls: bool,
    pub coerce_input_values: bool,
    pub decode_enums_case_insensitive: bool,
    pub use_alternative_names: bool,
    pub naming_strategy: Option<NamingStrategy>,
    pub class_discriminator: String,
    pub max_structure_depth: usize,
    /// Upper bound on deferred element slots held by one inline root.
    pub max_inline_properties: usize,
    pub allow_trailing_comma: bool,
    pub allow_comments: bool,
    pub structured_map_keys: bool,
    pub cache_mode: CacheMode,
    pub max_pooled_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ignore_unknown_keys: false,
            explicit_nulls: true,
            coerce_input_values: false,
            decode_enums_case_insensitive: false,
            use_alternative_names: true,
            naming_strategy: None,
            class_discriminator: DEFAULT_CLASS_DISCRIMINATOR.to_string(),
            max_structure_depth: DEFAULT_MAX_STRUCTURE_DEPTH,
            max_inline_properties: DEFAULT_MAX_INLINE_PROPERTIES,
            allow_trailing_comma: false,
            allow_comments: false,
            structured_map_keys: true,
            cache_mode: CacheMode::Shared,
            max_pooled_sessions: DEFAULT_MAX_POOLED_SESSIONS,
        }
    }
}

impl Config {
    /// Clamps values that are outside of their accepted ranges.
    pub fn normalized(mut self) -> Self {
        self.max_structure_depth = self
            .max_structure_depth
            .clamp(*STRUCTURE_DEPTH_RANGE.start(), *STRUCTURE_DEPTH_RANGE.end());
        self
    }

    /// The subset of options that influence descriptor construction.
    pub fn descriptor_config(&self) -> DescriptorConfig {
        DescriptorConfig {
            ignore_unknown_keys: self.ignore_unknown_keys,
            decode_enums_case_insensitive: self.decode_enums_case_insensitive,
            use_alternative_names: self.use_alternative_names,
            naming_strategy: self.naming_strategy,
            class_discriminator: self.class_discriminator.clone(),
        }
    }
}

/// Part of the descriptor cache key. Two configs that differ only in decode-time options share
/// descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorConfig {
    pub ignore_unknown_keys: bool,
    pub decode_enums_case_insensitive: bool,
    pub use_alternative_names: bool,
    pub naming_strategy: Option<NamingStrategy>,
    pub class_discriminator: String,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Config::default().descriptor_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_strategies() {
        assert_eq!(NamingStrategy::SnakeCase.apply("fooBarBaz"), "foo_bar_baz");
        assert_eq!(NamingStrategy::KebabCase.apply("fooBar"), "foo-bar");
        assert_eq!(NamingStrategy::SnakeCase.apply("item2Count"), "item2_count");
        assert_eq!(NamingStrategy::KebabCase.apply("already_snake"), "already-snake");
        assert_eq!(NamingStrategy::SnakeCase.apply("plain"), "plain");
    }

    #[test]
    fn depth_is_clamped() {
        let config = Config {
            max_structure_depth: 1000,
            ..Config::default()
        }
        .normalized();
        assert_eq!(config.max_structure_depth, 200);

        let config = Config {
            max_structure_depth: 0,
            ..Config::default()
        }
        .normalized();
        assert_eq!(config.max_structure_depth, 2);
    }
}
