//! Surrogate key generation.
//!
//! Every persisted entity gets a random (version 4) UUID as its key when it
//! is first saved. The key is stored as text; the active [`IdStrategy`]
//! decides the textual encoding and therefore the minimum length of a key
//! column.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Declared length of every key column in the vera schema.
pub const KEY_COLUMN_LENGTH: usize = 23;

/// Length of a UUID in URL-safe base64 without padding.
pub const COMPACT_KEY_LENGTH: usize = 22;

/// Length of a UUID in its canonical hyphenated form.
pub const HYPHENATED_KEY_LENGTH: usize = 36;

/// Produces surrogate keys for new entities.
///
/// Implementations hold no mutable state, so one instance is shared by all
/// data contexts of a registry.
pub trait IdStrategy: Send + Sync + fmt::Debug {
    /// Stable name recorded in table metadata.
    fn name(&self) -> &'static str;

    /// UUID version of the generated values.
    fn generated_version(&self) -> usize;

    /// Exact length of every key this strategy produces.
    fn encoded_len(&self) -> usize;

    fn generate(&self) -> String;

    /// Recover the UUID from a key this strategy produced.
    fn decode(&self, key: &str) -> Option<Uuid>;
}

/// 16 random bytes in URL-safe base64, 22 characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactUuidStrategy;

impl IdStrategy for CompactUuidStrategy {
    fn name(&self) -> &'static str {
        "uuid4-compact"
    }

    fn generated_version(&self) -> usize {
        4
    }

    fn encoded_len(&self) -> usize {
        COMPACT_KEY_LENGTH
    }

    fn generate(&self) -> String {
        URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
    }

    fn decode(&self, key: &str) -> Option<Uuid> {
        if key.len() != COMPACT_KEY_LENGTH {
            return None;
        }
        let bytes = URL_SAFE_NO_PAD.decode(key).ok()?;
        Uuid::from_slice(&bytes).ok()
    }
}

/// Canonical `8-4-4-4-12` form, 36 characters. Only fits key columns
/// declared with at least that length.
#[derive(Debug, Default, Clone, Copy)]
pub struct HyphenatedUuidStrategy;

impl IdStrategy for HyphenatedUuidStrategy {
    fn name(&self) -> &'static str {
        "uuid4-hyphenated"
    }

    fn generated_version(&self) -> usize {
        4
    }

    fn encoded_len(&self) -> usize {
        HYPHENATED_KEY_LENGTH
    }

    fn generate(&self) -> String {
        Uuid::new_v4().hyphenated().to_string()
    }

    fn decode(&self, key: &str) -> Option<Uuid> {
        if key.len() != HYPHENATED_KEY_LENGTH {
            return None;
        }
        Uuid::parse_str(key).ok()
    }
}

pub fn default_strategy() -> Arc<dyn IdStrategy> {
    Arc::new(CompactUuidStrategy)
}

/// Look up a built-in strategy by the name stored in table metadata.
pub fn strategy_by_name(name: &str) -> Option<Arc<dyn IdStrategy>> {
    match name {
        "uuid4-compact" => Some(Arc::new(CompactUuidStrategy)),
        "uuid4-hyphenated" => Some(Arc::new(HyphenatedUuidStrategy)),
        _ => None,
    }
}

/// The generation scheme a stored key was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    Compact { version: usize },
    Hyphenated { version: usize },
}

impl KeyScheme {
    pub fn version(&self) -> usize {
        match self {
            Self::Compact { version } | Self::Hyphenated { version } => *version,
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact { version } => write!(f, "compact uuid v{}", version),
            Self::Hyphenated { version } => write!(f, "hyphenated uuid v{}", version),
        }
    }
}

/// Classify a stored key by shape. `None` for keys no built-in scheme
/// could have produced.
pub fn detect_scheme(key: &str) -> Option<KeyScheme> {
    if let Some(uuid) = CompactUuidStrategy.decode(key) {
        return Some(KeyScheme::Compact { version: uuid.get_version_num() });
    }
    HyphenatedUuidStrategy
        .decode(key)
        .map(|uuid| KeyScheme::Hyphenated { version: uuid.get_version_num() })
}
