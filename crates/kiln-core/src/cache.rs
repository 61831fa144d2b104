//! The fingerprint cache protocol.
//!
//! A module derives a fingerprint string from everything that should
//! invalidate a layer and compares it byte for byte with the one stored under
//! [`FINGERPRINT_KEY`]. On a hit the layer is left alone. On a miss the
//! old fingerprint is dropped, the layer is cleared, the install runs, and
//! only then is the new fingerprint written. An install that fails halfway
//! leaves no fingerprint behind and is a miss again next time, whatever
//! inputs that next run brings.

use crate::context::Context;
use crate::error::BuildpackError;
use kiln_store::LayerHandle;
use serde::Serialize;
use std::fmt;

/// Metadata key holding a layer's fingerprint.
pub const FINGERPRINT_KEY: &str = "version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Builder for `name:value,name:value` fingerprints.
///
/// ```
/// use kiln_core::Fingerprint;
/// let f = Fingerprint::new().field("version", "1.2.0").field("devMode", false);
/// assert_eq!(f.to_string(), "version:1.2.0,devMode:false");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    fields: Vec<(String, String)>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}:{value}")?;
        }
        Ok(())
    }
}

impl Context {
    /// Run `install` into `layer` unless its stored fingerprint already
    /// equals `fingerprint`.
    ///
    /// A layer with no stored fingerprint is always a miss, even when
    /// `fingerprint` is empty.
    pub fn cached_install<F>(
        &mut self,
        layer: &LayerHandle,
        fingerprint: &str,
        install: F,
    ) -> Result<CacheOutcome, BuildpackError>
    where
        F: FnOnce(&mut Context, &LayerHandle) -> Result<(), BuildpackError>,
    {
        let stored = self.try_metadata(layer, FINGERPRINT_KEY)?;
        if stored.as_deref() == Some(fingerprint) {
            self.cache_hit(layer.name());
            return Ok(CacheOutcome::Hit);
        }

        self.cache_miss(layer.name());
        if stored.is_some() {
            self.remove_metadata(layer, FINGERPRINT_KEY)?;
        }
        self.clear_layer(layer)?;
        install(self, layer)?;
        self.set_metadata(layer, FINGERPRINT_KEY, fingerprint)?;
        Ok(CacheOutcome::Miss)
    }
}
