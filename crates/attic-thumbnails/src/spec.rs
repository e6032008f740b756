//! Thumbnail specs
//!
//! Static configuration, never persisted.

use attic_core::config::ThumbnailSpecConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ThumbnailError, ThumbnailResult};

/// A named target size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    pub name: String,
    /// 0 means "derive from the aspect ratio"
    pub width: u32,
    /// 0 means "derive from the aspect ratio"
    pub height: u32,
    pub crop_to_square: bool,
}

impl ThumbnailSpec {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            crop_to_square: false,
        }
    }

    /// Centered square crop scaled to `side`
    pub fn square(name: impl Into<String>, side: u32) -> Self {
        Self {
            name: name.into(),
            width: side,
            height: side,
            crop_to_square: true,
        }
    }

    pub fn validate(&self) -> ThumbnailResult<()> {
        if self.name.is_empty() {
            return Err(ThumbnailError::InvalidSpec("name is empty".into()));
        }
        if self.width == 0 && self.height == 0 {
            return Err(ThumbnailError::InvalidSpec(format!(
                "{}: width and height are both 0",
                self.name
            )));
        }
        if self.crop_to_square && self.width != self.height {
            return Err(ThumbnailError::InvalidSpec(format!(
                "{}: square crop needs equal width and height",
                self.name
            )));
        }
        Ok(())
    }
}

impl From<&ThumbnailSpecConfig> for ThumbnailSpec {
    fn from(config: &ThumbnailSpecConfig) -> Self {
        Self {
            name: config.name.clone(),
            width: config.width,
            height: config.height,
            crop_to_square: config.crop_to_square,
        }
    }
}

/// Registry of configured specs, looked up by name
#[derive(Debug, Clone, Default)]
pub struct ThumbnailSpecs {
    specs: Vec<ThumbnailSpec>,
}

impl ThumbnailSpecs {
    /// Validate and register specs; names must be unique
    pub fn new(specs: Vec<ThumbnailSpec>) -> ThumbnailResult<Self> {
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(ThumbnailError::InvalidSpec(format!(
                    "{}: defined twice",
                    spec.name
                )));
            }
        }
        Ok(Self { specs })
    }

    pub fn from_config(configs: &[ThumbnailSpecConfig]) -> ThumbnailResult<Self> {
        Self::new(configs.iter().map(ThumbnailSpec::from).collect())
    }

    pub fn find(&self, name: &str) -> Option<&ThumbnailSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThumbnailSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
