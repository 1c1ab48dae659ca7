//! Layer configuration.
//!
//! `LayerConfig` groups the tunables of a layer. Values can be set in code
//! through the `with_*` methods or loaded from an INI file:
//!
//! ```ini
//! [layer]
//! tile_size = 256
//! resolution = 64
//! resample = bilinear
//! wrap = true
//! flip = false
//!
//! [layer.resolutions]
//! 0 = 16
//! 8 = 64
//!
//! [cache]
//! enabled = true
//! capacity_mb = 128
//! ```
//!
//! A `[layer.resolutions]` section, when present, replaces `resolution`
//! with a per-zoom table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::raster::ResampleMethod;

/// Default tile edge in screen pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default samples across a full tile.
pub const DEFAULT_RESOLUTION: u32 = 32;

/// Default render cache capacity (256 MiB of RGBA pixels).
pub const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

const LAYER_SECTION: &str = "layer";
const RESOLUTIONS_SECTION: &str = "layer.resolutions";
const CACHE_SECTION: &str = "cache";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Samples across a full tile, fixed or chosen by zoom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSetting {
    Fixed(u32),
    /// Each zoom uses the entry with the greatest key at or below it.
    PerZoom(BTreeMap<u8, u32>),
}

impl ResolutionSetting {
    /// Resolution to render `zoom` at, if one is defined.
    pub fn resolve(&self, zoom: u8) -> Option<u32> {
        match self {
            ResolutionSetting::Fixed(r) => Some(*r),
            ResolutionSetting::PerZoom(table) => {
                table.range(..=zoom).next_back().map(|(_, r)| *r)
            }
        }
    }
}

impl Default for ResolutionSetting {
    fn default() -> Self {
        ResolutionSetting::Fixed(DEFAULT_RESOLUTION)
    }
}

/// Tunables of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    /// Tile edge in screen pixels.
    pub tile_size: u32,

    pub resolution: ResolutionSetting,

    /// Keep rendered tiles for reuse.
    pub caching: bool,

    /// Render cache capacity in bytes of pixel data.
    pub cache_capacity_bytes: u64,

    pub resample: ResampleMethod,

    /// Normalise tile columns and look for data one world away.
    pub wrap: bool,

    /// Invert the stretch. `None` inverts single-band rasters only.
    pub flip: Option<bool>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            resolution: ResolutionSetting::default(),
            caching: true,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
            resample: ResampleMethod::default(),
            wrap: true,
            flip: None,
        }
    }
}

impl LayerConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = ResolutionSetting::Fixed(resolution);
        self
    }

    pub fn with_resolutions(mut self, table: BTreeMap<u8, u32>) -> Self {
        self.resolution = ResolutionSetting::PerZoom(table);
        self
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    pub fn with_resample(mut self, resample: ResampleMethod) -> Self {
        self.resample = resample;
        self
    }

    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = Some(flip);
        self
    }

    /// Load from an INI file, starting from the defaults.
    ///
    /// # Errors
    ///
    /// `ConfigError::Read` if the file cannot be read, `Parse` for malformed
    /// INI and `InvalidValue` for values of the wrong type.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Read {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse(e.to_string()),
        })?;
        Self::from_ini(&ini)
    }

    /// Load from INI text, starting from the defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(layer) = ini.section(Some(LAYER_SECTION)) {
            if let Some(v) = parse_key(layer, LAYER_SECTION, "tile_size")? {
                config.tile_size = v;
            }
            if let Some(v) = parse_key(layer, LAYER_SECTION, "resolution")? {
                config.resolution = ResolutionSetting::Fixed(v);
            }
            if let Some(v) = parse_key(layer, LAYER_SECTION, "resample")? {
                config.resample = v;
            }
            if let Some(v) = parse_key(layer, LAYER_SECTION, "wrap")? {
                config.wrap = v;
            }
            if let Some(v) = parse_key(layer, LAYER_SECTION, "flip")? {
                config.flip = Some(v);
            }
        }

        if let Some(table) = ini.section(Some(RESOLUTIONS_SECTION)) {
            let mut resolutions = BTreeMap::new();
            for (key, _) in table.iter() {
                let zoom = parse_value(RESOLUTIONS_SECTION, key, key)?;
                if let Some(r) = parse_key(table, RESOLUTIONS_SECTION, key)? {
                    resolutions.insert(zoom, r);
                }
            }
            config.resolution = ResolutionSetting::PerZoom(resolutions);
        }

        if let Some(cache) = ini.section(Some(CACHE_SECTION)) {
            if let Some(v) = parse_key(cache, CACHE_SECTION, "enabled")? {
                config.caching = v;
            }
            if let Some(mb) = parse_key::<u64>(cache, CACHE_SECTION, "capacity_mb")? {
                let bytes = mb.checked_mul(1024 * 1024).ok_or_else(|| ConfigError::InvalidValue {
                    section: CACHE_SECTION.to_string(),
                    key: "capacity_mb".to_string(),
                    value: mb.to_string(),
                })?;
                config.cache_capacity_bytes = bytes;
            }
        }

        Ok(config)
    }
}

fn parse_key<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    props
        .get(key)
        .map(|value| parse_value(section, key, value))
        .transpose()
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}
