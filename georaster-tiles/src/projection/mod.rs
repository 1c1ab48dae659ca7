//! Coordinate transforms between spatial reference systems.
//!
//! The sampling engine only ever needs two things from a projection library:
//! a forward transform from one system to another and its inverse. This
//! module expresses that capability through two dyn-compatible traits:
//!
//! - [`Projector`] transforms single points for a fixed `(from, to)` pair
//! - [`ProjectionProvider`] builds projectors on demand
//!
//! [`Projectors`] sits in front of a provider and memoises one projector per
//! pair for the lifetime of a layer.
//!
//! # Built-in transforms
//!
//! [`DefaultProjectionProvider`] answers identity pairs and WGS84 ↔ Web
//! Mercator in closed form. UTM zones (`EPSG:326zz`, `EPSG:327zz`) have their
//! proj strings synthesised. Everything else is delegated to `proj4rs`, with
//! definitions looked up in the caller's registry first and the bundled
//! `crs-definitions` database second.

mod native;
mod proj4;
mod srs;
mod utm;

pub use native::{
    AffineProjector, IdentityProjector, WebMercatorProjector, EARTH_RADIUS, MAX_LATITUDE,
};
pub use proj4::Proj4Projector;
pub use srs::{Srs, EPSG_WEB_MERCATOR, EPSG_WGS84};
pub use utm::utm_proj_string;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

/// A 2-D coordinate pair in whatever system the context implies.
pub type Point = (f64, f64);

/// Errors raised while resolving or applying a projection.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProjectionError {
    /// The identifier cannot be used for reprojection.
    #[error("Unsupported projection: {projection}")]
    UnsupportedProjection { projection: String },

    /// An EPSG code has no known definition.
    #[error("Missing projection definition for EPSG:{code}")]
    MissingProjectionDefinition { code: u32 },

    /// The underlying library rejected a coordinate.
    #[error("Transform from {from} to {to} failed: {reason}")]
    TransformFailed {
        from: String,
        to: String,
        reason: String,
    },
}

/// Forward and inverse point transforms for a fixed pair of systems.
pub trait Projector: Send + Sync {
    /// Transform a point from the source system into the target system.
    fn forward(&self, point: Point) -> Result<Point, ProjectionError>;

    /// Transform a point from the target system back into the source system.
    fn inverse(&self, point: Point) -> Result<Point, ProjectionError>;

    /// True when both sides are the same system and points pass through.
    fn is_identity(&self) -> bool {
        false
    }
}

/// Builds [`Projector`]s for pairs of spatial reference systems.
pub trait ProjectionProvider: Send + Sync {
    /// Resolve a projector transforming `from` into `to`.
    fn projector(&self, from: &Srs, to: &Srs) -> Result<Arc<dyn Projector>, ProjectionError>;
}

/// Projector resolution with a caller registry of extra definitions.
///
/// Registered definitions take precedence over the bundled database, so a
/// caller can override any code.
#[derive(Debug, Default, Clone)]
pub struct DefaultProjectionProvider {
    definitions: HashMap<u32, String>,
}

impl DefaultProjectionProvider {
    /// Create a provider with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proj string for an EPSG code.
    pub fn with_definition(mut self, code: u32, definition: impl Into<String>) -> Self {
        self.definitions.insert(code, definition.into());
        self
    }

    /// Register a proj string for an EPSG code in place.
    pub fn register_definition(&mut self, code: u32, definition: impl Into<String>) {
        self.definitions.insert(code, definition.into());
    }

    /// Look up the proj string for an identifier.
    ///
    /// # Errors
    ///
    /// `MissingProjectionDefinition` when no source knows the code, and
    /// `UnsupportedProjection` for the simple plane.
    pub fn definition(&self, srs: &Srs) -> Result<String, ProjectionError> {
        match srs {
            Srs::Proj4(def) => Ok(def.clone()),
            Srs::Simple => Err(ProjectionError::UnsupportedProjection {
                projection: srs.to_string(),
            }),
            Srs::Epsg(code) => {
                if let Some(def) = self.definitions.get(code) {
                    return Ok(def.clone());
                }
                if let Some(def) = utm_proj_string(*code) {
                    return Ok(def);
                }
                u16::try_from(*code)
                    .ok()
                    .and_then(crs_definitions::from_code)
                    .map(|def| def.proj4.to_string())
                    .ok_or(ProjectionError::MissingProjectionDefinition { code: *code })
            }
        }
    }
}

impl ProjectionProvider for DefaultProjectionProvider {
    fn projector(&self, from: &Srs, to: &Srs) -> Result<Arc<dyn Projector>, ProjectionError> {
        if from == to {
            return Ok(Arc::new(IdentityProjector));
        }
        if from.is_simple() || to.is_simple() {
            let projection = if from.is_simple() { to } else { from };
            return Err(ProjectionError::UnsupportedProjection {
                projection: projection.to_string(),
            });
        }

        match (from.epsg(), to.epsg()) {
            (Some(EPSG_WGS84), Some(EPSG_WEB_MERCATOR)) => {
                return Ok(Arc::new(WebMercatorProjector::from_geographic()))
            }
            (Some(EPSG_WEB_MERCATOR), Some(EPSG_WGS84)) => {
                return Ok(Arc::new(WebMercatorProjector::to_geographic()))
            }
            _ => {}
        }

        let from_def = self.definition(from)?;
        let to_def = self.definition(to)?;
        let projector = Proj4Projector::new(from, &from_def, to, &to_def)?;
        Ok(Arc::new(projector))
    }
}

/// Per-pair projector cache in front of a [`ProjectionProvider`].
///
/// Only successful resolutions are cached; a failing pair is retried on the
/// next request.
pub struct Projectors {
    provider: Arc<dyn ProjectionProvider>,
    resolved: DashMap<(Srs, Srs), Arc<dyn Projector>>,
}

impl Projectors {
    /// Wrap a provider.
    pub fn new(provider: Arc<dyn ProjectionProvider>) -> Self {
        Self {
            provider,
            resolved: DashMap::new(),
        }
    }

    /// Resolve (and memoise) the projector for `from → to`.
    pub fn get(&self, from: &Srs, to: &Srs) -> Result<Arc<dyn Projector>, ProjectionError> {
        let key = (from.clone(), to.clone());
        if let Some(projector) = self.resolved.get(&key) {
            return Ok(Arc::clone(projector.value()));
        }

        let projector = self.provider.projector(from, to)?;
        debug!(from = %from, to = %to, "Resolved projector");
        self.resolved.insert(key, Arc::clone(&projector));
        Ok(projector)
    }

    /// Transform a single point from `from` into `to`.
    pub fn forward(&self, from: &Srs, to: &Srs, point: Point) -> Result<Point, ProjectionError> {
        self.get(from, to)?.forward(point)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.resolved.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl Default for Projectors {
    fn default() -> Self {
        Self::new(Arc::new(DefaultProjectionProvider::new()))
    }
}

impl std::fmt::Debug for Projectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projectors")
            .field("resolved", &self.resolved.len())
            .finish()
    }
}
