//! Several rasters read as one.

use std::sync::Arc;

use futures::future::try_join_all;

use super::{
    BoxFuture, Photometric, RasterDescriptor, RasterSource, SampledBands, SourceError,
    SourceType, WindowRequest,
};

/// Combines rasters sharing one geometry into a single source whose bands
/// are the concatenation of every member's bands.
///
/// All members must agree on pixel size, projection and extent. A read fans
/// out to every member concurrently and yields one [`SampledBands`].
pub struct RasterStack {
    sources: Vec<Arc<dyn RasterSource>>,
    descriptor: RasterDescriptor,
}

impl RasterStack {
    /// Combine `sources`.
    ///
    /// # Errors
    ///
    /// `InvalidDescriptor` for an empty list and `GeometryMismatch` naming
    /// the first member that disagrees with the first raster.
    pub fn new(sources: Vec<Arc<dyn RasterSource>>) -> Result<Self, SourceError> {
        let first = sources
            .first()
            .ok_or_else(|| SourceError::InvalidDescriptor("no rasters supplied".to_string()))?
            .descriptor()
            .clone();

        for (index, source) in sources.iter().enumerate().skip(1) {
            let d = source.descriptor();
            let reason = if d.pixel_width != first.pixel_width
                || d.pixel_height != first.pixel_height
            {
                Some(format!(
                    "pixel size {}x{} differs from {}x{}",
                    d.pixel_width, d.pixel_height, first.pixel_width, first.pixel_height
                ))
            } else if d.projection != first.projection {
                Some(format!(
                    "projection {} differs from {}",
                    d.projection, first.projection
                ))
            } else if d.extent() != first.extent() {
                Some(format!("extent {} differs from {}", d.extent(), first.extent()))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(SourceError::GeometryMismatch { index, reason });
            }
        }

        let descriptor = Self::combine(&first, &sources);
        Ok(Self {
            sources,
            descriptor,
        })
    }

    fn combine(first: &RasterDescriptor, sources: &[Arc<dyn RasterSource>]) -> RasterDescriptor {
        let single = sources.len() == 1;
        let band_count = sources.iter().map(|s| s.descriptor().band_count).sum();
        let stats = sources
            .iter()
            .map(|s| s.descriptor().stats.clone())
            .collect::<Option<Vec<_>>>()
            .map(|per_source| per_source.into_iter().flatten().collect());
        let streamed = sources
            .iter()
            .any(|s| s.descriptor().source_type == SourceType::Streamed);

        RasterDescriptor {
            band_count,
            stats,
            palette: if single { first.palette.clone() } else { None },
            photometric: if single {
                first.photometric
            } else {
                Photometric::MinIsBlack
            },
            source_type: if streamed {
                SourceType::Streamed
            } else {
                SourceType::InMemory
            },
            ..first.clone()
        }
    }

    /// Number of member rasters.
    pub fn raster_count(&self) -> usize {
        self.sources.len()
    }

    /// Member rasters, in band order.
    pub fn sources(&self) -> &[Arc<dyn RasterSource>] {
        &self.sources
    }
}

impl RasterSource for RasterStack {
    fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    fn read<'a>(
        &'a self,
        request: &'a WindowRequest,
    ) -> BoxFuture<'a, Result<SampledBands, SourceError>> {
        Box::pin(async move {
            if let [only] = self.sources.as_slice() {
                return only.read(request).await;
            }

            let parts = try_join_all(self.sources.iter().map(|s| s.read(request))).await?;
            let bands = parts.into_iter().flat_map(|p| p.bands).collect();
            SampledBands::new(request.samples_across, request.samples_down, bands)
        })
    }
}
