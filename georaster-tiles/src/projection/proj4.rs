//! General projections through `proj4rs`.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::{Point, ProjectionError, Projector, Srs};

/// Projector backed by a pair of parsed proj definitions.
///
/// proj4rs works in radians for geographic systems; inputs and outputs here
/// are always in the native unit of each system (degrees or metres).
pub struct Proj4Projector {
    from_name: String,
    to_name: String,
    from: Proj,
    to: Proj,
    from_is_geographic: bool,
    to_is_geographic: bool,
}

impl Proj4Projector {
    /// Parse both definitions.
    ///
    /// # Arguments
    ///
    /// * `from` / `to` - Identifiers, used for error messages
    /// * `from_def` / `to_def` - The proj strings to parse
    pub fn new(
        from: &Srs,
        from_def: &str,
        to: &Srs,
        to_def: &str,
    ) -> Result<Self, ProjectionError> {
        let parse = |srs: &Srs, def: &str| {
            Proj::from_proj_string(def).map_err(|_| ProjectionError::UnsupportedProjection {
                projection: srs.to_string(),
            })
        };
        let from_proj = parse(from, from_def)?;
        let to_proj = parse(to, to_def)?;

        Ok(Self {
            from_name: from.to_string(),
            to_name: to.to_string(),
            from_is_geographic: from_proj.is_latlong(),
            to_is_geographic: to_proj.is_latlong(),
            from: from_proj,
            to: to_proj,
        })
    }

    fn run(
        &self,
        src: &Proj,
        dst: &Proj,
        src_geo: bool,
        dst_geo: bool,
        (x, y): Point,
        forward: bool,
    ) -> Result<Point, ProjectionError> {
        let mut point = if src_geo {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(src, dst, &mut point).map_err(|e| {
            let (from, to) = if forward {
                (&self.from_name, &self.to_name)
            } else {
                (&self.to_name, &self.from_name)
            };
            ProjectionError::TransformFailed {
                from: from.clone(),
                to: to.clone(),
                reason: e.to_string(),
            }
        })?;

        if dst_geo {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

impl Projector for Proj4Projector {
    fn forward(&self, point: Point) -> Result<Point, ProjectionError> {
        self.run(
            &self.from,
            &self.to,
            self.from_is_geographic,
            self.to_is_geographic,
            point,
            true,
        )
    }

    fn inverse(&self, point: Point) -> Result<Point, ProjectionError> {
        self.run(
            &self.to,
            &self.from,
            self.to_is_geographic,
            self.from_is_geographic,
            point,
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LONGLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";
    const UTM_33N: &str = "+proj=utm +zone=33 +ellps=WGS84 +datum=WGS84 +units=m +no_defs";

    #[test]
    fn test_forward_inverse_round_trip() {
        let projector =
            Proj4Projector::new(&Srs::WGS84, LONGLAT, &Srs::Epsg(32633), UTM_33N).unwrap();

        let projected = projector.forward((14.0, 45.0)).unwrap();
        assert!(projected.0 > 400_000.0 && projected.0 < 500_000.0);

        let (lon, lat) = projector.inverse(projected).unwrap();
        assert_relative_eq!(lon, 14.0, epsilon = 1e-7);
        assert_relative_eq!(lat, 45.0, epsilon = 1e-7);
    }

    #[test]
    fn test_invalid_definition_is_unsupported() {
        let result = Proj4Projector::new(
            &Srs::Proj4("+proj=nonsense".to_string()),
            "+proj=nonsense",
            &Srs::WGS84,
            LONGLAT,
        );
        assert!(matches!(
            result,
            Err(ProjectionError::UnsupportedProjection { .. })
        ));
    }
}
