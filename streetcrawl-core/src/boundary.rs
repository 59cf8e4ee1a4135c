// Crawl boundary: polygon containment and centerpoint

use geo::{BoundingRect, Centroid, Coord, Intersects, LineString, MultiPolygon, Polygon};
use geojson::{GeoJson, Geometry, Value as GeometryValue};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("Failed to access boundary file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Boundary download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unsupported GeoJSON object: {0}")]
    UnsupportedGeometry(String),

    #[error("Boundary contains no polygons")]
    Empty,

    #[error("Invalid polygon ring: {0}")]
    InvalidRing(String),
}

/// Geographic extent of a crawl.
pub trait BoundaryOracle {
    /// Whether the point lies inside the boundary or on its edge. Malformed
    /// coordinates are never inside.
    fn contains(&self, lat: f64, lon: f64) -> bool;

    /// `(lat, lon)` of the point the crawl is seeded from.
    fn centerpoint(&self) -> Option<(f64, f64)>;
}

/// Polygons in `(x, y)` = `(lon, lat)` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    polygons: MultiPolygon<f64>,
}

impl Boundary {
    pub fn from_geojson_str(geojson: &str) -> Result<Self, BoundaryError> {
        let value: Value = serde_json::from_str(geojson)?;
        let mut polygons = Vec::new();
        match GeoJson::from_json_value(value)? {
            GeoJson::FeatureCollection(collection) => {
                for geometry in collection.features.into_iter().filter_map(|f| f.geometry) {
                    collect_polygons(geometry, &mut polygons)?;
                }
            }
            GeoJson::Feature(feature) => {
                if let Some(geometry) = feature.geometry {
                    collect_polygons(geometry, &mut polygons)?;
                }
            }
            GeoJson::Geometry(geometry) => collect_polygons(geometry, &mut polygons)?,
        }

        if polygons.is_empty() {
            return Err(BoundaryError::Empty);
        }
        Ok(Self {
            polygons: MultiPolygon::new(polygons),
        })
    }

    pub fn load(path: &Path) -> Result<Self, BoundaryError> {
        let content = fs::read_to_string(path).map_err(|source| BoundaryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let boundary = Self::from_geojson_str(&content)?;
        info!(
            "Loaded boundary from {} ({} polygons, {} vertices)",
            path.display(),
            boundary.polygon_count(),
            boundary.vertex_count()
        );
        Ok(boundary)
    }

    /// Loads the cached GeoJSON at `path`, downloading it from `url` first
    /// when the cache file does not exist yet.
    pub async fn load_or_fetch(path: &Path, url: Option<&str>) -> Result<Self, BoundaryError> {
        let Some(url) = url.filter(|_| !path.exists()) else {
            return Self::load(path);
        };

        info!("Downloading boundary from {}", url);
        let body = reqwest::get(url).await?.error_for_status()?.text().await?;

        // Parse before caching so a bad download never lands on disk
        let boundary = Self::from_geojson_str(&body)?;

        let io_err = |source| BoundaryError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, &body).map_err(io_err)?;
        debug!("Cached boundary at {}", path.display());

        Ok(boundary)
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.0.len()
    }

    /// Distinct vertices across all rings.
    pub fn vertex_count(&self) -> usize {
        self.polygons
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .map(|ring| ring.0.len() - 1)
            .sum()
    }

    /// `(min_lat, min_lon, max_lat, max_lon)`
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        match self.polygons.bounding_rect() {
            Some(rect) => (rect.min().y, rect.min().x, rect.max().y, rect.max().x),
            None => (0.0, 0.0, 0.0, 0.0),
        }
    }
}

impl BoundaryOracle for Boundary {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        if !streetcrawl_lookup::record::valid_coordinates(lat, lon) {
            return false;
        }
        let point = Coord { x: lon, y: lat };
        self.polygons.iter().any(|p| p.intersects(&point))
    }

    fn centerpoint(&self) -> Option<(f64, f64)> {
        self.polygons.centroid().map(|c| (c.y(), c.x()))
    }
}

fn collect_polygons(
    geometry: Geometry,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), BoundaryError> {
    match geometry.value {
        GeometryValue::Polygon(rings) => out.push(to_polygon(rings)?),
        GeometryValue::MultiPolygon(polygons) => {
            for rings in polygons {
                out.push(to_polygon(rings)?);
            }
        }
        GeometryValue::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_polygons(geometry, out)?;
            }
        }
        GeometryValue::Point(_) => return Err(unsupported("Point")),
        GeometryValue::MultiPoint(_) => return Err(unsupported("MultiPoint")),
        GeometryValue::LineString(_) => return Err(unsupported("LineString")),
        GeometryValue::MultiLineString(_) => return Err(unsupported("MultiLineString")),
    }
    Ok(())
}

fn unsupported(kind: &str) -> BoundaryError {
    BoundaryError::UnsupportedGeometry(kind.to_string())
}

/// Builds a polygon from GeoJSON rings; the first ring is the exterior.
/// Open rings are closed.
fn to_polygon(rings: Vec<Vec<geojson::Position>>) -> Result<Polygon<f64>, BoundaryError> {
    let mut rings = rings
        .into_iter()
        .map(to_ring)
        .collect::<Result<Vec<_>, _>>()?;

    if rings.is_empty() {
        return Err(BoundaryError::InvalidRing("polygon has no rings".into()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn to_ring(positions: Vec<geojson::Position>) -> Result<LineString<f64>, BoundaryError> {
    let coords = positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            _ => Err(BoundaryError::InvalidRing(format!(
                "bad position {:?}",
                position
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut ring = LineString::new(coords);
    ring.close();
    if ring.0.len() < 4 {
        return Err(BoundaryError::InvalidRing(format!(
            "ring needs at least 3 distinct positions, got {}",
            ring.0.len().saturating_sub(1)
        )));
    }
    Ok(ring)
}
