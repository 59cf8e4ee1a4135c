use crate::error::{LookupError, Result};
use serde::{Deserialize, Serialize};

/// A panorama adjacent to another one, with enough position data to run a
/// boundary test before it is ever fetched itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacentPanorama {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Heading towards the target in degrees, only reported for links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
}

/// A validated panorama as returned by a [`crate::PanoramaLookup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaRecord {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub neighbors: Vec<AdjacentPanorama>,
    pub links: Vec<AdjacentPanorama>,
}

impl PanoramaRecord {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            date: None,
            neighbors: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_neighbor(mut self, id: impl Into<String>, lat: f64, lon: f64) -> Self {
        self.neighbors.push(AdjacentPanorama {
            id: id.into(),
            lat,
            lon,
            direction: None,
        });
        self
    }

    pub fn with_link(
        mut self,
        id: impl Into<String>,
        lat: f64,
        lon: f64,
        direction: Option<f64>,
    ) -> Self {
        self.links.push(AdjacentPanorama {
            id: id.into(),
            lat,
            lon,
            direction,
        });
        self
    }
}

/// Wire shape of a panorama before validation. Every field is optional so a
/// partial payload deserializes and is rejected by [`RawPanorama::validate`]
/// with a useful message instead of a serde error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPanorama {
    pub id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub date: Option<String>,
    #[serde(default)]
    pub neighbors: Vec<RawAdjacent>,
    #[serde(default)]
    pub links: Vec<RawAdjacent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAdjacent {
    pub id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub direction: Option<f64>,
}

pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

fn required_id(id: Option<String>, what: &str) -> Result<String> {
    match id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(LookupError::MalformedRecord(format!("{} has no id", what))),
    }
}

impl RawAdjacent {
    fn validate(self, owner: &str, relation: &str) -> Result<AdjacentPanorama> {
        let id = required_id(self.id, &format!("{} of {}", relation, owner))?;
        // Out-of-range positions are kept: the boundary test rejects them.
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(LookupError::MalformedRecord(format!(
                "{} {} of {} has no coordinates",
                relation, id, owner
            )));
        };
        Ok(AdjacentPanorama {
            id,
            lat,
            lon,
            direction: self.direction,
        })
    }
}

impl RawPanorama {
    pub fn validate(self) -> Result<PanoramaRecord> {
        let id = required_id(self.id, "panorama")?;
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(LookupError::MalformedRecord(format!(
                "panorama {} has no coordinates",
                id
            )));
        };
        if !valid_coordinates(lat, lon) {
            return Err(LookupError::MalformedRecord(format!(
                "panorama {} has invalid coordinates ({}, {})",
                id, lat, lon
            )));
        }

        let neighbors = self
            .neighbors
            .into_iter()
            .map(|n| n.validate(&id, "neighbor"))
            .collect::<Result<Vec<_>>>()?;
        let links = self
            .links
            .into_iter()
            .map(|l| l.validate(&id, "link"))
            .collect::<Result<Vec<_>>>()?;

        Ok(PanoramaRecord {
            id,
            lat,
            lon,
            date: self.date,
            neighbors,
            links,
        })
    }
}
