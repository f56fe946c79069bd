use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// The region currently visible on the map, as its two corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Viewport {
    pub const fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }
}

/// Query rectangle in the API's axis order: longitude before latitude, min before max.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Takes the corners as given. A degenerate viewport yields a zero-area box.
    pub const fn from_viewport(viewport: &Viewport) -> Self {
        Self {
            min_lon: viewport.south_west.lon,
            min_lat: viewport.south_west.lat,
            max_lon: viewport.north_east.lon,
            max_lat: viewport.north_east.lat,
        }
    }

    pub const fn to_viewport(self) -> Viewport {
        Viewport::new(
            LatLng::new(self.min_lat, self.min_lon),
            LatLng::new(self.max_lat, self.max_lon),
        )
    }

    pub const fn world() -> Self {
        Self {
            min_lon: -180.0,
            min_lat: -85.0,
            max_lon: 180.0,
            max_lat: 85.0,
        }
    }
}

impl From<&Viewport> for BoundingBox {
    fn from(viewport: &Viewport) -> Self {
        Self::from_viewport(viewport)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BboxParseError {
    #[error("expected 4 comma-separated values, got {0}")]
    Arity(usize),
    #[error("invalid coordinate {0:?}")]
    Coordinate(String),
}

impl FromStr for BoundingBox {
    type Err = BboxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::Arity(parts.len()));
        }

        let mut values = [0.0_f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| BboxParseError::Coordinate((*part).to_string()))?;
        }

        let [min_lon, min_lat, max_lon, max_lat] = values;
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Viewport {
        Viewport::new(LatLng::new(lat1, lon1), LatLng::new(lat2, lon2))
    }

    #[test]
    fn longitude_comes_before_latitude() {
        let bbox = BoundingBox::from_viewport(&viewport(12.9, 77.5, 13.1, 77.7));
        assert_eq!(bbox.to_string(), "77.5,12.9,77.7,13.1");
    }

    #[test]
    fn degenerate_point_is_a_valid_box() {
        let bbox = BoundingBox::from_viewport(&viewport(-33.5, 151.25, -33.5, 151.25));
        assert_eq!(bbox.to_string(), "151.25,-33.5,151.25,-33.5");
        assert_eq!(bbox.min_lon, bbox.max_lon);
        assert_eq!(bbox.min_lat, bbox.max_lat);
    }

    #[test]
    fn corners_are_never_reordered() {
        // The widget owns corner ordering; a flipped view stays flipped.
        let bbox = BoundingBox::from_viewport(&viewport(10.0, 20.0, -10.0, -20.0));
        assert_eq!(bbox.to_string(), "20,10,-20,-10");
    }

    #[test]
    fn wire_form_parses_back() {
        let bbox: BoundingBox = " -0.5, 51.25 ,0.25,51.75".parse().unwrap();
        assert_eq!(bbox.to_string(), "-0.5,51.25,0.25,51.75");
        assert_eq!(BoundingBox::from_viewport(&bbox.to_viewport()), bbox);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "1,2,3".parse::<BoundingBox>(),
            Err(BboxParseError::Arity(3))
        );
        assert_eq!(
            "1,2,north,4".parse::<BoundingBox>(),
            Err(BboxParseError::Coordinate("north".to_string()))
        );
        assert!("1,2,3,NaN".parse::<BoundingBox>().is_err());
    }
}
