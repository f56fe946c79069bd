pub mod bbox;

pub use bbox::{BboxParseError, BoundingBox, LatLng, Viewport};
