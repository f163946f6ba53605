pub mod error;
pub mod frame;
pub mod geomath;
pub mod model;
pub mod projection;
pub mod region;
pub mod report;

pub use error::GeoError;
pub use frame::{CountryBoundary, Frame, FrameTransform};
pub use model::{LatLng, Orientation, PanoNode};
pub use region::{Geofence, RegionDef, RegionFile};
pub use report::PanoMap;
