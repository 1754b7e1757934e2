//! # Railwatch Feed
//! Incident source over the National Rail service indicator feed, and the
//! station directory used to resolve CRS codes to names.

pub mod national_rail;
pub mod stations;

pub use national_rail::NationalRailSource;
pub use stations::{Station, StationDirectory};
