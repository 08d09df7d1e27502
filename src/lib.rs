//! peakmetrics: topographic prominence and isolation for DEM tiles
//!
//! This library builds the divide tree of an elevation tile, prunes it to a
//! prominence threshold, re-derives final prominence on the pruned tree and
//! measures the isolation of every surviving summit. Results can be restricted
//! to a polygonal region, including regions crossing the antimeridian.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CoordinateSystem, Elevation, ElevationUnit, LatLng, Offsets, PeakError,
    PeakResult,
};

pub use io::{DemFormat, DemReader, Tile};

pub use crate::core::{
    DivideTree, DivideTreeBuilder, IslandTree, IsolationFinder, IsolationRecord, MetricsTable,
    PipelineConfig, ProminencePipeline, RegionConfig, RegionFilter,
};
