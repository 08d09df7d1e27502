//! Core prominence and isolation modules

pub mod divide_tree;
pub mod tree_builder;
pub mod island_tree;
pub mod isolation;
pub mod region_filter;
pub mod pipeline;

// Re-export main types
pub use divide_tree::{DivideTree, Peak, PeakId, ParentEdge, Runoff, Saddle, SaddleId};
pub use tree_builder::DivideTreeBuilder;
pub use island_tree::{IslandNode, IslandTree};
pub use isolation::{IsolationFinder, IsolationRecord};
pub use region_filter::RegionFilter;
pub use pipeline::{MetricsTable, OutputPaths, PeakMetrics, PipelineConfig, ProminencePipeline, RegionConfig};
