#![doc = "Turnout-vs-distance analysis for the Berlin 2021 federal election"]
pub mod centroid;
pub mod cli;
pub mod commands;
pub mod common;
pub mod distance;
pub mod ingest;
pub mod key;
pub mod merge;
pub mod model;
pub mod paths;
pub mod report;
pub mod weights;

#[doc(inline)]
pub use key::StationKey;

#[doc(inline)]
pub use merge::{merge, DistrictRecord, MergeDiagnostics};

#[doc(inline)]
pub use model::{analyze_measure, MeasureAnalysis};

#[doc(inline)]
pub use weights::SpatialWeights;
