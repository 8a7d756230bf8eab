pub mod features;
pub mod label;
pub mod landmark;
pub mod rules;

pub use features::{extract_features, extract_features_from_rows, FeatureVector, FEATURE_COUNT};
pub use label::{Direction, PoseLabel, UnknownLabel};
pub use landmark::{FrameError, FrameSize, Landmark, LandmarkFrame, LandmarkIndex};
pub use rules::classify as classify_rules;
