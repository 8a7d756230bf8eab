pub mod ml;
pub mod model;
pub mod smoothing;

pub use ml::{spawn_ml_worker, CycleOutcome, MlClassifier, Thresholds};
pub use model::{load_with_fallback, OnnxPoseModel, PoseModel};
pub use smoothing::SmoothingWindow;
