#[cfg(feature = "desktop")]
pub mod detector;
pub mod estimator;
pub mod filter;
pub mod landmark;
pub mod normalize;
pub mod preprocess;

#[cfg(feature = "desktop")]
pub use detector::PoseDetector;
pub use estimator::PoseEstimator;
pub use filter::LandmarkFilter;
pub use landmark::{Joint, Landmark, LandmarkIndex, LandmarkSchema, PoseLandmarks};
pub use normalize::{segment, BodyPoints, MirrorMode, Normalizer};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_landmarks;
pub use preprocess::{unletterbox_pose, LetterboxInfo, LANDMARK_INPUT_SIZE};
