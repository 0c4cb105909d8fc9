pub mod error;
pub mod frame;
pub mod similarity;
pub mod window;
pub mod threshold;
pub mod decay;
pub mod scene_detector;
pub mod observer;
pub mod metadata;
pub mod writer;
pub mod video_processor;
pub mod processor;
pub mod config;

pub use error::{DetectError, DetectFailure};
pub use video_processor::{FrameReader, VideoProcessor};
pub use similarity::{SimilarityMethod, SimilarityScore};
pub use scene_detector::{
    detect, detect_stream, detect_with_observer, DetectorConfig, SceneChangeDetector,
    SceneChangeEvent, ScorePoint,
};
pub use observer::{DetectionObserver, FrameStep, KeyframeRenderer, LoggingObserver};
pub use metadata::{SceneChangeReport, SceneCut};
pub use writer::{JsonReportWriter, ResultWriter, TextResultWriter};
pub use processor::{ProcessConfig, ProcessOutput, process_video};
pub use config::{ConfigLoader, ConfigOverrides};
