use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decay::{DecayController, DecayState};
use crate::error::{DetectError, DetectFailure, Result};
use crate::frame::Frame;
use crate::observer::{DetectionObserver, FrameStep};
use crate::similarity::{SimilarityMethod, SimilarityScore};
use crate::threshold::{ThresholdModel, ThresholdState};
use crate::window::SlidingWindow;

/// 场景检测参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// 滑动窗口长度
    pub window_size: usize,
    /// 帧差异度量方法
    pub method: SimilarityMethod,
    /// 阈值中均值的系数
    pub a: f64,
    /// 阈值中标准差的系数
    pub b: f64,
    /// 衰减强度
    pub c: f64,
    /// 阈值下限
    pub s: f64,
    /// 衰减持续帧数
    pub k: usize,
    /// 窗口中至少有多少个分数才开始判断
    pub warmup: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            method: SimilarityMethod::Sad,
            a: -1.0,
            b: 2.0,
            c: 2.0,
            s: 0.02,
            k: 20,
            warmup: 3,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(DetectError::InvalidConfiguration(
                "window_size 必须大于 0".to_string(),
            ));
        }
        if self.warmup == 0 {
            return Err(DetectError::InvalidConfiguration(
                "warmup 必须大于 0".to_string(),
            ));
        }
        for (name, value) in [("a", self.a), ("b", self.b), ("c", self.c), ("s", self.s)] {
            if !value.is_finite() {
                return Err(DetectError::InvalidConfiguration(format!(
                    "系数 {} 必须是有限数值，实际为 {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// 一次确认的场景切换
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneChangeEvent {
    pub prev_frame_index: usize,
    pub curr_frame_index: usize,
    pub score: f64,
    pub threshold_at_detection: f64,
}

/// 分数/阈值历史中的一个点，窗口未预热时没有阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScorePoint {
    pub frame_index: usize,
    pub score: f64,
    pub threshold: Option<f64>,
}

/// 场景检测器，逐帧比较并用动态阈值判断镜头切换
pub struct SceneChangeDetector {
    config: DetectorConfig,
    window: SlidingWindow,
    model: ThresholdModel,
    decay: DecayController,
    previous: Option<Frame>,
    frames_seen: usize,
    events: Vec<SceneChangeEvent>,
    history: Vec<ScorePoint>,
}

impl SceneChangeDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;

        debug!(
            "🔧 [场景检测] window_size={}, method={}, a={}, b={}, c={}, s={}, k={}, warmup={}",
            config.window_size,
            config.method,
            config.a,
            config.b,
            config.c,
            config.s,
            config.k,
            config.warmup
        );

        Ok(Self {
            window: SlidingWindow::new(config.window_size, config.warmup),
            model: ThresholdModel::new(config.a, config.b, config.c, config.s),
            decay: DecayController::new(config.k),
            previous: None,
            frames_seen: 0,
            events: Vec::new(),
            history: Vec::new(),
            config,
        })
    }

    /// 处理一帧，返回该帧上确认的切换（如果有）
    pub fn process_frame(&mut self, image: DynamicImage) -> Result<Option<SceneChangeEvent>> {
        self.process_frame_observed(image, &mut ())
    }

    /// 处理一帧，并把这一步的中间结果交给观察者
    pub fn process_frame_observed(
        &mut self,
        image: DynamicImage,
        observer: &mut dyn DetectionObserver,
    ) -> Result<Option<SceneChangeEvent>> {
        let frame = Frame::new(self.frames_seen, image);
        self.frames_seen += 1;

        // 第一帧没有可比较的对象
        let previous = match self.previous.take() {
            Some(previous) => previous,
            None => {
                observer.on_step(&FrameStep {
                    frame: &frame,
                    previous: None,
                    score: None,
                    threshold: None,
                    event: None,
                    decay: self.decay.state(),
                    history: &self.history,
                });
                self.previous = Some(frame);
                return Ok(None);
            }
        };

        let score = match SimilarityScore::compute(&previous, &frame, self.config.method) {
            Ok(score) => score,
            Err(e) => {
                self.previous = Some(previous);
                return Err(e);
            }
        };

        // 窗口只包含之前的分数，不含当前帧
        let threshold = if self.window.is_warm() {
            Some(
                self.model
                    .evaluate(self.window.mean(), self.window.std(), &self.decay),
            )
        } else {
            None
        };

        let event = match threshold {
            Some(t) if score.value > t.effective_threshold => {
                let event = SceneChangeEvent {
                    prev_frame_index: previous.index(),
                    curr_frame_index: frame.index(),
                    score: score.value,
                    threshold_at_detection: t.effective_threshold,
                };
                info!(
                    "🎬 [场景检测] 检测到场景切换: 帧 {} -> {} (差异 {:.4} > 阈值 {:.4})",
                    event.prev_frame_index, event.curr_frame_index, event.score, t.effective_threshold
                );
                self.decay.arm(frame.index());
                self.events.push(event);
                Some(event)
            }
            _ => {
                if self.decay.is_active() {
                    self.decay.step();
                }
                None
            }
        };

        self.window.push(score.value);
        self.history.push(ScorePoint {
            frame_index: frame.index(),
            score: score.value,
            threshold: threshold.map(|t| t.effective_threshold),
        });

        observer.on_step(&FrameStep {
            frame: &frame,
            previous: Some(&previous),
            score: Some(score),
            threshold,
            event: event.as_ref(),
            decay: self.decay.state(),
            history: &self.history,
        });

        self.previous = Some(frame);
        Ok(event)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn events(&self) -> &[SceneChangeEvent] {
        &self.events
    }

    pub fn history(&self) -> &[ScorePoint] {
        &self.history
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn decay_state(&self) -> DecayState {
        self.decay.state()
    }

    /// 下一帧将要使用的阈值，窗口未预热时为 None
    pub fn current_threshold(&self) -> Option<ThresholdState> {
        self.window
            .is_warm()
            .then(|| self.model.evaluate(self.window.mean(), self.window.std(), &self.decay))
    }

    pub fn into_events(self) -> Vec<SceneChangeEvent> {
        self.events
    }
}

/// 检测一组帧中的场景切换
pub fn detect<I>(frames: I, config: &DetectorConfig) -> std::result::Result<Vec<SceneChangeEvent>, DetectFailure>
where
    I: IntoIterator<Item = DynamicImage>,
{
    detect_with_observer(frames, config, &mut ())
}

pub fn detect_with_observer<I>(
    frames: I,
    config: &DetectorConfig,
    observer: &mut dyn DetectionObserver,
) -> std::result::Result<Vec<SceneChangeEvent>, DetectFailure>
where
    I: IntoIterator<Item = DynamicImage>,
{
    detect_stream(frames.into_iter().map(Ok), config, observer)
}

/// 从可能出错的帧源中检测场景切换
///
/// 出错时立即停止，已经确认的切换随错误一起返回。
pub fn detect_stream<I>(
    frames: I,
    config: &DetectorConfig,
    observer: &mut dyn DetectionObserver,
) -> std::result::Result<Vec<SceneChangeEvent>, DetectFailure>
where
    I: IntoIterator<Item = Result<DynamicImage>>,
{
    let mut detector =
        SceneChangeDetector::new(config.clone()).map_err(DetectFailure::without_events)?;

    for item in frames {
        let step = item.and_then(|image| detector.process_frame_observed(image, observer));
        if let Err(e) = step {
            return Err(DetectFailure::new(e, detector.into_events()));
        }
    }

    if detector.frames_seen() == 0 {
        warn!("⚠️  [场景检测] 视频源没有任何帧，返回空结果");
    }

    Ok(detector.into_events())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn flat(value: u8) -> DynamicImage {
        sized(32, 32, value)
    }

    fn sized(w: u32, h: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(w, h, |_, _| Luma([value])))
    }

    fn noisy(rng: &mut StdRng, base: i32) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(32, 32, |_, _| {
            Luma([(base + rng.gen_range(-3..=3)).clamp(0, 255) as u8])
        }))
    }

    fn cut_sequence() -> Vec<DynamicImage> {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut frames: Vec<DynamicImage> = (0..10).map(|_| noisy(&mut rng, 100)).collect();
        frames.extend((0..10).map(|_| flat(200)));
        frames
    }

    #[test]
    fn test_identical_frames_have_no_cuts() {
        let frames = (0..30).map(|_| flat(120));
        let events = detect(frames, &DetectorConfig::default()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_single_cut_after_noise() {
        let events = detect(cut_sequence(), &DetectorConfig::default()).unwrap();

        assert_eq!(events.len(), 1, "events: {:?}", events);
        assert_eq!(events[0].prev_frame_index, 9);
        assert_eq!(events[0].curr_frame_index, 10);
        assert!(events[0].score > events[0].threshold_at_detection);
    }

    /// 高斯噪声（Box-Muller）
    fn gaussian(rng: &mut StdRng, sigma: f64) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn noisy_rgb(rng: &mut StdRng, base: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 64, |_, _| {
            let mut px = [0u8; 3];
            for (c, v) in base.iter().enumerate() {
                px[c] = (*v as f64 + gaussian(rng, 2.0)).round().clamp(0.0, 255.0) as u8;
            }
            Rgb(px)
        }))
    }

    #[test]
    fn test_single_cut_in_noisy_color_video() {
        let mut rng = StdRng::seed_from_u64(77);
        let mut frames: Vec<DynamicImage> =
            (0..10).map(|_| noisy_rgb(&mut rng, [100, 120, 140])).collect();
        frames.extend((0..30).map(|_| noisy_rgb(&mut rng, [200, 60, 30])));

        for method in [SimilarityMethod::Sad, SimilarityMethod::Ssd, SimilarityMethod::Mad] {
            let config = DetectorConfig {
                method,
                ..DetectorConfig::default()
            };
            let events = detect(frames.clone(), &config).unwrap();

            assert_eq!(events.len(), 1, "{}: {:?}", method, events);
            assert_eq!(events[0].prev_frame_index, 9);
            assert_eq!(events[0].curr_frame_index, 10);
        }
    }

    #[test]
    fn test_no_cut_before_window_is_warm() {
        let config = DetectorConfig {
            window_size: 5,
            ..DetectorConfig::default()
        };
        let frames: Vec<DynamicImage> = (0..8)
            .map(|i| if i % 2 == 0 { flat(0) } else { flat(255) })
            .collect();

        let first_four = detect(frames[..4].to_vec(), &config).unwrap();
        assert!(first_four.is_empty());

        let all = detect(frames, &config).unwrap();
        assert!(all.iter().all(|e| e.curr_frame_index >= 4));
    }

    #[test]
    fn test_empty_source() {
        let events = detect(Vec::new(), &DetectorConfig::default()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_shape_mismatch_keeps_earlier_events() {
        let config = DetectorConfig {
            warmup: 1,
            ..DetectorConfig::default()
        };
        let frames = vec![flat(100), flat(100), flat(200), sized(16, 16, 200), flat(200)];

        let failure = detect(frames, &config).unwrap_err();
        match failure.error {
            DetectError::ShapeMismatch { frame_index, expected, found } => {
                assert_eq!(frame_index, 3);
                assert_eq!(expected, (32, 32, 1));
                assert_eq!(found, (16, 16, 1));
            }
            ref other => panic!("期望 ShapeMismatch，实际 {:?}", other),
        }
        assert_eq!(failure.events.len(), 1);
        assert_eq!(failure.events[0].curr_frame_index, 2);
    }

    #[test]
    fn test_source_error_stops_run() {
        let frames = vec![
            Ok(flat(0)),
            Err(DetectError::Decode("损坏的数据包".to_string())),
            Ok(flat(0)),
        ];
        let failure = detect_stream(frames, &DetectorConfig::default(), &mut ()).unwrap_err();
        assert!(matches!(failure.error, DetectError::Decode(_)));
        assert!(failure.events.is_empty());
    }

    #[test]
    fn test_invalid_config_fails_before_frames() {
        let config = DetectorConfig {
            window_size: 0,
            ..DetectorConfig::default()
        };
        let failure = detect(vec![flat(0), flat(255)], &config).unwrap_err();
        assert!(matches!(failure.error, DetectError::InvalidConfiguration(_)));

        let config = DetectorConfig {
            s: f64::NAN,
            ..DetectorConfig::default()
        };
        assert!(SceneChangeDetector::new(config).is_err());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let config = DetectorConfig {
            method: SimilarityMethod::Corr,
            ..DetectorConfig::default()
        };
        let first = detect(cut_sequence(), &config).unwrap();
        let second = detect(cut_sequence(), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decay_suppresses_duplicates_after_cut() {
        // window_size = 1 时阈值退化为下限 s，便于观察衰减的影响
        let levels = [100u8, 100, 100, 100, 100, 200, 213, 200, 213];
        let frames = || levels.iter().map(|v| flat(*v)).collect::<Vec<_>>();

        let without_decay = DetectorConfig {
            window_size: 1,
            k: 0,
            ..DetectorConfig::default()
        };
        let events = detect(frames(), &without_decay).unwrap();
        let cuts: Vec<usize> = events.iter().map(|e| e.curr_frame_index).collect();
        assert_eq!(cuts, vec![5, 6, 7, 8]);

        let with_decay = DetectorConfig {
            window_size: 1,
            ..DetectorConfig::default()
        };
        let events = detect(frames(), &with_decay).unwrap();
        let cuts: Vec<usize> = events.iter().map(|e| e.curr_frame_index).collect();
        assert_eq!(cuts, vec![5]);
    }

    #[test]
    fn test_streaming_api_tracks_state() {
        let mut detector = SceneChangeDetector::new(DetectorConfig::default()).unwrap();
        for image in cut_sequence() {
            detector.process_frame(image).unwrap();
        }

        assert_eq!(detector.frames_seen(), 20);
        assert_eq!(detector.history().len(), 19);
        // 帧 1..=3 判断时窗口中不足 3 个分数
        assert!(detector.history()[..3].iter().all(|p| p.threshold.is_none()));
        assert!(detector.history()[3..].iter().all(|p| p.threshold.is_some()));

        // 切换发生在第 10 帧，之后 9 帧都没有新的切换
        let decay = detector.decay_state();
        assert!(decay.active);
        assert_eq!(decay.anchor_frame_index, Some(10));
        assert_eq!(decay.frames_remaining, 20 - 9);
        assert!(detector.current_threshold().is_some());
        assert_eq!(detector.events().len(), 1);
    }

    #[derive(Default)]
    struct Recorder {
        steps: usize,
        scored: usize,
        cut_pairs: Vec<(usize, usize)>,
        last_history_len: usize,
    }

    impl DetectionObserver for Recorder {
        fn on_step(&mut self, step: &FrameStep<'_>) {
            self.steps += 1;
            if step.score.is_some() {
                self.scored += 1;
            }
            if let (Some(event), Some(previous)) = (step.event, step.previous) {
                assert_eq!(previous.index(), event.prev_frame_index);
                self.cut_pairs.push((previous.index(), step.frame.index()));
            }
            self.last_history_len = step.history.len();
        }
    }

    #[test]
    fn test_observer_sees_every_step() {
        let mut recorder = Recorder::default();
        let events =
            detect_with_observer(cut_sequence(), &DetectorConfig::default(), &mut recorder).unwrap();

        assert_eq!(recorder.steps, 20);
        assert_eq!(recorder.scored, 19);
        assert_eq!(recorder.last_history_len, 19);
        assert_eq!(recorder.cut_pairs, vec![(9, 10)]);
        assert_eq!(events.len(), 1);
    }
}
