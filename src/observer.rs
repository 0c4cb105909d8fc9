use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::decay::DecayState;
use crate::error::{DetectError, Result};
use crate::frame::Frame;
use crate::scene_detector::{SceneChangeEvent, ScorePoint};
use crate::similarity::SimilarityScore;
use crate::threshold::ThresholdState;

const PLOT_BACKGROUND: Rgb<u8> = Rgb([16, 16, 16]);
const PLOT_SCORE: Rgb<u8> = Rgb([230, 230, 230]);
const PLOT_THRESHOLD: Rgb<u8> = Rgb([220, 60, 60]);

/// 检测器每处理完一帧交给观察者的视图
#[derive(Debug)]
pub struct FrameStep<'a> {
    pub frame: &'a Frame,
    /// 第一帧没有前一帧
    pub previous: Option<&'a Frame>,
    pub score: Option<SimilarityScore>,
    /// 窗口未预热时为 None
    pub threshold: Option<ThresholdState>,
    pub event: Option<&'a SceneChangeEvent>,
    pub decay: DecayState,
    /// 截至当前帧的 (分数, 阈值) 历史
    pub history: &'a [ScorePoint],
}

/// 检测过程的观察者（渲染、日志等），不影响检测结果
pub trait DetectionObserver {
    fn on_step(&mut self, step: &FrameStep<'_>);
}

impl DetectionObserver for () {
    fn on_step(&mut self, _step: &FrameStep<'_>) {}
}

impl<T: DetectionObserver> DetectionObserver for Option<T> {
    fn on_step(&mut self, step: &FrameStep<'_>) {
        if let Some(observer) = self {
            observer.on_step(step);
        }
    }
}

impl<A: DetectionObserver, B: DetectionObserver> DetectionObserver for (A, B) {
    fn on_step(&mut self, step: &FrameStep<'_>) {
        self.0.on_step(step);
        self.1.on_step(step);
    }
}

/// 把每一帧的分数和阈值写进日志
#[derive(Debug, Default)]
pub struct LoggingObserver {
    frames: usize,
    cuts: usize,
}

impl DetectionObserver for LoggingObserver {
    fn on_step(&mut self, step: &FrameStep<'_>) {
        self.frames += 1;

        let Some(score) = step.score else {
            debug!("📥 [场景检测] 帧 {}: 首帧，跳过比较", step.frame.index());
            return;
        };

        match step.threshold {
            Some(t) => debug!(
                "📊 [场景检测] 帧 {}: 差异 {:.4}, 阈值 {:.4} (原始 {:.4}, 均值 {:.4}, 标准差 {:.4}, 衰减剩余 {} 帧)",
                step.frame.index(),
                score.value,
                t.effective_threshold,
                t.raw_threshold,
                t.mean,
                t.std,
                step.decay.frames_remaining
            ),
            None => debug!(
                "📊 [场景检测] 帧 {}: 差异 {:.4}, 窗口预热中",
                step.frame.index(),
                score.value
            ),
        }

        if let Some(event) = step.event {
            self.cuts += 1;
            info!(
                "✂️  [场景检测] 切换 #{}: 帧 {} -> {}",
                self.cuts,
                event.prev_frame_index,
                event.curr_frame_index
            );
        }
    }
}

/// 关键帧渲染器
///
/// 每检测到一次切换，把切换前后两帧保存成图片；结束时可以把分数/阈值曲线画成图。
#[derive(Debug)]
pub struct KeyframeRenderer {
    output_dir: PathBuf,
    cut_counter: usize,
    saved_files: Vec<PathBuf>,
    failures: Vec<String>,
    history: Vec<ScorePoint>,
}

impl KeyframeRenderer {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir).map_err(|source| DetectError::Io {
            path: output_dir.clone(),
            source,
        })?;

        Ok(Self {
            output_dir,
            cut_counter: 0,
            saved_files: Vec::new(),
            failures: Vec::new(),
            history: Vec::new(),
        })
    }

    fn save_frame(&mut self, frame: &Frame, filename: String) {
        let path = self.output_dir.join(&filename);
        let rgb = DynamicImage::ImageRgb8(frame.image().to_rgb8());
        match rgb.save(&path) {
            Ok(()) => {
                debug!("💾 [渲染] 已保存关键帧: {} (帧 {})", filename, frame.index());
                self.saved_files.push(path);
            }
            Err(e) => {
                warn!("⚠️  [渲染] 保存关键帧失败: {} - {}", filename, e);
                self.failures.push(format!("{}: {}", filename, e));
            }
        }
    }

    /// 已保存的关键帧文件
    pub fn saved_files(&self) -> &[PathBuf] {
        &self.saved_files
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn history(&self) -> &[ScorePoint] {
        &self.history
    }

    /// 把分数/阈值曲线保存为 `score_history.png`
    pub fn finish(&self) -> Result<PathBuf> {
        let path = self.output_dir.join("score_history.png");
        plot_history(&self.history, 800, 240).save(&path)?;
        info!("📈 [渲染] 分数曲线已保存: {}", path.display());
        Ok(path)
    }
}

impl DetectionObserver for KeyframeRenderer {
    fn on_step(&mut self, step: &FrameStep<'_>) {
        if step.score.is_some() {
            if let Some(point) = step.history.last() {
                self.history.push(*point);
            }
        }

        if let (Some(_), Some(previous)) = (step.event, step.previous) {
            let id = self.cut_counter;
            self.save_frame(previous, format!("cut_{:04}_prev.jpg", id));
            self.save_frame(step.frame, format!("cut_{:04}_curr.jpg", id));
            self.cut_counter += 1;
        }
    }
}

/// 把分数（浅色）和阈值（红色）画成折线图
pub fn plot_history(history: &[ScorePoint], width: u32, height: u32) -> RgbImage {
    let width = width.max(2);
    let height = height.max(2);
    let mut canvas = RgbImage::from_pixel(width, height, PLOT_BACKGROUND);
    if history.is_empty() {
        return canvas;
    }

    let peak = history
        .iter()
        .flat_map(|p| std::iter::once(p.score).chain(p.threshold))
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    let peak = if peak > 0.0 { peak } else { 1.0 };

    let span = (history.len().max(2) - 1) as f64;
    let to_xy = |i: usize, value: f64| -> (f64, f64) {
        let x = i as f64 / span * (width - 1) as f64;
        let y = (1.0 - (value / peak).clamp(0.0, 1.0)) * (height - 1) as f64;
        (x, y)
    };

    for (i, pair) in history.windows(2).enumerate() {
        let (x0, y0) = to_xy(i, pair[0].score);
        let (x1, y1) = to_xy(i + 1, pair[1].score);
        draw_line(&mut canvas, (x0, y0), (x1, y1), PLOT_SCORE);

        if let (Some(t0), Some(t1)) = (pair[0].threshold, pair[1].threshold) {
            let (x0, y0) = to_xy(i, t0);
            let (x1, y1) = to_xy(i + 1, t1);
            draw_line(&mut canvas, (x0, y0), (x1, y1), PLOT_THRESHOLD);
        }
    }

    if history.len() == 1 {
        let (x, y) = to_xy(0, history[0].score);
        canvas.put_pixel(x as u32, y as u32, PLOT_SCORE);
    }

    canvas
}

fn draw_line(canvas: &mut RgbImage, from: (f64, f64), to: (f64, f64), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
    for step in 0..=steps {
        let t = step as f64 / steps as f64;
        let x = (from.0 + (to.0 - from.0) * t).round();
        let y = (from.1 + (to.1 - from.1) * t).round();
        if x >= 0.0 && y >= 0.0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_detector::{detect_with_observer, DetectorConfig};
    use image::{ImageBuffer, Luma};

    fn flat(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(16, 16, |_, _| Luma([value])))
    }

    fn cut_frames() -> Vec<DynamicImage> {
        let mut frames: Vec<DynamicImage> = (0..6).map(|_| flat(40)).collect();
        frames.extend((0..4).map(|_| flat(220)));
        frames
    }

    #[test]
    fn test_keyframe_renderer_saves_cut_pair() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = KeyframeRenderer::new(dir.path().join("frames")).unwrap();

        let events = detect_with_observer(cut_frames(), &DetectorConfig::default(), &mut renderer).unwrap();
        assert_eq!(events.len(), 1);

        let names: Vec<String> = renderer
            .saved_files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["cut_0000_prev.jpg", "cut_0000_curr.jpg"]);
        assert!(renderer.failures().is_empty());
        assert_eq!(renderer.history().len(), 9);

        let plot = renderer.finish().unwrap();
        assert!(plot.exists());
    }

    #[test]
    fn test_plot_history_draws_both_curves() {
        let history = vec![
            ScorePoint { frame_index: 1, score: 0.0, threshold: None },
            ScorePoint { frame_index: 2, score: 0.01, threshold: Some(0.02) },
            ScorePoint { frame_index: 3, score: 0.5, threshold: Some(0.02) },
            ScorePoint { frame_index: 4, score: 0.0, threshold: Some(0.06) },
        ];
        let plot = plot_history(&history, 100, 50);

        assert_eq!(plot.dimensions(), (100, 50));
        assert!(plot.pixels().any(|p| *p == PLOT_SCORE));
        assert!(plot.pixels().any(|p| *p == PLOT_THRESHOLD));
        // 峰值画在最上面一行
        assert!((0..100).any(|x| *plot.get_pixel(x, 0) == PLOT_SCORE));
    }

    #[test]
    fn test_plot_empty_history() {
        let plot = plot_history(&[], 10, 10);
        assert!(plot.pixels().all(|p| *p == PLOT_BACKGROUND));
    }

    #[test]
    fn test_combined_observers() {
        let mut observers = (LoggingObserver::default(), None::<KeyframeRenderer>);
        let events = detect_with_observer(cut_frames(), &DetectorConfig::default(), &mut observers).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(observers.0.frames, 10);
        assert_eq!(observers.0.cuts, 1);
    }
}
