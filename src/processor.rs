use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::DetectError;
use crate::metadata::SceneChangeReport;
use crate::observer::{KeyframeRenderer, LoggingObserver};
use crate::scene_detector::{detect_stream, DetectorConfig, SceneChangeEvent};
use crate::video_processor::VideoProcessor;
use crate::writer::{JsonReportWriter, ResultWriter, TextResultWriter};

/// 视频处理配置
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessConfig {
    /// 场景检测参数
    pub detector: DetectorConfig,
    /// 是否保存切换前后的关键帧和分数曲线
    pub display: bool,
    /// 是否写出结果文件
    pub output: bool,
    /// 输出目录
    pub output_dir: PathBuf,
    /// 帧采样率（每秒采样多少帧），None 表示逐帧处理
    pub sample_rate: Option<f64>,
}

impl ProcessConfig {
    pub fn validate(&self) -> std::result::Result<(), DetectError> {
        self.detector.validate()?;
        if let Some(rate) = self.sample_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(DetectError::InvalidConfiguration(format!(
                    "sample_rate 必须大于 0，实际为 {}",
                    rate
                )));
            }
        }
        Ok(())
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            display: false,
            output: false,
            output_dir: PathBuf::from("./output"),
            sample_rate: None,
        }
    }
}

/// 处理结果
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// 检测到的场景切换
    pub events: Vec<SceneChangeEvent>,
    /// 参与检测的帧数
    pub frames_processed: usize,
    /// 写出的文件（结果文件、关键帧、分数曲线）
    pub written_files: Vec<PathBuf>,
    /// 输出目录
    pub output_dir: PathBuf,
}

/// 把检测结果写成文本列表和 JSON 元数据
pub fn write_results(report: &SceneChangeReport, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let text = TextResultWriter::new(output_dir);
    let json = JsonReportWriter::new(output_dir);
    let writers: [&dyn ResultWriter; 2] = [&text, &json];

    let mut written = Vec::with_capacity(writers.len());
    for writer in writers {
        let path = writer.write(report).map_err(|e| {
            error!("❌ [视频处理] 写入结果失败: {}", e);
            e
        })?;
        written.push(path);
    }
    Ok(written)
}

/// 收尾关键帧渲染器：写出分数曲线，返回渲染产生的全部文件
///
/// 检测中途失败时同样调用，失败前保存的关键帧也会被报告。
pub fn finish_renderer(renderer: Option<KeyframeRenderer>) -> Vec<PathBuf> {
    let Some(renderer) = renderer else {
        return Vec::new();
    };

    for failure in renderer.failures() {
        warn!("⚠️  [视频处理] 关键帧保存失败: {}", failure);
    }
    let mut files = renderer.saved_files().to_vec();
    match renderer.finish() {
        Ok(path) => files.push(path),
        Err(e) => warn!("⚠️  [视频处理] 保存分数曲线失败: {}", e),
    }
    files
}

/// 处理视频文件
pub fn process_video(input_video_path: impl AsRef<Path>, config: &ProcessConfig) -> Result<ProcessOutput> {
    let input_video_path = input_video_path.as_ref();
    let output_dir = config.output_dir.as_path();
    config.validate().context("检测参数无效")?;

    let total_start = Instant::now();
    info!("🎬 [视频处理] 开始处理视频: {}", input_video_path.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. 初始化视频处理器
    let init_start = Instant::now();
    let processor = VideoProcessor::new(input_video_path).map_err(|e| {
        error!("❌ [视频处理] 初始化视频处理器失败: {}", e);
        e
    })?;
    info!(
        "✅ [视频处理] 初始化视频处理器完成，耗时: {:.2}秒",
        init_start.elapsed().as_secs_f64()
    );

    // 2. 获取视频信息
    let (fps, width, height) = processor.get_video_info().map_err(|e| {
        error!("❌ [视频处理] 获取视频信息失败: {}", e);
        e
    })?;
    info!("  • 分辨率: {}x{}", width, height);
    info!("  • 帧率: {:.2} fps", fps);
    match config.sample_rate {
        Some(rate) => info!("  • 采样率: {:.1} fps", rate),
        None => info!("  • 采样率: 逐帧"),
    }

    // 3. 逐帧检测场景切换
    let detect_start = Instant::now();
    info!(
        "⏳ [视频处理] 正在检测场景变化（方法: {}, 窗口: {}）...",
        config.detector.method, config.detector.window_size
    );
    let mut frames = processor.frames(config.sample_rate)?;
    let renderer = if config.display {
        Some(
            KeyframeRenderer::new(output_dir.join("keyframes"))
                .context("创建关键帧输出目录失败")?,
        )
    } else {
        None
    };
    let mut observers = (LoggingObserver::default(), renderer);

    let detection = detect_stream(frames.by_ref(), &config.detector, &mut observers);
    let frames_processed = frames.timestamps().len();
    let (_, renderer) = observers;
    let events = match detection {
        Ok(events) => events,
        Err(failure) => {
            error!(
                "❌ [视频处理] 场景检测在第 {} 帧后中止: {}",
                frames_processed, failure.error
            );
            for event in &failure.events {
                warn!(
                    "⚠️  [视频处理] 中止前已确认的切换: {} -> {}",
                    event.prev_frame_index, event.curr_frame_index
                );
            }
            for path in finish_renderer(renderer) {
                warn!("⚠️  [视频处理] 中止前已写出: {}", path.display());
            }
            return Err(anyhow::Error::new(failure)).context(format!(
                "场景检测失败: {}",
                input_video_path.display()
            ));
        }
    };
    let detect_duration = detect_start.elapsed();
    let avg_frame_time = if frames_processed > 0 {
        detect_duration.as_millis() as f64 / frames_processed as f64
    } else {
        0.0
    };
    info!("✅ [视频处理] 场景检测完成，耗时: {:.2}秒", detect_duration.as_secs_f64());
    info!("  • 处理帧数: {} 帧", frames_processed);
    info!("  • 平均每帧耗时: {:.2}ms", avg_frame_time);
    info!("  • 检测到切换数: {} 个", events.len());

    // 4. 保存关键帧和分数曲线
    let mut written_files = finish_renderer(renderer);

    // 5. 写出结果
    let output_start = Instant::now();
    if config.output {
        info!("⏳ [视频处理] 正在写出检测结果...");
        let report = SceneChangeReport::new(
            input_video_path,
            fps,
            (width, height),
            config.detector.clone(),
            frames_processed,
            &events,
            frames.timestamps(),
        );
        written_files.extend(write_results(&report, output_dir)?);
        info!(
            "✅ [视频处理] 结果写出完成，耗时: {:.2}秒",
            output_start.elapsed().as_secs_f64()
        );
    }

    // 总结
    let total_duration = total_start.elapsed();
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "🎉 [视频处理] 处理完成！总耗时: {:.2}秒 ({:.0}ms)",
        total_duration.as_secs_f64(),
        total_duration.as_millis()
    );
    let detect_percent = detect_duration.as_secs_f64() / total_duration.as_secs_f64().max(f64::EPSILON) * 100.0;
    info!("   • 场景检测: {:.2}秒 ({:.1}%)", detect_duration.as_secs_f64(), detect_percent);
    if !written_files.is_empty() {
        info!("📁 [视频处理] 输出目录: {}", output_dir.display());
        info!("📄 [视频处理] 输出文件数量: {}", written_files.len());
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    Ok(ProcessOutput {
        events,
        frames_processed,
        written_files,
        output_dir: output_dir.to_path_buf(),
    })
}
