use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::scene_detector::{DetectorConfig, SceneChangeEvent};

/// 单个场景切换的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCut {
    /// 切换编号（从 0 开始）
    pub cut_id: usize,
    /// 切换前一帧的序号
    pub prev_frame_index: usize,
    /// 切换后一帧的序号
    pub curr_frame_index: usize,
    /// 切换前一帧的时间戳（秒），未知时为空
    pub prev_time: Option<f64>,
    /// 切换后一帧的时间戳（秒），未知时为空
    pub curr_time: Option<f64>,
    /// 差异分数
    pub score: f64,
    /// 检测时的阈值
    pub threshold: f64,
}

/// 整个视频的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneChangeReport {
    /// 输入视频文件路径
    pub input_video: String,
    /// 视频帧率
    pub fps: f64,
    /// 视频分辨率（宽x高）
    pub resolution: String,
    /// 参与检测的帧数
    pub frame_count: usize,
    /// 检测参数
    pub detector: DetectorConfig,
    /// 检测到的切换数量
    pub scene_change_count: usize,
    /// 生成时间（RFC 3339）
    pub generated_at: String,
    /// 切换列表
    pub scene_changes: Vec<SceneCut>,
}

impl SceneChangeReport {
    /// `timestamps[i]` 为第 i 帧的时间戳，可以为空
    pub fn new(
        input_video: impl AsRef<Path>,
        fps: f64,
        (width, height): (u32, u32),
        detector: DetectorConfig,
        frame_count: usize,
        events: &[SceneChangeEvent],
        timestamps: &[f64],
    ) -> Self {
        let scene_changes: Vec<SceneCut> = events
            .iter()
            .enumerate()
            .map(|(cut_id, event)| SceneCut {
                cut_id,
                prev_frame_index: event.prev_frame_index,
                curr_frame_index: event.curr_frame_index,
                prev_time: timestamps.get(event.prev_frame_index).copied(),
                curr_time: timestamps.get(event.curr_frame_index).copied(),
                score: event.score,
                threshold: event.threshold_at_detection,
            })
            .collect();

        Self {
            input_video: input_video.as_ref().to_string_lossy().to_string(),
            fps,
            resolution: format!("{}x{}", width, height),
            frame_count,
            detector,
            scene_change_count: scene_changes.len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            scene_changes,
        }
    }

    /// 输出文件名使用的前缀（输入文件名去掉扩展名）
    pub fn file_stem(&self) -> String {
        Path::new(&self.input_video)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "video".to_string())
    }
}
