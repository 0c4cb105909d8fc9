use std::path::PathBuf;
use thiserror::Error;

use crate::scene_detector::SceneChangeEvent;

/// 帧尺寸（宽, 高, 通道数）
pub type FrameShape = (u32, u32, u8);

/// 场景检测过程中的错误类型
#[derive(Error, Debug)]
pub enum DetectError {
    /// 无法打开视频源，直接失败，不重试
    #[error("无法打开视频文件: {}: {reason}", .path.display())]
    InvalidInputPath { path: PathBuf, reason: String },

    /// 相邻两帧尺寸不一致（视频源损坏或混入了不同分辨率的帧）
    #[error(
        "帧尺寸不一致: 第 {frame_index} 帧为 {}x{}x{}，期望 {}x{}x{}",
        .found.0, .found.1, .found.2, .expected.0, .expected.1, .expected.2
    )]
    ShapeMismatch {
        frame_index: usize,
        expected: FrameShape,
        found: FrameShape,
    },

    /// 配置非法，在处理任何帧之前失败
    #[error("配置无效: {0}")]
    InvalidConfiguration(String),

    /// 解码过程中出错
    #[error("视频解码失败: {0}")]
    Decode(String),

    #[error("文件读写失败: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("图像处理失败: {0}")]
    Image(#[from] image::ImageError),

    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ffmpeg_next::Error> for DetectError {
    fn from(e: ffmpeg_next::Error) -> Self {
        DetectError::Decode(e.to_string())
    }
}

/// 检测中途失败时的结果：错误本身加上失败前已经确认的场景切换
///
/// 失败之前产生的事件仍然有效，调用方可以继续使用。
#[derive(Error, Debug)]
#[error("{error}（失败前已检测到 {} 个场景切换）", .events.len())]
pub struct DetectFailure {
    #[source]
    pub error: DetectError,
    pub events: Vec<SceneChangeEvent>,
}

impl DetectFailure {
    pub fn new(error: DetectError, events: Vec<SceneChangeEvent>) -> Self {
        Self { error, events }
    }

    /// 配置或打开阶段的失败，没有任何事件
    pub fn without_events(error: DetectError) -> Self {
        Self::new(error, Vec::new())
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
