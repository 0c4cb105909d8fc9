use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DetectError, Result};
use crate::metadata::SceneChangeReport;

/// 检测结果的持久化
pub trait ResultWriter {
    /// 写出结果，返回生成的文件路径
    fn write(&self, report: &SceneChangeReport) -> Result<PathBuf>;
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| DetectError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| DetectError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// 文本格式：每行一个 `前一帧序号 后一帧序号`
#[derive(Debug, Clone)]
pub struct TextResultWriter {
    output_dir: PathBuf,
}

impl TextResultWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn render(report: &SceneChangeReport) -> String {
        let mut out = String::new();
        for cut in &report.scene_changes {
            // 写入 String 不会失败
            let _ = writeln!(out, "{} {}", cut.prev_frame_index, cut.curr_frame_index);
        }
        out
    }
}

impl ResultWriter for TextResultWriter {
    fn write(&self, report: &SceneChangeReport) -> Result<PathBuf> {
        ensure_dir(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("{}_scene_changes.txt", report.file_stem()));
        write_file(&path, &Self::render(report))?;
        info!("📝 [结果输出] 切换列表已写入: {}", path.display());
        Ok(path)
    }
}

/// JSON 格式，包含视频信息、检测参数和全部切换
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    output_dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }
}

impl ResultWriter for JsonReportWriter {
    fn write(&self, report: &SceneChangeReport) -> Result<PathBuf> {
        ensure_dir(&self.output_dir)?;
        let path = self
            .output_dir
            .join(format!("{}_scene_changes.json", report.file_stem()));
        let json = serde_json::to_string_pretty(report)?;
        write_file(&path, &json)?;
        info!("📝 [结果输出] 元数据已写入: {}", path.display());
        Ok(path)
    }
}
