use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DetectError, Result};
use crate::frame::Frame;

/// 方差小于该值时视为纯色帧
const FLAT_VARIANCE_EPSILON: f64 = 1e-12;

/// 帧差异度量方法
///
/// 所有方法都保证“值越大差异越大”，阈值比较因此与方法无关。
/// SAD/SSD/MAD 都按全部采样值（像素数 × 通道数）取平均，取值范围与通道数无关，
/// 彩色帧和灰度帧可以共用同一个阈值下限。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimilarityMethod {
    /// 绝对差之和，按采样值取平均
    #[default]
    Sad,
    /// 平方差之和，按采样值取平均
    Ssd,
    /// 平均绝对差；帧尺寸固定时与 SAD 相同
    Mad,
    /// 归一化互相关，输出 `1 - r`
    Corr,
}

impl SimilarityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::Sad => "SAD",
            SimilarityMethod::Ssd => "SSD",
            SimilarityMethod::Mad => "MAD",
            SimilarityMethod::Corr => "CORR",
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMethod {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAD" => Ok(SimilarityMethod::Sad),
            "SSD" => Ok(SimilarityMethod::Ssd),
            "MAD" => Ok(SimilarityMethod::Mad),
            "CORR" => Ok(SimilarityMethod::Corr),
            other => Err(DetectError::InvalidConfiguration(format!(
                "未知的差异度量方法: {}（可选 SAD, SSD, MAD, CORR）",
                other
            ))),
        }
    }
}

/// 某一帧与前一帧的差异分数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub frame_index: usize,
    pub value: f64,
    pub method: SimilarityMethod,
}

impl SimilarityScore {
    /// 计算 `curr` 相对于 `prev` 的差异分数
    pub fn compute(prev: &Frame, curr: &Frame, method: SimilarityMethod) -> Result<Self> {
        Ok(Self {
            frame_index: curr.index(),
            value: score(prev, curr, method)?,
            method,
        })
    }
}

/// 计算两帧之间的差异度，两帧尺寸必须一致
pub fn score(prev: &Frame, curr: &Frame, method: SimilarityMethod) -> Result<f64> {
    if prev.shape() != curr.shape() {
        return Err(DetectError::ShapeMismatch {
            frame_index: curr.index(),
            expected: prev.shape(),
            found: curr.shape(),
        });
    }

    let samples = prev.pixel_count() * prev.channels() as usize;
    if samples == 0 {
        return Ok(0.0);
    }

    let value = match method {
        SimilarityMethod::Sad | SimilarityMethod::Mad => {
            calculate_absolute_difference(prev, curr) / samples as f64
        }
        SimilarityMethod::Ssd => calculate_squared_difference(prev, curr) / samples as f64,
        SimilarityMethod::Corr => 1.0 - calculate_correlation(prev.samples(), curr.samples()),
    };

    Ok(value)
}

fn calculate_absolute_difference(prev: &Frame, curr: &Frame) -> f64 {
    prev.samples()
        .iter()
        .zip(curr.samples())
        .map(|(a, b)| (*a as f64 - *b as f64).abs())
        .sum()
}

fn calculate_squared_difference(prev: &Frame, curr: &Frame) -> f64 {
    prev.samples()
        .iter()
        .zip(curr.samples())
        .map(|(a, b)| {
            let d = *a as f64 - *b as f64;
            d * d
        })
        .sum()
}

/// 皮尔逊相关系数，结果限制在 [-1, 1]
///
/// 纯色帧的方差为 0，相关系数无定义：两帧都是纯色时，相同记为 1、不同记为 0；
/// 只有一帧是纯色时记为 0。
fn calculate_correlation(x: &[f32], y: &[f32]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().map(|v| *v as f64).sum::<f64>() / n;
    let mean_y = y.iter().map(|v| *v as f64).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = *a as f64 - mean_x;
        let dy = *b as f64 - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let flat_x = var_x / n < FLAT_VARIANCE_EPSILON;
    let flat_y = var_y / n < FLAT_VARIANCE_EPSILON;
    match (flat_x, flat_y) {
        (true, true) => {
            if (mean_x - mean_y).abs() < 1e-9 {
                1.0
            } else {
                0.0
            }
        }
        (true, false) | (false, true) => 0.0,
        (false, false) => (covariance / (var_x * var_y).sqrt()).clamp(-1.0, 1.0),
    }
}
