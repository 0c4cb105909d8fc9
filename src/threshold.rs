use serde::Serialize;

use crate::decay::DecayController;

/// 单帧的阈值计算结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdState {
    pub mean: f64,
    pub std: f64,
    pub raw_threshold: f64,
    pub effective_threshold: f64,
}

/// 自适应阈值模型
///
/// `raw = max(a * mean + b * std, s)`；衰减期内
/// `effective = raw * (1 + c * frames_remaining / k)`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdModel {
    a: f64,
    b: f64,
    c: f64,
    floor: f64,
}

impl ThresholdModel {
    pub fn new(a: f64, b: f64, c: f64, floor: f64) -> Self {
        Self { a, b, c, floor }
    }

    /// 由窗口统计量计算原始阈值，不低于下限 `s`
    pub fn compute(&self, mean: f64, std: f64) -> f64 {
        (self.a * mean + self.b * std).max(self.floor)
    }

    /// 按衰减状态放宽阈值
    pub fn relax(&self, raw_threshold: f64, decay: &DecayController) -> f64 {
        if decay.is_active() {
            raw_threshold * (1.0 + self.c * decay.progress())
        } else {
            raw_threshold
        }
    }

    pub fn evaluate(&self, mean: f64, std: f64, decay: &DecayController) -> ThresholdState {
        let raw_threshold = self.compute(mean, std);
        ThresholdState {
            mean,
            std,
            raw_threshold,
            effective_threshold: self.relax(raw_threshold, decay),
        }
    }
}
