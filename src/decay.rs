use serde::Serialize;

/// 衰减控制器所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecayPhase {
    Idle,
    Decaying,
}

/// 衰减状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecayState {
    pub active: bool,
    pub frames_remaining: usize,
    /// 最近一次触发衰减的切换帧序号
    pub anchor_frame_index: Option<usize>,
}

/// 检测到场景切换后，在接下来的 `k` 帧内放宽阈值
///
/// 再次检测到切换时重新计数，不会叠加多个衰减周期。
#[derive(Debug, Clone)]
pub struct DecayController {
    k: usize,
    frames_remaining: usize,
    anchor_frame_index: Option<usize>,
}

impl DecayController {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            frames_remaining: 0,
            anchor_frame_index: None,
        }
    }

    /// 确认一次切换后进入（或重新进入）衰减
    pub fn arm(&mut self, frame_index: usize) {
        self.frames_remaining = self.k;
        self.anchor_frame_index = Some(frame_index);
    }

    /// 前进一帧，计数归零后回到 Idle
    pub fn step(&mut self) {
        self.frames_remaining = self.frames_remaining.saturating_sub(1);
    }

    pub fn phase(&self) -> DecayPhase {
        if self.frames_remaining > 0 {
            DecayPhase::Decaying
        } else {
            DecayPhase::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == DecayPhase::Decaying
    }

    pub fn frames_remaining(&self) -> usize {
        self.frames_remaining
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// 剩余帧数占衰减窗口的比例，Idle 时为 0
    pub fn progress(&self) -> f64 {
        if self.k == 0 {
            return 0.0;
        }
        self.frames_remaining as f64 / self.k as f64
    }

    pub fn state(&self) -> DecayState {
        DecayState {
            active: self.is_active(),
            frames_remaining: self.frames_remaining,
            anchor_frame_index: self.anchor_frame_index,
        }
    }
}
