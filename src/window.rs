use std::collections::VecDeque;

/// 最近若干个差异分数的滑动窗口
///
/// 均值和总体标准差通过累加和、平方和增量维护；每推入 `capacity` 个分数
/// 就从头精确重算一次，避免长视频上的浮点漂移。
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    values: VecDeque<f64>,
    capacity: usize,
    warmup: usize,
    sum: f64,
    sum_sq: f64,
    pushes_since_resync: usize,
}

impl SlidingWindow {
    /// `capacity` 为 0 时按 1 处理；`warmup` 会被限制在 `[1, capacity]`
    pub fn new(capacity: usize, warmup: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            warmup: warmup.clamp(1, capacity),
            sum: 0.0,
            sum_sq: 0.0,
            pushes_since_resync: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
                self.sum_sq -= oldest * oldest;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        self.pushes_since_resync += 1;
        if self.pushes_since_resync >= self.capacity {
            self.resync();
        }
    }

    fn resync(&mut self) {
        self.sum = self.values.iter().sum();
        self.sum_sq = self.values.iter().map(|v| v * v).sum();
        self.pushes_since_resync = 0;
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum / self.values.len() as f64
    }

    /// 总体标准差，空窗口为 0
    pub fn std(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let n = self.values.len() as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0).sqrt()
    }

    /// 窗口中的分数足够多，可以用来计算阈值
    pub fn is_warm(&self) -> bool {
        self.values.len() >= self.warmup
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn values(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }
}
