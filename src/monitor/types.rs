use crate::utils::error::MonitorError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 模型输出的四种天空状态，顺序与分数向量一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkyCondition {
    Clear,
    Cloudy,
    Covered,
    Rainy,
}

impl SkyCondition {
    pub const ALL: [SkyCondition; 4] = [
        SkyCondition::Clear,
        SkyCondition::Cloudy,
        SkyCondition::Covered,
        SkyCondition::Rainy,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            SkyCondition::Clear => "Clear",
            SkyCondition::Cloudy => "Cloudy",
            SkyCondition::Covered => "Covered",
            SkyCondition::Rainy => "Rainy",
        }
    }

    /// 取分数最大的类别，并列时取第一个
    pub fn from_scores(scores: &[f32]) -> Result<Self> {
        if scores.len() != Self::ALL.len() {
            return Err(MonitorError::ClassifierInvocation(format!(
                "expected {} class scores, got {}",
                Self::ALL.len(),
                scores.len()
            )));
        }

        let mut best = 0;
        for (i, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[best] || (scores[best].is_nan() && !score.is_nan()) {
                best = i;
            }
        }

        if scores[best].is_nan() {
            return Err(MonitorError::ClassifierInvocation(
                "classifier returned only NaN scores".to_string(),
            ));
        }

        Ok(Self::ALL[best])
    }
}

impl fmt::Display for SkyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<usize> for SkyCondition {
    type Error = MonitorError;

    fn try_from(index: usize) -> Result<Self> {
        Self::from_index(index).ok_or_else(|| {
            MonitorError::ClassifierInvocation(format!("unknown class index {}", index))
        })
    }
}

/// 对外可见的判定：是否安全 + 状态文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_safe: bool,
    pub status: String,
}

impl Verdict {
    pub fn new(is_safe: bool, status: impl Into<String>) -> Self {
        Self {
            is_safe,
            status: status.into(),
        }
    }

    pub fn safe(status: impl Into<String>) -> Self {
        Self::new(true, status)
    }

    pub fn unsafe_with(status: impl Into<String>) -> Self {
        Self::new(false, status)
    }

    /// 启动前的初始判定
    pub fn initializing() -> Self {
        Self::safe("Initializing")
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self::initializing()
    }
}

/// 迟滞状态，只由 `SafetyStateMachine` 修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyState {
    /// 自上次晴朗以来，多云或更差天气累计的分钟数
    pub cloudy_accumulated_minutes: u32,
    /// 连续阴天累计的分钟数
    pub covered_accumulated_minutes: u32,
    pub is_safe: bool,
    pub status_message: String,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            cloudy_accumulated_minutes: 0,
            covered_accumulated_minutes: 0,
            is_safe: true,
            status_message: "Initializing".to_string(),
        }
    }
}

impl SafetyState {
    pub fn verdict(&self) -> Verdict {
        Verdict::new(self.is_safe, self.status_message.clone())
    }
}
