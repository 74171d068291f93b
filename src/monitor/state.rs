use crate::config::MonitorConfig;
use crate::monitor::types::{SafetyState, SkyCondition, Verdict};
use crate::utils::trace::DebugLog;
use chrono::{Local, NaiveTime};
use std::sync::Arc;

/// 滞后状态机：异常天气累计分钟数，超过容忍度判为不安全，`Clear` 清零
///
/// `Covered` 同时累计两个计数器，因此始终 `covered <= cloudy`。
#[derive(Clone)]
pub struct SafetyStateMachine {
    state: SafetyState,
    cloudy_tolerance: u32,
    covered_tolerance: u32,
    log: Arc<dyn DebugLog>,
}

impl SafetyStateMachine {
    pub fn new(cloudy_tolerance: u32, covered_tolerance: u32, log: Arc<dyn DebugLog>) -> Self {
        Self {
            state: SafetyState::default(),
            cloudy_tolerance,
            covered_tolerance,
            log,
        }
    }

    pub fn from_config(config: &MonitorConfig, log: Arc<dyn DebugLog>) -> Self {
        Self::new(config.cloudy_tolerance, config.covered_tolerance, log)
    }

    /// 应用新配置的阈值和日志，保留累计分钟数
    pub fn reconfigure(&mut self, config: &MonitorConfig, log: Arc<dyn DebugLog>) {
        self.cloudy_tolerance = config.cloudy_tolerance;
        self.covered_tolerance = config.covered_tolerance;
        self.log = log;
    }

    /// 回到初始状态
    pub fn reset(&mut self) {
        self.state = SafetyState::default();
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn verdict(&self) -> Verdict {
        self.state.verdict()
    }

    /// 周期失败时标记为不安全，累计分钟数保持不变
    pub fn mark_unsafe(&mut self, status: &str) -> Verdict {
        self.state.is_safe = false;
        self.state.status_message = status.to_string();
        self.state.verdict()
    }

    /// 只替换状态文本
    pub fn set_status(&mut self, status: &str) -> Verdict {
        self.state.status_message = status.to_string();
        self.state.verdict()
    }

    /// 以当前本地时间为时间戳处理一次分类结果
    pub fn update(&mut self, condition: SkyCondition, cycle_minutes: u32) -> Verdict {
        self.update_at(condition, cycle_minutes, Local::now().time())
    }

    pub fn update_at(
        &mut self,
        condition: SkyCondition,
        cycle_minutes: u32,
        captured_at: NaiveTime,
    ) -> Verdict {
        let state = &mut self.state;

        let decision = match condition {
            SkyCondition::Clear => {
                state.cloudy_accumulated_minutes = 0;
                state.covered_accumulated_minutes = 0;
                state.is_safe = true;
                "Clear: GO"
            }
            SkyCondition::Cloudy => {
                state.cloudy_accumulated_minutes =
                    state.cloudy_accumulated_minutes.saturating_add(cycle_minutes);
                state.covered_accumulated_minutes = 0;
                state.is_safe = state.cloudy_accumulated_minutes <= self.cloudy_tolerance;
                if state.is_safe {
                    "Cloudy: PAUSE (in tolerance)"
                } else {
                    "Cloudy: STOP (tolerance exceeded)"
                }
            }
            SkyCondition::Covered => {
                state.cloudy_accumulated_minutes =
                    state.cloudy_accumulated_minutes.saturating_add(cycle_minutes);
                state.covered_accumulated_minutes =
                    state.covered_accumulated_minutes.saturating_add(cycle_minutes);
                state.is_safe = state.covered_accumulated_minutes <= self.covered_tolerance
                    && state.cloudy_accumulated_minutes <= self.cloudy_tolerance;
                if state.is_safe {
                    "Covered: PAUSE (in tolerance)"
                } else {
                    "Covered: STOP (tolerance exceeded)"
                }
            }
            SkyCondition::Rainy => {
                state.is_safe = false;
                "Rainy: STOP"
            }
        };

        state.status_message = format_status(captured_at, decision);
        self.log.log("UpdateSafetyState", &state.status_message);

        state.verdict()
    }
}

/// "HH:MM:SS - {decision}"
pub fn format_status(captured_at: NaiveTime, decision: &str) -> String {
    format!("{} - {}", captured_at.format("%H:%M:%S"), decision)
}
