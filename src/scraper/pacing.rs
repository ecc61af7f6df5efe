use crate::config::{DelayRange, PacingConfig};
use rand::Rng;
use std::time::Duration;

/// Moments in a session where a human would pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceStep {
    Keystroke,
    BetweenFields,
    BeforeSubmit,
    AfterConsent,
    AfterLogin,
    AfterNavigation,
}

pub trait PacingPolicy: Send + Sync {
    fn next_delay(&self, step: PaceStep) -> Duration;
}

/// Uniformly random delays drawn from the configured ranges.
#[derive(Debug, Clone)]
pub struct RandomPacing {
    config: PacingConfig,
}

impl RandomPacing {
    pub fn new(config: &PacingConfig) -> Self {
        Self { config: config.clone() }
    }

    fn range(&self, step: PaceStep) -> DelayRange {
        match step {
            PaceStep::Keystroke => self.config.keystroke,
            PaceStep::BetweenFields => self.config.between_fields,
            PaceStep::BeforeSubmit => self.config.before_submit,
            PaceStep::AfterConsent => self.config.after_consent,
            PaceStep::AfterLogin => self.config.after_login,
            PaceStep::AfterNavigation => self.config.after_navigation,
        }
    }
}

impl PacingPolicy for RandomPacing {
    fn next_delay(&self, step: PaceStep) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }
        let DelayRange { min_ms, max_ms } = self.range(step);
        let ms = if max_ms <= min_ms {
            min_ms
        } else {
            rand::thread_rng().gen_range(min_ms..=max_ms)
        };
        Duration::from_millis(ms)
    }
}

/// Never waits.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

#[cfg(test)]
impl PacingPolicy for NoPacing {
    fn next_delay(&self, _step: PaceStep) -> Duration {
        Duration::ZERO
    }
}
