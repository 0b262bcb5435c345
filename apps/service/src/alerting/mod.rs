/// Alert rules, cooldowns and the engine that ties them to stored checks
pub mod cooldown;
pub mod engine;
pub mod rules;

pub use engine::AlertEngine;
pub use rules::{Alert, AlertRule, RuleCondition, Severity};
