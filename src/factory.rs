//! Mode selection

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ConditionerConfig;
use crate::engine::Conditioner;
use crate::error::Result;
use crate::strategy::{
    ConstantStrategy, HybridStrategy, LadderAscendStrategy, LogarithmicDescendStrategy, Strategy,
};
use crate::types::ConditionerMode;

/// Descriptive metadata for one mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeInfo {
    pub code: i32,
    pub name: &'static str,
    pub description: &'static str,
}

pub struct ConditionerFactory;

impl ConditionerFactory {
    /// Fresh conditioner with the default configuration
    pub fn create(mode: ConditionerMode) -> Conditioner {
        Self::create_with_config(mode, ConditionerConfig::default())
    }

    pub fn create_with_config(mode: ConditionerMode, config: ConditionerConfig) -> Conditioner {
        debug!(%mode, "Creating conditioner");
        Conditioner::new(Self::strategy_for(mode), config)
    }

    /// Like [`create_with_config`](Self::create_with_config), but rejects an
    /// invalid configuration instead of clamping against it.
    pub fn try_create_with_config(
        mode: ConditionerMode,
        config: ConditionerConfig,
    ) -> Result<Conditioner> {
        config.validate()?;
        Ok(Self::create_with_config(mode, config))
    }

    /// Resolve a raw selector code. Codes outside 0-3 fall back to Constant.
    pub fn create_from_code(code: i32) -> Conditioner {
        let mode = match ConditionerMode::try_from_value(code) {
            Some(mode) => mode,
            None => {
                warn!(code, "Unknown conditioner mode code, using constant");
                ConditionerMode::Constant
            }
        };
        Self::create(mode)
    }

    pub fn strategy_for(mode: ConditionerMode) -> Box<dyn Strategy> {
        match mode {
            ConditionerMode::LogarithmicDescend => Box::new(LogarithmicDescendStrategy::new()),
            ConditionerMode::LadderAscend => Box::new(LadderAscendStrategy::new()),
            ConditionerMode::Hybrid => Box::new(HybridStrategy::new()),
            ConditionerMode::Constant => Box::new(ConstantStrategy::new()),
        }
    }

    pub fn describe(mode: ConditionerMode) -> &'static str {
        match mode {
            ConditionerMode::LogarithmicDescend => concat!(
                "Cuts bitrate by 30% on poor or critical networks ",
                "and recovers 10% at a time once stable"
            ),
            ConditionerMode::LadderAscend => {
                "Moves along six fixed quality rungs, climbing one rung after 15s of stability"
            }
            ConditionerMode::Hybrid => {
                "Learns the network for 30s, then adapts as conservative, aggressive or balanced"
            }
            ConditionerMode::Constant => {
                "Holds bitrate and frame rate fixed; only forced changes apply"
            }
        }
    }

    pub fn supported_modes() -> &'static [ConditionerMode] {
        &ConditionerMode::ALL
    }

    pub fn mode_info() -> Vec<ModeInfo> {
        Self::supported_modes()
            .iter()
            .map(|&mode| ModeInfo {
                code: mode.value(),
                name: mode.name(),
                description: Self::describe(mode),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioner::StreamConditioner;
    use crate::error::ConfigError;

    #[test]
    fn test_code_round_trip() {
        for code in 0..4 {
            assert_eq!(ConditionerFactory::create_from_code(code).mode().value(), code);
        }
        for code in [-1, 4, 99, i32::MIN] {
            assert_eq!(ConditionerFactory::create_from_code(code).mode().value(), 3);
        }
    }

    #[test]
    fn test_mode_info_covers_every_mode() {
        let info = ConditionerFactory::mode_info();
        assert_eq!(info.len(), 4);
        assert_eq!(info[1].name, "ladder-ascend");
        assert!(info.iter().all(|i| !i.description.is_empty()));
    }

    #[test]
    fn test_try_create_rejects_invalid_config() {
        let config = ConditionerConfig {
            min_bitrate: 5_000_000,
            max_bitrate: 1_000_000,
            ..ConditionerConfig::default()
        };
        let result = ConditionerFactory::try_create_with_config(ConditionerMode::Hybrid, config);
        assert!(matches!(
            result,
            Err(crate::error::ConditionerError::Config(ConfigError::Invalid(_)))
        ));

        let conditioner = ConditionerFactory::try_create_with_config(
            ConditionerMode::LadderAscend,
            ConditionerConfig::default(),
        )
        .unwrap();
        assert_eq!(conditioner.mode(), ConditionerMode::LadderAscend);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = ConditionerFactory::create(ConditionerMode::Hybrid);
        let b = ConditionerFactory::create(ConditionerMode::Hybrid);
        assert!(!a.is_active());
        assert!(!b.is_active());
        assert_eq!(a.hybrid_mode(), Some(crate::strategy::HybridMode::Learning));
        assert_eq!(b.ladder_level(), None);
    }
}
