//! Engine configuration and preset classification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusyConfig {
    pub num_busy_threads: u32,
    pub period_ms: f64,
    pub cpu_usage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub num_processing_threads: u32,
    pub process_in_driver_thread: bool,
    pub is_work_interval_on: bool,
    pub minimum_load: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub busy: BusyConfig,
    pub audio: AudioConfig,
}

/// Which named preset, if any, a configuration matches. Equality on the
/// full configuration determines this; any other value is `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetLabel {
    Standard,
    Optimal,
    Custom,
}

pub fn standard_preset() -> EngineConfig {
    EngineConfig {
        busy: BusyConfig {
            num_busy_threads: 0,
            period_ms: 35.0,
            cpu_usage: 0.5,
        },
        audio: AudioConfig {
            num_processing_threads: 2,
            process_in_driver_thread: true,
            is_work_interval_on: true,
            minimum_load: 0.0,
        },
    }
}

pub fn optimal_preset() -> EngineConfig {
    EngineConfig {
        busy: BusyConfig {
            num_busy_threads: 1,
            period_ms: 35.0,
            cpu_usage: 0.5,
        },
        audio: AudioConfig {
            num_processing_threads: 2,
            process_in_driver_thread: false,
            is_work_interval_on: false,
            minimum_load: 0.0,
        },
    }
}

pub fn classify(config: &EngineConfig) -> PresetLabel {
    if *config == standard_preset() {
        PresetLabel::Standard
    } else if *config == optimal_preset() {
        PresetLabel::Optimal
    } else {
        PresetLabel::Custom
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        standard_preset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_preset_classifies_as_standard() {
        assert_eq!(classify(&standard_preset()), PresetLabel::Standard);
    }

    #[test]
    fn optimal_preset_classifies_as_optimal() {
        assert_eq!(classify(&optimal_preset()), PresetLabel::Optimal);
    }

    #[test]
    fn any_deviation_classifies_as_custom() {
        let mut custom = standard_preset();
        custom.audio.minimum_load = 0.25;
        assert_eq!(classify(&custom), PresetLabel::Custom);
    }
}
