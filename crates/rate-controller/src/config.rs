use std::time::Duration;

/// Named default bundles for the tunable factors below. Individual overrides
/// on [`RateControllerConfigBuilder`] always beat whatever the preset set, and
/// the builder remembers which fields were explicitly overridden so a host can
/// log "Balanced, with decrease_factor overridden to 0.4" faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Preset {
    Conservative,
    Balanced,
    Aggressive,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PresetDefaults {
    pub exec_time_factor: f64,
    pub request_rate_factor: f64,
    pub decrease_factor: f64,
    pub stabilization: u32,
    pub min_increase_interval: Duration,
    pub aggressive_recovery_ramp: bool,
}

impl Preset {
    pub(crate) fn defaults(self) -> PresetDefaults {
        match self {
            Preset::Conservative => PresetDefaults {
                exec_time_factor: 6.0,
                request_rate_factor: 10.0,
                decrease_factor: 0.4,
                stabilization: 10,
                min_increase_interval: Duration::from_secs(5),
                aggressive_recovery_ramp: false,
            },
            Preset::Balanced => PresetDefaults {
                exec_time_factor: 10.0,
                request_rate_factor: 15.0,
                decrease_factor: 0.5,
                stabilization: 5,
                min_increase_interval: Duration::from_secs(2),
                aggressive_recovery_ramp: true,
            },
            Preset::Aggressive => PresetDefaults {
                exec_time_factor: 15.0,
                request_rate_factor: 20.0,
                decrease_factor: 0.6,
                stabilization: 3,
                min_increase_interval: Duration::from_secs(1),
                aggressive_recovery_ramp: true,
            },
        }
    }
}

/// Fixed constants from the base specification, not tunable per-preset.
pub(crate) mod constants {
    use std::time::Duration;

    pub const HARD_CAP_PER_CONNECTION: usize = 52;
    pub const INITIAL_CEILING_FACTOR: usize = 20;
    pub const INITIAL_CEILING_SAMPLE_THRESHOLD: u64 = 3;
    pub const INCREASE_RATE: usize = 2;
    pub const RECOVERY_MULTIPLIER: f64 = 2.0;
    pub const SUCCESSFUL_BATCHES_THRESHOLD: u64 = 30;
    pub const HARD_RATE_CAP_PER_SEC: f64 = 18.0;
    pub const MEASUREMENT_ARTIFACT_RATE_PER_SEC: f64 = 100.0;
    pub const EMA_ALPHA: f64 = 0.3;
    pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);
    pub const RECOVERY_COOLDOWN: Duration = Duration::from_secs(30);
    pub const IDLE_RESET: Duration = Duration::from_secs(5 * 60);
    pub const THROTTLE_CEILING_GRACE: Duration = Duration::from_secs(5 * 60);
    pub const LAST_KNOWN_GOOD_TTL: Duration = Duration::from_secs(5 * 60);
    pub const RETRY_AFTER_NORMALIZATION_WINDOW_SECS: f64 = 300.0;
}

/// Configuration for a [`crate::RateController`]. With the `serde` feature
/// enabled this is itself the plain-data twin a host can load from file or
/// env, since every field is already `Copy`-friendly scalar data.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateControllerConfig {
    pub(crate) min_parallelism: usize,
    pub(crate) exec_time_factor: f64,
    pub(crate) request_rate_factor: f64,
    pub(crate) decrease_factor: f64,
    pub(crate) stabilization: u32,
    pub(crate) min_increase_interval: Duration,
    pub(crate) aggressive_recovery_ramp: bool,
    pub(crate) preset: Option<Preset>,
    pub(crate) overridden_fields: Vec<&'static str>,
}

impl RateControllerConfig {
    pub fn builder() -> RateControllerConfigBuilder {
        RateControllerConfigBuilder::new()
    }

    /// Which preset (if any) this configuration started from.
    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    /// Field names explicitly overridden after the preset was applied, so a
    /// host can log "Balanced with decrease_factor overridden" faithfully.
    pub fn overridden_fields(&self) -> &[&'static str] {
        &self.overridden_fields
    }
}

/// Builder for [`RateControllerConfig`].
pub struct RateControllerConfigBuilder {
    min_parallelism: usize,
    exec_time_factor: f64,
    request_rate_factor: f64,
    decrease_factor: f64,
    stabilization: u32,
    min_increase_interval: Duration,
    aggressive_recovery_ramp: bool,
    preset: Option<Preset>,
    overridden_fields: Vec<&'static str>,
}

impl Default for RateControllerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateControllerConfigBuilder {
    /// Creates a builder seeded with the `Balanced` preset's defaults.
    pub fn new() -> Self {
        Self::from_preset(Preset::Balanced)
    }

    /// Seeds the builder from a named preset. Subsequent setter calls are
    /// tracked as overrides of that preset.
    pub fn from_preset(preset: Preset) -> Self {
        let defaults = preset.defaults();
        Self {
            min_parallelism: 1,
            exec_time_factor: defaults.exec_time_factor,
            request_rate_factor: defaults.request_rate_factor,
            decrease_factor: defaults.decrease_factor,
            stabilization: defaults.stabilization,
            min_increase_interval: defaults.min_increase_interval,
            aggressive_recovery_ramp: defaults.aggressive_recovery_ramp,
            preset: Some(preset),
            overridden_fields: Vec::new(),
        }
    }

    pub fn min_parallelism(mut self, value: usize) -> Self {
        self.min_parallelism = value;
        self.overridden_fields.push("min_parallelism");
        self
    }

    pub fn exec_time_factor(mut self, value: f64) -> Self {
        self.exec_time_factor = value;
        self.overridden_fields.push("exec_time_factor");
        self
    }

    pub fn request_rate_factor(mut self, value: f64) -> Self {
        self.request_rate_factor = value;
        self.overridden_fields.push("request_rate_factor");
        self
    }

    pub fn decrease_factor(mut self, value: f64) -> Self {
        self.decrease_factor = value;
        self.overridden_fields.push("decrease_factor");
        self
    }

    pub fn stabilization(mut self, value: u32) -> Self {
        self.stabilization = value;
        self.overridden_fields.push("stabilization");
        self
    }

    pub fn min_increase_interval(mut self, value: Duration) -> Self {
        self.min_increase_interval = value;
        self.overridden_fields.push("min_increase_interval");
        self
    }

    pub fn aggressive_recovery_ramp(mut self, value: bool) -> Self {
        self.aggressive_recovery_ramp = value;
        self.overridden_fields.push("aggressive_recovery_ramp");
        self
    }

    pub fn build(self) -> RateControllerConfig {
        RateControllerConfig {
            min_parallelism: self.min_parallelism,
            exec_time_factor: self.exec_time_factor,
            request_rate_factor: self.request_rate_factor,
            decrease_factor: self.decrease_factor,
            stabilization: self.stabilization,
            min_increase_interval: self.min_increase_interval,
            aggressive_recovery_ramp: self.aggressive_recovery_ramp,
            preset: self.preset,
            overridden_fields: self.overridden_fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_is_the_default() {
        let config = RateControllerConfig::builder().build();
        assert_eq!(config.preset(), Some(Preset::Balanced));
        assert!(config.overridden_fields().is_empty());
    }

    #[test]
    fn overrides_are_tracked_alongside_the_preset() {
        let config = RateControllerConfigBuilder::from_preset(Preset::Conservative)
            .decrease_factor(0.35)
            .build();
        assert_eq!(config.preset(), Some(Preset::Conservative));
        assert_eq!(config.overridden_fields(), &["decrease_factor"]);
        assert!((config.decrease_factor - 0.35).abs() < f64::EPSILON);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_round_trips_through_serde_json() {
        let config = RateControllerConfigBuilder::from_preset(Preset::Aggressive)
            .decrease_factor(0.45)
            .build();
        let json = serde_json::to_string(&config).expect("serialize");
        let restored: RateControllerConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.preset(), Some(Preset::Aggressive));
        assert!((restored.decrease_factor - 0.45).abs() < f64::EPSILON);
    }
}
