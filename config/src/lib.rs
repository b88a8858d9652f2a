//! Fusion configuration.
//!
//! ```toml
//! collectible_name = "countryball"
//! max_level = 2
//!
//! [[levels]]
//! required = 10
//! result_tier = 1
//!
//! [[levels]]
//! required = 5
//! result_tier = 2
//!
//! [timing]
//! refresh_interval_secs = 15
//! session_lifetime_secs = 600
//!
//! [rewards]
//! xp_per_level = 50
//! ```
//!
//! Levels are 1-indexed: the N-th `[[levels]]` entry is the rule for level N,
//! and level N consumes items carrying the result tier of level N-1.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

use fusion_types::{InvalidLevel, Level, TierId};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "FUSION_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid fusion config: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Per-level fusion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LevelRule {
    /// Exact number of items a proposal must hold to lock.
    pub required: usize,
    /// Tier marker stamped on the item this level produces.
    pub result_tier: TierId,
}

/// Everything a session needs to know about its level, resolved once at `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPlan {
    pub level: Level,
    pub required: usize,
    pub result_tier: TierId,
    /// Marker every input must carry; `None` for the first level.
    pub input_tier: Option<TierId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub refresh_interval_secs: u64,
    pub session_lifetime_secs: u64,
    pub selection_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15,
            session_lifetime_secs: 600,
            selection_timeout_secs: 600,
            confirmation_timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Experience awarded per level number on a successful fusion.
    pub xp_per_level: u64,
    /// A fused item is shiny with probability `1 / shiny_odds`.
    pub shiny_odds: u32,
    /// Attack and health bonuses are drawn from `-bonus_range..=bonus_range`.
    pub bonus_range: i32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            xp_per_level: 50,
            shiny_odds: 4096,
            bonus_range: 40,
        }
    }
}

fn default_collectible_name() -> String {
    "countryball".to_string()
}

fn default_levels() -> Vec<LevelRule> {
    vec![LevelRule {
        required: 10,
        result_tier: TierId::new(1),
    }]
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FusionConfig {
    /// Cosmetic name used in user-facing text.
    #[serde(default = "default_collectible_name")]
    pub collectible_name: String,
    #[serde(default)]
    max_level: Option<u32>,
    #[serde(default = "default_levels")]
    levels: Vec<LevelRule>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub rewards: RewardConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            collectible_name: default_collectible_name(),
            max_level: None,
            levels: default_levels(),
            timing: TimingConfig::default(),
            rewards: RewardConfig::default(),
        }
    }
}

impl FusionConfig {
    /// Build a config from explicit level rules (used by embedders and tests).
    pub fn with_levels(levels: Vec<LevelRule>) -> Result<Self, ConfigError> {
        let config = Self {
            levels,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `FUSION_CONFIG` or `~/.fusion/config.toml`.
    ///
    /// A missing file is not an error; the built-in defaults are used instead.
    pub fn load() -> Result<Self, ConfigError> {
        let Some(path) = config_path() else {
            tracing::debug!("No home directory; using default fusion config");
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No fusion config file; using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content, path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.levels.is_empty() {
            return Err(ConfigError::invalid("at least one [[levels]] entry is required"));
        }
        if let Some(position) = self.levels.iter().position(|rule| rule.required == 0) {
            return Err(ConfigError::invalid(format!(
                "level {} requires zero items",
                position + 1
            )));
        }
        let defined = u32::try_from(self.levels.len()).unwrap_or(u32::MAX);
        if let Some(max) = self.max_level
            && (max == 0 || max > defined)
        {
            return Err(ConfigError::invalid(format!(
                "max_level {max} must be between 1 and {defined}"
            )));
        }
        let timing = &self.timing;
        if timing.refresh_interval_secs == 0 {
            return Err(ConfigError::invalid("refresh_interval_secs must be at least 1"));
        }
        if timing.session_lifetime_secs < timing.refresh_interval_secs {
            return Err(ConfigError::invalid(
                "session_lifetime_secs must not be shorter than refresh_interval_secs",
            ));
        }
        if self.rewards.shiny_odds == 0 {
            return Err(ConfigError::invalid("shiny_odds must be at least 1"));
        }
        if self.rewards.bonus_range < 0 {
            return Err(ConfigError::invalid("bonus_range must not be negative"));
        }
        Ok(())
    }

    /// Highest level a session may request.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.max_level
            .unwrap_or_else(|| u32::try_from(self.levels.len()).unwrap_or(u32::MAX))
    }

    pub fn level(&self, requested: i64) -> Result<Level, InvalidLevel> {
        Level::new(requested, self.max_level())
    }

    #[must_use]
    pub fn rule(&self, level: Level) -> Option<LevelRule> {
        if level.get() > self.max_level() {
            return None;
        }
        self.levels.get(level.index()).copied()
    }

    /// Items a session at `level` must lock.
    #[must_use]
    pub fn required_count(&self, level: Level) -> Option<usize> {
        self.rule(level).map(|rule| rule.required)
    }

    #[must_use]
    pub fn result_tier(&self, level: Level) -> Option<TierId> {
        self.rule(level).map(|rule| rule.result_tier)
    }

    /// Tier marker inputs must carry; `None` for the first level.
    #[must_use]
    pub fn previous_tier(&self, level: Level) -> Option<TierId> {
        level
            .previous()
            .and_then(|previous| self.result_tier(previous))
    }

    /// Every level a session may request, in order.
    pub fn plans(&self) -> impl Iterator<Item = LevelPlan> + '_ {
        (1..=i64::from(self.max_level())).filter_map(|level| self.plan(level).ok())
    }

    /// Resolve the rule, output tier and input tier for a requested level.
    pub fn plan(&self, requested: i64) -> Result<LevelPlan, InvalidLevel> {
        let level = self.level(requested)?;
        let rule = self.rule(level).ok_or(InvalidLevel {
            requested,
            max: self.max_level(),
        })?;
        Ok(LevelPlan {
            level,
            required: rule.required,
            result_tier: rule.result_tier,
            input_tier: self.previous_tier(level),
        })
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.timing.refresh_interval_secs)
    }

    #[must_use]
    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.timing.session_lifetime_secs)
    }

    #[must_use]
    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.selection_timeout_secs)
    }

    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.confirmation_timeout_secs)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = env::var(CONFIG_ENV_VAR)
        && !explicit.trim().is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".fusion").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LEVELS: &str = r#"
collectible_name = "planetball"

[[levels]]
required = 10
result_tier = 11

[[levels]]
required = 5
result_tier = 12

[timing]
refresh_interval_secs = 5
session_lifetime_secs = 50
"#;

    #[test]
    fn defaults_have_one_level_of_ten() {
        let config = FusionConfig::default();
        assert_eq!(config.max_level(), 1);
        let plan = config.plan(1).unwrap();
        assert_eq!(plan.required, 10);
        assert_eq!(plan.result_tier, TierId::new(1));
        assert_eq!(plan.input_tier, None);
        assert_eq!(config.refresh_interval(), Duration::from_secs(15));
        assert_eq!(config.session_lifetime(), Duration::from_secs(600));
        assert_eq!(config.rewards.xp_per_level, 50);
    }

    #[test]
    fn parses_levels_and_partial_timing() {
        let config = FusionConfig::from_toml_str(TWO_LEVELS).unwrap();
        assert_eq!(config.collectible_name, "planetball");
        assert_eq!(config.max_level(), 2);
        assert_eq!(config.timing.refresh_interval_secs, 5);
        assert_eq!(config.timing.confirmation_timeout_secs, 90);

        let second = config.plan(2).unwrap();
        assert_eq!(second.required, 5);
        assert_eq!(second.result_tier, TierId::new(12));
        assert_eq!(second.input_tier, Some(TierId::new(11)));
    }

    #[test]
    fn plan_rejects_levels_outside_range() {
        let config = FusionConfig::from_toml_str(TWO_LEVELS).unwrap();
        assert_eq!(
            config.plan(3).unwrap_err(),
            InvalidLevel {
                requested: 3,
                max: 2
            }
        );
        assert!(config.plan(0).is_err());
    }

    #[test]
    fn second_level_takes_first_level_output() {
        let config = FusionConfig::from_toml_str(TWO_LEVELS).unwrap();
        let first = config.level(1).unwrap();
        let second = config.level(2).unwrap();
        assert_eq!(config.previous_tier(first), None);
        assert_eq!(config.previous_tier(second), Some(TierId::new(11)));
        assert_eq!(config.required_count(second), Some(5));
        assert_eq!(config.result_tier(second), Some(TierId::new(12)));

        let plans: Vec<_> = config.plans().collect();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].input_tier, Some(TierId::new(11)));
    }

    #[test]
    fn max_level_caps_defined_levels() {
        let content = format!("max_level = 1\n{TWO_LEVELS}");
        let config = FusionConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.max_level(), 1);
        assert!(config.plan(2).is_err());
    }

    #[test]
    fn max_level_beyond_defined_levels_is_invalid() {
        let content = format!("max_level = 3\n{TWO_LEVELS}");
        let err = FusionConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "{err}");
    }

    #[test]
    fn zero_required_is_invalid() {
        let err = FusionConfig::from_toml_str("[[levels]]\nrequired = 0\nresult_tier = 1\n")
            .unwrap_err();
        assert!(err.to_string().contains("requires zero items"));
    }

    #[test]
    fn lifetime_shorter_than_interval_is_invalid() {
        let err = FusionConfig::from_toml_str(
            "[timing]\nrefresh_interval_secs = 30\nsession_lifetime_secs = 10\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "levels = [[[").unwrap();
        let err = FusionConfig::load_from(&path).unwrap_err();
        match err {
            ConfigError::Parse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FusionConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, TWO_LEVELS).unwrap();
        let config = FusionConfig::load_from(&path).unwrap();
        assert_eq!(config.max_level(), 2);
    }
}
