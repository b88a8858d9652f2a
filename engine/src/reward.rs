//! Random attributes of a freshly fused item.

use fusion_config::RewardConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardRoll {
    pub shiny: bool,
    pub attack_bonus: i32,
    pub health_bonus: i32,
}

pub trait RewardRoller: Send + Sync {
    fn roll(&self, rewards: &RewardConfig) -> RewardRoll;
}

/// Thread-local RNG draws: shiny with `1 / shiny_odds`, bonuses uniform in
/// `-bonus_range..=bonus_range`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRoller;

impl RewardRoller for RandomRoller {
    fn roll(&self, rewards: &RewardConfig) -> RewardRoll {
        let odds = rewards.shiny_odds.max(1);
        let range = rewards.bonus_range.max(0);
        RewardRoll {
            shiny: rand::random_range(1..=odds) == 1,
            attack_bonus: rand::random_range(-range..=range),
            health_bonus: rand::random_range(-range..=range),
        }
    }
}

/// Always returns the same roll.
#[derive(Debug, Clone, Copy)]
pub struct FixedRoller(pub RewardRoll);

impl RewardRoller for FixedRoller {
    fn roll(&self, _rewards: &RewardConfig) -> RewardRoll {
        self.0
    }
}
