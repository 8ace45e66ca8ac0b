// Player statistics derived from finished games: participations,
// captaincies, level progression, achievements, and the club ranking.

use serde::{Deserialize, Serialize};

use crate::model::{Attributes, Game, Player, PlayerId, Role};

/// Participations needed to gain a level.
pub const GAMES_PER_LEVEL: u32 = 5;
pub const XP_PER_LEVEL: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub participations: u32,
    pub captaincies: u32,
    pub goals: u32,
    pub level: u32,
    /// Progress towards the next level, out of [`XP_PER_LEVEL`].
    pub xp: u32,
}

impl PlayerStats {
    pub fn compute(player: &Player, games: &[Game<PlayerId>]) -> Self {
        let finished = games.iter().filter(|g| g.is_finished());
        let (participations, captaincies) =
            finished.fold((0u32, 0u32), |(played, captained), g| {
                (
                    played + u32::from(g.drawn_players.contains(&player.id)),
                    captained + u32::from(g.captains.contains(&player.id)),
                )
            });

        PlayerStats {
            participations,
            captaincies,
            goals: player.goals,
            level: participations / GAMES_PER_LEVEL + 1,
            xp: (participations % GAMES_PER_LEVEL) * (XP_PER_LEVEL / GAMES_PER_LEVEL),
        }
    }

    pub fn metric(&self, metric: RankingMetric) -> u32 {
        match metric {
            RankingMetric::Participations => self.participations,
            RankingMetric::Goals => self.goals,
            RankingMetric::Captaincies => self.captaincies,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    /// Played a first game.
    FirstGame,
    /// 50 games or more.
    Veteran,
    /// Scored 20 goals or more.
    TopScorer,
    /// Captain five times or more.
    #[serde(alias = "captain")]
    NaturalCaptain,
}

impl Achievement {
    pub fn title(&self) -> &'static str {
        match self {
            Achievement::FirstGame => "Rookie",
            Achievement::Veteran => "Veteran",
            Achievement::TopScorer => "Top Scorer",
            Achievement::NaturalCaptain => "Natural Captain",
        }
    }
}

pub fn achievements(stats: &PlayerStats) -> Vec<Achievement> {
    let mut unlocked = Vec::new();
    if stats.participations >= 1 {
        unlocked.push(Achievement::FirstGame);
    }
    if stats.participations >= 50 {
        unlocked.push(Achievement::Veteran);
    }
    if stats.goals >= 20 {
        unlocked.push(Achievement::TopScorer);
    }
    if stats.captaincies >= 5 {
        unlocked.push(Achievement::NaturalCaptain);
    }
    unlocked
}

/// Achievements shown on a profile: earned ones first, then any granted by
/// hand that were not earned.
pub fn profile_achievements(player: &Player, stats: &PlayerStats) -> Vec<Achievement> {
    let mut unlocked = achievements(stats);
    for granted in &player.achievements {
        if !unlocked.contains(granted) {
            unlocked.push(*granted);
        }
    }
    unlocked
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementBadge {
    pub achievement: Achievement,
    pub title: String,
}

impl From<Achievement> for AchievementBadge {
    fn from(achievement: Achievement) -> Self {
        AchievementBadge {
            achievement,
            title: achievement.title().to_string(),
        }
    }
}

/// Everything the profile screen shows about one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: PlayerId,
    pub nickname: String,
    pub stats: PlayerStats,
    pub achievements: Vec<AchievementBadge>,
    pub rating: Option<f64>,
    pub attributes: Attributes,
}

impl PlayerProfile {
    pub fn build(player: &Player, games: &[Game<PlayerId>]) -> Self {
        let stats = PlayerStats::compute(player, games);
        PlayerProfile {
            player_id: player.id.clone(),
            nickname: player.nickname.clone(),
            stats,
            achievements: profile_achievements(player, &stats)
                .into_iter()
                .map(AchievementBadge::from)
                .collect(),
            rating: player.rating(),
            attributes: player.attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    #[default]
    Participations,
    Goals,
    Captaincies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub player_id: PlayerId,
    pub nickname: String,
    pub stats: PlayerStats,
}

/// Members ranked by `metric`, highest first, nickname as tiebreaker.
/// Admins and guests are left out.
pub fn ranking(
    players: &[Player],
    games: &[Game<PlayerId>],
    metric: RankingMetric,
) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = players
        .iter()
        .filter(|p| p.role == Role::Member)
        .map(|p| RankingEntry {
            player_id: p.id.clone(),
            nickname: p.nickname.clone(),
            stats: PlayerStats::compute(p, games),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.stats
            .metric(metric)
            .cmp(&a.stats.metric(metric))
            .then_with(|| a.nickname.cmp(&b.nickname))
    });
    entries
}
