use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::{Game, GamePhase};
use crate::player::PlayerId;
use crate::role::Team;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Victory {
    Village,
    Werewolves,
    /// The linked pair are the last two standing.
    Lovers,
}

impl fmt::Display for Victory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Victory::Village => write!(f, "The village"),
            Victory::Werewolves => write!(f, "The werewolves"),
            Victory::Lovers => write!(f, "The lovers"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinReport {
    pub victory: Victory,
    pub survivors: Vec<PlayerId>,
    /// Surviving members of the winning side.
    pub winners: Vec<PlayerId>,
}

/// Which side has won, if any. The linked-pair win takes precedence over both teams.
pub fn evaluate(game: &Game) -> Option<Victory> {
    let living: Vec<_> = game.living().collect();

    if let ([a, b], Some(link)) = (living.as_slice(), game.link) {
        if link == (a.id, b.id) || link == (b.id, a.id) {
            return Some(Victory::Lovers);
        }
    }

    let wolves = living.iter().filter(|p| p.role.is_werewolf()).count();
    if wolves == 0 {
        return Some(Victory::Village);
    }
    if wolves >= living.len() - wolves {
        return Some(Victory::Werewolves);
    }
    None
}

impl Game {
    /// Run the victory check after a death. Ends the game the first time a side wins; once an
    /// outcome is recorded further calls report nothing.
    pub fn check_victory(&mut self) -> Option<WinReport> {
        if self.outcome.is_some() {
            return None;
        }
        let victory = evaluate(self)?;
        let survivors: Vec<PlayerId> = self.living().map(|p| p.id).collect();
        let winners = self
            .living()
            .filter(|p| match victory {
                Victory::Village => p.role.team() == Team::Village,
                Victory::Werewolves => p.role.team() == Team::Werewolf,
                Victory::Lovers => true,
            })
            .map(|p| p.id)
            .collect();

        self.outcome = Some(victory);
        self.phase = GamePhase::GameOver;
        tracing::info!(session = %self.id, %victory, "game decided");
        Some(WinReport {
            victory,
            survivors,
            winners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::game_with;
    use crate::night::DeathCause;
    use crate::role::Role;

    #[test]
    fn no_winner_while_village_outnumbers_wolves() {
        let mut game = game_with(&[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer]);
        assert_eq!(evaluate(&game), None);
        assert_eq!(game.check_victory(), None);
        assert_eq!(game.outcome, None);
    }

    #[test]
    fn village_wins_when_last_wolf_dies() {
        let mut game = game_with(&[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer]);
        game.kill(PlayerId(1), DeathCause::Lynch);
        let report = game.check_victory().unwrap();
        assert_eq!(report.victory, Victory::Village);
        assert_eq!(report.winners, vec![PlayerId(2), PlayerId(3), PlayerId(4)]);
        assert_eq!(game.phase, GamePhase::GameOver);
    }

    #[test]
    fn wolves_win_at_parity() {
        let mut game = game_with(&[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer]);
        game.kill(PlayerId(2), DeathCause::Werewolves);
        assert_eq!(evaluate(&game), None);
        game.kill(PlayerId(3), DeathCause::Lynch);
        let report = game.check_victory().unwrap();
        assert_eq!(report.victory, Victory::Werewolves);
        assert_eq!(report.winners, vec![PlayerId(1)]);
        assert_eq!(report.survivors, vec![PlayerId(1), PlayerId(4)]);
    }

    #[test]
    fn linked_pair_overrides_team_wins() {
        let mut game = game_with(&[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer]);
        game.link = Some((PlayerId(4), PlayerId(1)));
        game.kill(PlayerId(2), DeathCause::Werewolves);
        game.kill(PlayerId(3), DeathCause::Lynch);
        let report = game.check_victory().unwrap();
        assert_eq!(report.victory, Victory::Lovers);
        assert_eq!(report.winners, vec![PlayerId(1), PlayerId(4)]);
    }

    #[test]
    fn fires_at_most_once() {
        let mut game = game_with(&[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer]);
        game.kill(PlayerId(1), DeathCause::Lynch);
        assert!(game.check_victory().is_some());
        game.kill(PlayerId(2), DeathCause::Lynch);
        assert!(game.check_victory().is_none());
        assert_eq!(game.outcome, Some(Victory::Village));
    }
}
