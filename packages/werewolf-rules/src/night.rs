use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::game::Game;
use crate::player::PlayerId;
use crate::role::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NightActionKind {
    Link { first: PlayerId, second: PlayerId },
    Kill { target: PlayerId },
    Protect { target: PlayerId },
    Save { target: PlayerId },
    Inspect { target: PlayerId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightAction {
    pub actor: PlayerId,
    pub kind: NightActionKind,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Werewolves,
    Lynch,
    Hunter,
    Heartbreak,
}

impl DeathCause {
    pub fn reveals_role(self) -> bool {
        match self {
            DeathCause::Werewolves => Role::Werewolf.spec().reveals_victim,
            DeathCause::Hunter => Role::Hunter.spec().reveals_victim,
            DeathCause::Lynch | DeathCause::Heartbreak => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Death {
    pub player: PlayerId,
    pub role: Role,
    pub cause: DeathCause,
    pub revealed: bool,
}

/// Private answer delivered to a seer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    pub seer: PlayerId,
    pub target: PlayerId,
    pub is_werewolf: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightResolution {
    pub linked: Option<(PlayerId, PlayerId)>,
    pub victim: Option<PlayerId>,
    /// Victim who survived because someone protected them.
    pub saved: Option<PlayerId>,
    pub deaths: Vec<Death>,
    pub inspections: Vec<Inspection>,
    /// Newly dead players who still hold a death-triggered ability.
    pub reactive: Vec<PlayerId>,
}

struct NightContext<'a> {
    game: &'a mut Game,
    rng: &'a mut dyn RngCore,
    protected: BTreeSet<PlayerId>,
    report: NightResolution,
}

impl NightContext<'_> {
    /// Submissions from living holders of `role`.
    fn actions_of(&self, role: Role) -> Vec<(PlayerId, NightActionKind)> {
        self.game
            .night_actions
            .values()
            .filter(|a| {
                self.game
                    .player(a.actor)
                    .map_or(false, |p| p.is_alive() && p.role == role)
            })
            .map(|a| (a.actor, a.kind))
            .collect()
    }
}

type AbilityHandler = fn(&mut NightContext<'_>);

const ABILITIES: [(Role, AbilityHandler); 5] = [
    (Role::Seer, inspect),
    (Role::Werewolf, choose_victim),
    (Role::Witch, save),
    (Role::Cupid, link),
    (Role::Guard, protect),
];

fn link(ctx: &mut NightContext<'_>) {
    if ctx.game.link.is_some() {
        return;
    }
    for (cupid, kind) in ctx.actions_of(Role::Cupid) {
        if let NightActionKind::Link { first, second } = kind {
            if let Some(player) = ctx.game.player_mut(cupid) {
                player.ability_spent = true;
            }
            ctx.game.link = Some((first, second));
            ctx.report.linked = Some((first, second));
            return;
        }
    }
}

fn choose_victim(ctx: &mut NightContext<'_>) {
    ctx.report.victim = ctx.game.lock_team_target(&mut *ctx.rng);
}

fn protect(ctx: &mut NightContext<'_>) {
    let actions = ctx.actions_of(Role::Guard);
    for guard in ctx.game.living_with_role(Role::Guard) {
        let target = actions.iter().find_map(|(actor, kind)| match kind {
            NightActionKind::Protect { target } if *actor == guard => Some(*target),
            _ => None,
        });
        if let Some(target) = target {
            ctx.protected.insert(target);
        }
        if let Some(player) = ctx.game.player_mut(guard) {
            player.last_protected = target;
        }
    }
}

fn save(ctx: &mut NightContext<'_>) {
    for (witch, kind) in ctx.actions_of(Role::Witch) {
        if let NightActionKind::Save { target } = kind {
            if ctx.report.victim != Some(target) {
                continue;
            }
            if let Some(player) = ctx.game.player_mut(witch) {
                if player.ability_spent {
                    continue;
                }
                player.ability_spent = true;
            }
            ctx.protected.insert(target);
        }
    }
}

fn inspect(ctx: &mut NightContext<'_>) {
    for (seer, kind) in ctx.actions_of(Role::Seer) {
        if let NightActionKind::Inspect { target } = kind {
            let is_werewolf = ctx
                .game
                .player(target)
                .map_or(false, |p| p.role.is_werewolf());
            ctx.report.inspections.push(Inspection {
                seer,
                target,
                is_werewolf,
            });
        }
    }
}

/// Resolve everything submitted this night, in ascending night priority, then apply deaths.
///
/// Clears the night's action buffer. Reactive abilities are reported, not fired; the caller
/// collects their targets and passes them to [`Game::resolve_reactive`].
pub fn resolve_night(game: &mut Game, rng: &mut dyn RngCore) -> NightResolution {
    let mut order = ABILITIES;
    order.sort_by_key(|(role, _)| role.night_priority());

    let mut ctx = NightContext {
        game,
        rng,
        protected: BTreeSet::new(),
        report: NightResolution::default(),
    };
    for (_, handler) in order {
        handler(&mut ctx);
    }

    if let Some(victim) = ctx.report.victim {
        if ctx.protected.contains(&victim) {
            ctx.report.saved = Some(victim);
        } else {
            let deaths = ctx.game.kill(victim, DeathCause::Werewolves);
            ctx.report.deaths.extend(deaths);
        }
    }

    let NightContext { game, report, .. } = ctx;
    let mut report = report;
    report.reactive = game.pending_reactive(&report.deaths);
    game.night_actions.clear();
    game.team_target = None;

    tracing::debug!(
        night = game.night,
        victim = ?report.victim,
        saved = ?report.saved,
        deaths = report.deaths.len(),
        "night resolved"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::game_with;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn witch_save_keeps_victim_alive() {
        let mut game = game_with(&[Role::Werewolf, Role::Witch, Role::Villager, Role::Villager]);
        game.begin_night();
        let now = Utc::now();
        game.submit_night_action(PlayerId(1), &[PlayerId(3)], now).unwrap();
        assert_eq!(game.lock_team_target(&mut rng()), Some(PlayerId(3)));
        game.submit_night_action(PlayerId(2), &[PlayerId(3)], now).unwrap();

        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report.victim, Some(PlayerId(3)));
        assert_eq!(report.saved, Some(PlayerId(3)));
        assert!(report.deaths.is_empty());
        assert!(game.is_alive(PlayerId(3)));
        assert!(game.player(PlayerId(2)).unwrap().ability_spent);
    }

    #[test]
    fn witch_potion_only_goes_to_the_victim() {
        let mut game = game_with(&[Role::Werewolf, Role::Witch, Role::Villager, Role::Villager]);
        game.begin_night();
        let now = Utc::now();
        game.submit_night_action(PlayerId(1), &[PlayerId(3)], now).unwrap();
        game.lock_team_target(&mut rng());
        assert_eq!(
            game.submit_night_action(PlayerId(2), &[PlayerId(4)], now),
            Err(crate::error::ActionError::ForbiddenTarget(Role::Witch))
        );

        let report = resolve_night(&mut game, &mut rng());
        assert!(!game.is_alive(PlayerId(3)));
        assert_eq!(report.saved, None);
        assert!(!game.player(PlayerId(2)).unwrap().ability_spent);
    }

    #[test]
    fn stray_save_leaves_the_potion_unspent() {
        let mut game = game_with(&[Role::Werewolf, Role::Witch, Role::Villager, Role::Villager]);
        game.begin_night();
        let now = Utc::now();
        // Submitted before the pack locked its target.
        game.submit_night_action(PlayerId(2), &[PlayerId(4)], now).unwrap();
        game.submit_night_action(PlayerId(1), &[PlayerId(3)], now).unwrap();

        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report.victim, Some(PlayerId(3)));
        assert!(!game.is_alive(PlayerId(3)));
        assert!(!game.player(PlayerId(2)).unwrap().ability_spent);
    }

    #[test]
    fn unprotected_victim_dies_and_is_revealed() {
        let mut game = game_with(&[Role::Werewolf, Role::Guard, Role::Villager, Role::Villager]);
        game.begin_night();
        let now = Utc::now();
        game.submit_night_action(PlayerId(1), &[PlayerId(3)], now).unwrap();
        game.submit_night_action(PlayerId(2), &[PlayerId(4)], now).unwrap();

        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report.saved, None);
        assert_eq!(report.deaths.len(), 1);
        assert_eq!(report.deaths[0].player, PlayerId(3));
        assert!(report.deaths[0].revealed);
        assert!(!game.is_alive(PlayerId(3)));
        assert_eq!(
            game.player(PlayerId(2)).unwrap().last_protected,
            Some(PlayerId(4))
        );
        assert!(game.night_actions.is_empty());
    }

    #[test]
    fn guard_protection_blocks_kill() {
        let mut game = game_with(&[Role::Werewolf, Role::Guard, Role::Villager, Role::Villager]);
        game.begin_night();
        let now = Utc::now();
        game.submit_night_action(PlayerId(1), &[PlayerId(4)], now).unwrap();
        game.submit_night_action(PlayerId(2), &[PlayerId(4)], now).unwrap();
        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report.saved, Some(PlayerId(4)));
        assert!(game.is_alive(PlayerId(4)));

        game.begin_night();
        assert_eq!(
            game.submit_night_action(PlayerId(2), &[PlayerId(4)], now),
            Err(crate::error::ActionError::ForbiddenTarget(Role::Guard))
        );
    }

    #[test]
    fn seer_learns_alignment_without_changing_state() {
        let mut game = game_with(&[Role::Werewolf, Role::Seer, Role::Villager, Role::Villager]);
        game.begin_night();
        game.submit_night_action(PlayerId(2), &[PlayerId(1)], Utc::now())
            .unwrap();
        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(
            report.inspections,
            vec![Inspection {
                seer: PlayerId(2),
                target: PlayerId(1),
                is_werewolf: true
            }]
        );
        assert_eq!(game.living().count(), 4);
    }

    #[test]
    fn link_is_applied_before_the_kill() {
        let mut game = game_with(&[
            Role::Werewolf,
            Role::Cupid,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ]);
        game.begin_night();
        let now = Utc::now();
        game.submit_night_action(PlayerId(2), &[PlayerId(3), PlayerId(4)], now)
            .unwrap();
        game.submit_night_action(PlayerId(1), &[PlayerId(3)], now).unwrap();

        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report.linked, Some((PlayerId(3), PlayerId(4))));
        let dead: Vec<_> = report.deaths.iter().map(|d| d.player).collect();
        assert_eq!(dead, vec![PlayerId(3), PlayerId(4)]);
        assert_eq!(report.deaths[1].cause, DeathCause::Heartbreak);
    }

    #[test]
    fn killed_hunter_is_reported_as_reactive() {
        let mut game = game_with(&[Role::Werewolf, Role::Hunter, Role::Villager, Role::Villager]);
        game.begin_night();
        game.submit_night_action(PlayerId(1), &[PlayerId(2)], Utc::now())
            .unwrap();
        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report.reactive, vec![PlayerId(2)]);
    }

    #[test]
    fn quiet_night_reports_nothing() {
        let mut game = game_with(&[Role::Werewolf, Role::Villager, Role::Villager, Role::Villager]);
        game.begin_night();
        let report = resolve_night(&mut game, &mut rng());
        assert_eq!(report, NightResolution::default());
    }
}
