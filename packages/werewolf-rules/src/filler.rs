//! Automatic choices for synthetic seats, made when a collection window closes.

use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;

use crate::game::Game;
use crate::player::PlayerId;
use crate::role::Role;
use crate::vote::VoteTarget;

fn others(game: &Game, me: PlayerId) -> Vec<PlayerId> {
    game.living().map(|p| p.id).filter(|id| *id != me).collect()
}

/// A random living player other than the filler itself, or an abstention when nobody is left.
pub fn filler_vote<R: Rng + ?Sized>(game: &Game, filler: PlayerId, rng: &mut R) -> VoteTarget {
    others(game, filler)
        .choose(rng)
        .map_or(VoteTarget::Abstain, |id| VoteTarget::Player(*id))
}

/// Targets a filler submits for its night ability, if it has one to use tonight.
pub fn filler_night_targets<R: Rng + ?Sized>(
    game: &Game,
    filler: PlayerId,
    rng: &mut R,
) -> Option<Vec<PlayerId>> {
    let player = game.player(filler)?;
    if player.is_dead {
        return None;
    }
    match player.role {
        Role::Werewolf => game
            .living()
            .filter(|p| !p.role.is_werewolf())
            .map(|p| p.id)
            .choose(rng)
            .map(|id| vec![id]),
        Role::Guard => game
            .living()
            .map(|p| p.id)
            .filter(|id| Some(*id) != player.last_protected)
            .choose(rng)
            .map(|id| vec![id]),
        Role::Witch if !player.ability_spent => game.team_target.map(|victim| vec![victim]),
        Role::Seer => others(game, filler).choose(rng).map(|id| vec![*id]),
        Role::Cupid if game.night == 1 && !player.ability_spent => {
            let pair: Vec<PlayerId> = game
                .living()
                .map(|p| p.id)
                .collect::<Vec<_>>()
                .choose_multiple(rng, 2)
                .copied()
                .collect();
            (pair.len() == 2).then_some(pair)
        }
        _ => None,
    }
}

/// A random living target for a filler's death-triggered ability.
pub fn filler_reactive_target<R: Rng + ?Sized>(game: &Game, rng: &mut R) -> Option<PlayerId> {
    game.living().map(|p| p.id).choose(rng)
}
