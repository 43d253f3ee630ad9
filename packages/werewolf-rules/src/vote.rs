use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::player::PlayerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "player", rename_all = "snake_case")]
pub enum VoteTarget {
    Player(PlayerId),
    Abstain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter: PlayerId,
    pub target: VoteTarget,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "players", rename_all = "snake_case")]
pub enum VoteOutcome {
    Eliminated(PlayerId),
    /// Two or more players share the top count.
    Tie(Vec<PlayerId>),
    /// Abstentions matched or beat every candidate.
    Abstained,
    NoVotes,
}

impl VoteOutcome {
    pub fn eliminated(&self) -> Option<PlayerId> {
        match self {
            VoteOutcome::Eliminated(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    pub counts: BTreeMap<PlayerId, usize>,
    pub abstentions: usize,
    pub outcome: VoteOutcome,
}

/// Count ballots from living voters for living targets.
///
/// Only a strict plurality eliminates. Any tie at the top, including a tie with abstentions,
/// means nobody leaves today.
pub fn tally<'a>(
    ballots: impl IntoIterator<Item = &'a Ballot>,
    living: &BTreeSet<PlayerId>,
) -> TallyResult {
    let mut counts: BTreeMap<PlayerId, usize> = BTreeMap::new();
    let mut abstentions = 0;
    for ballot in ballots {
        if !living.contains(&ballot.voter) {
            continue;
        }
        match ballot.target {
            VoteTarget::Player(target) if living.contains(&target) => {
                *counts.entry(target).or_default() += 1;
            }
            VoteTarget::Player(_) => {}
            VoteTarget::Abstain => abstentions += 1,
        }
    }

    let top = counts.values().copied().max().unwrap_or(0);
    let outcome = if top == 0 && abstentions == 0 {
        VoteOutcome::NoVotes
    } else if abstentions >= top {
        VoteOutcome::Abstained
    } else {
        let leaders: Vec<PlayerId> = counts
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(id, _)| *id)
            .collect();
        match leaders.as_slice() {
            [only] => VoteOutcome::Eliminated(*only),
            _ => VoteOutcome::Tie(leaders),
        }
    };

    TallyResult {
        counts,
        abstentions,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballots(votes: &[(u64, Option<u64>)]) -> Vec<Ballot> {
        votes
            .iter()
            .map(|(voter, target)| Ballot {
                voter: PlayerId(*voter),
                target: target.map_or(VoteTarget::Abstain, |t| VoteTarget::Player(PlayerId(t))),
                at: Utc::now(),
            })
            .collect()
    }

    fn living(n: u64) -> BTreeSet<PlayerId> {
        (1..=n).map(PlayerId).collect()
    }

    #[test]
    fn plurality_eliminates() {
        let result = tally(
            &ballots(&[(1, Some(3)), (2, Some(3)), (3, Some(1)), (4, None)]),
            &living(4),
        );
        assert_eq!(result.outcome, VoteOutcome::Eliminated(PlayerId(3)));
        assert_eq!(result.counts[&PlayerId(3)], 2);
        assert_eq!(result.abstentions, 1);
    }

    #[test]
    fn tie_for_the_lead_eliminates_nobody() {
        let result = tally(
            &ballots(&[
                (1, Some(5)),
                (2, Some(5)),
                (3, Some(5)),
                (4, Some(6)),
                (5, Some(6)),
                (6, Some(6)),
                (7, Some(1)),
            ]),
            &living(7),
        );
        assert_eq!(
            result.outcome,
            VoteOutcome::Tie(vec![PlayerId(5), PlayerId(6)])
        );
    }

    #[test]
    fn tie_below_the_lead_does_not_matter() {
        let result = tally(
            &ballots(&[
                (1, Some(5)),
                (2, Some(5)),
                (3, Some(5)),
                (4, Some(6)),
                (5, Some(6)),
                (6, Some(7)),
                (7, Some(7)),
            ]),
            &living(7),
        );
        assert_eq!(result.outcome, VoteOutcome::Eliminated(PlayerId(5)));
    }

    #[test]
    fn abstain_majority_or_tie_eliminates_nobody() {
        let majority = tally(&ballots(&[(1, None), (2, None), (3, Some(1))]), &living(3));
        assert_eq!(majority.outcome, VoteOutcome::Abstained);

        let level = tally(&ballots(&[(1, None), (2, Some(1))]), &living(3));
        assert_eq!(level.outcome, VoteOutcome::Abstained);
    }

    #[test]
    fn dead_voters_and_dead_targets_are_ignored() {
        let alive: BTreeSet<PlayerId> = [1, 2, 3].into_iter().map(PlayerId).collect();
        let result = tally(
            &ballots(&[(1, Some(2)), (4, Some(3)), (5, Some(3)), (2, Some(4))]),
            &alive,
        );
        assert_eq!(result.outcome, VoteOutcome::Eliminated(PlayerId(2)));
        assert!(!result.counts.contains_key(&PlayerId(3)));
    }

    #[test]
    fn empty_ballot_box() {
        assert_eq!(
            tally(&Vec::<Ballot>::new(), &living(4)).outcome,
            VoteOutcome::NoVotes
        );
    }
}
