//! Deep verification by deterministic replay.
//!
//! A peer replays a player's commands through its own copy of the
//! simulation rules and compares each resulting state hash with the one the
//! player committed to. Only commands and hashes cross the wire.

use crate::block::ActionBlock;
use crate::command::ActionCommand;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The deterministic simulation contract consumed by replay.
///
/// Implementations must be pure: identical inputs give identical states and
/// identical hashes on every peer.
pub trait ReplayRules {
    /// Simulation state threaded through replay.
    type State;
    /// Rejection raised by the rules.
    type Error: Display;

    /// State produced by a chain's genesis command.
    fn genesis_state(&self, genesis: &ActionCommand) -> Result<Self::State, Self::Error>;

    /// Apply one command, producing the next state.
    fn apply(&self, state: &Self::State, command: &ActionCommand) -> Result<Self::State, Self::Error>;

    /// Hash committed to in each block.
    fn state_hash(&self, state: &Self::State) -> String;
}

/// One replayed command and the state hash claimed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep {
    /// Block index the command came from
    pub index: u64,
    /// Command to apply
    pub command: ActionCommand,
    /// State hash the player committed to
    pub expected_state_hash: String,
}

impl From<&ActionBlock> for ReplayStep {
    fn from(block: &ActionBlock) -> Self {
        Self {
            index: block.index,
            command: block.command.clone(),
            expected_state_hash: block.state_hash.clone(),
        }
    }
}

/// Outcome of a replay.
///
/// On failure, nothing at or beyond `failed_at_index` is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Every step reproduced its claimed state hash
    pub valid: bool,
    /// First index that did not reproduce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at_index: Option<u64>,
    /// Hash computed locally at the failing step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_state_hash: Option<String>,
    /// Hash the chain claimed at the failing step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_state_hash: Option<String>,
    /// Steps that matched before the failure, or all of them
    pub steps_verified: u64,
    /// Rules error that stopped replay, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayReport {
    fn valid(steps_verified: u64) -> Self {
        Self {
            valid: true,
            failed_at_index: None,
            computed_state_hash: None,
            claimed_state_hash: None,
            steps_verified,
            error: None,
        }
    }

    fn mismatch(index: u64, computed: String, claimed: String, steps_verified: u64) -> Self {
        Self {
            valid: false,
            failed_at_index: Some(index),
            computed_state_hash: Some(computed),
            claimed_state_hash: Some(claimed),
            steps_verified,
            error: None,
        }
    }

    fn failed(index: u64, error: impl Display, steps_verified: u64) -> Self {
        Self {
            valid: false,
            failed_at_index: Some(index),
            computed_state_hash: None,
            claimed_state_hash: None,
            steps_verified,
            error: Some(error.to_string()),
        }
    }
}

/// Replay `steps` on top of `genesis` and compare each claimed state hash,
/// in order, stopping at the first mismatch.
///
/// Only the commands are checked here; the genesis state itself is taken
/// as given. Steps must carry strictly increasing indices starting after 0.
pub fn verify_history<R: ReplayRules>(
    rules: &R,
    genesis: &ActionCommand,
    steps: &[ReplayStep],
) -> ReplayReport {
    let state = match rules.genesis_state(genesis) {
        Ok(state) => state,
        Err(err) => return ReplayReport::failed(0, err, 0),
    };
    replay_from(rules, state, 0, steps, 0)
}

/// Deep verification of a stored chain, genesis block included.
pub fn verify_chain<R: ReplayRules>(rules: &R, blocks: &[ActionBlock]) -> ReplayReport {
    let Some((genesis, rest)) = blocks.split_first() else {
        return ReplayReport::valid(0);
    };
    if genesis.index != 0 {
        return ReplayReport::failed(genesis.index, "chain does not start at index 0", 0);
    }
    let state = match rules.genesis_state(&genesis.command) {
        Ok(state) => state,
        Err(err) => return ReplayReport::failed(0, err, 0),
    };
    let computed = rules.state_hash(&state);
    if computed != genesis.state_hash {
        return ReplayReport::mismatch(0, computed, genesis.state_hash.clone(), 0);
    }

    let steps: Vec<ReplayStep> = rest.iter().map(ReplayStep::from).collect();
    replay_from(rules, state, 0, &steps, 1)
}

fn replay_from<R: ReplayRules>(
    rules: &R,
    mut state: R::State,
    mut last_index: u64,
    steps: &[ReplayStep],
    mut verified: u64,
) -> ReplayReport {
    for step in steps {
        if step.index != last_index + 1 {
            return ReplayReport::failed(step.index, "replay steps are not contiguous", verified);
        }
        state = match rules.apply(&state, &step.command) {
            Ok(next) => next,
            Err(err) => return ReplayReport::failed(step.index, err, verified),
        };
        let computed = rules.state_hash(&state);
        if computed != step.expected_state_hash {
            return ReplayReport::mismatch(
                step.index,
                computed,
                step.expected_state_hash.clone(),
                verified,
            );
        }
        last_index = step.index;
        verified += 1;
    }
    ReplayReport::valid(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tally_steps, TallyRules};

    #[test]
    fn empty_history_is_valid() {
        let genesis = ActionCommand::genesis("seed", "Ur").unwrap();
        let report = verify_history(&TallyRules, &genesis, &[]);
        assert!(report.valid);
        assert_eq!(report.steps_verified, 0);
    }

    #[test]
    fn correct_history_verifies() {
        let genesis = ActionCommand::genesis("seed", "Ur").unwrap();
        let steps = tally_steps(&genesis, 4);
        let report = verify_history(&TallyRules, &genesis, &steps);
        assert!(report.valid, "{report:?}");
        assert_eq!(report.steps_verified, 4);
    }

    #[test]
    fn first_mismatch_wins() {
        let genesis = ActionCommand::genesis("seed", "Ur").unwrap();
        let mut steps = tally_steps(&genesis, 5);
        steps[1].expected_state_hash = "bad-2".to_string();
        steps[3].expected_state_hash = "bad-4".to_string();

        let report = verify_history(&TallyRules, &genesis, &steps);
        assert!(!report.valid);
        assert_eq!(report.failed_at_index, Some(2));
        assert_eq!(report.claimed_state_hash.as_deref(), Some("bad-2"));
        assert_eq!(report.steps_verified, 1);
    }

    #[test]
    fn non_contiguous_steps_fail() {
        let genesis = ActionCommand::genesis("seed", "Ur").unwrap();
        let mut steps = tally_steps(&genesis, 3);
        steps.remove(1);
        let report = verify_history(&TallyRules, &genesis, &steps);
        assert_eq!(report.failed_at_index, Some(3));
        assert!(report.error.is_some());
    }
}
