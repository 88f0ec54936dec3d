//! Deterministic toy rules for exercising replay without the simulation.
//!
//! [`TallyRules`] counts commands per type and sums trained units. It is
//! small enough to reason about in tests and deterministic across peers.

use crate::block::ActionBlock;
use crate::book::ChainBook;
use crate::command::{ActionCommand, CommandError, CommandKind, TrainArgs};
use crate::error::Result;
use crate::replay::{ReplayRules, ReplayStep};
use hegemon_core::sha256_hex;
use hegemon_wallet::Wallet;
use serde::Serialize;
use std::collections::BTreeMap;

/// State of the toy rules: a settlement name and running counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TallyState {
    /// Name from the genesis command
    pub settlement: String,
    /// Commands applied, by type
    pub counts: BTreeMap<&'static str, u64>,
    /// Units trained so far
    pub units: u64,
    /// Current era
    pub era: u32,
}

/// [`ReplayRules`] over [`TallyState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TallyRules;

impl ReplayRules for TallyRules {
    type State = TallyState;
    type Error = String;

    fn genesis_state(&self, genesis: &ActionCommand) -> std::result::Result<TallyState, String> {
        match genesis.kind() {
            CommandKind::Genesis(args) => Ok(TallyState {
                settlement: format!("{}@{}", args.name, args.seed),
                era: 1,
                ..TallyState::default()
            }),
            other => Err(format!("`{}` cannot start a chain", other.name())),
        }
    }

    fn apply(&self, state: &TallyState, command: &ActionCommand) -> std::result::Result<TallyState, String> {
        let mut next = state.clone();
        *next.counts.entry(command.kind().name()).or_default() += 1;
        match command.kind() {
            CommandKind::Genesis(_) => return Err("second genesis".to_string()),
            CommandKind::Train(args) => next.units += u64::from(args.count),
            CommandKind::AdvanceEra(args) if args.era != state.era + 1 => {
                return Err(format!("cannot jump from era {} to {}", state.era, args.era));
            }
            CommandKind::AdvanceEra(args) => next.era = args.era,
            _ => {}
        }
        Ok(next)
    }

    fn state_hash(&self, state: &TallyState) -> String {
        let mut text = format!("{}|{}|{}", state.settlement, state.units, state.era);
        for (kind, count) in &state.counts {
            text.push_str(&format!("|{kind}={count}"));
        }
        sha256_hex(text.as_bytes())
    }
}

/// `Train` command used to fill test chains.
pub fn train(count: u32, tick: u64) -> std::result::Result<ActionCommand, CommandError> {
    ActionCommand::new(
        CommandKind::Train(TrainArgs {
            unit: "spear".to_string(),
            count,
        }),
        tick,
    )
}

/// `len` honest replay steps (indices 1..=len) following `genesis`.
pub fn tally_steps(genesis: &ActionCommand, len: u64) -> Vec<ReplayStep> {
    let rules = TallyRules;
    let Ok(mut state) = rules.genesis_state(genesis) else {
        return Vec::new();
    };
    let mut steps = Vec::new();
    for index in 1..=len {
        let Ok(command) = train(u32::try_from(index).unwrap_or(u32::MAX), index) else {
            break;
        };
        let Ok(next) = rules.apply(&state, &command) else {
            break;
        };
        state = next;
        steps.push(ReplayStep {
            index,
            expected_state_hash: rules.state_hash(&state),
            command,
        });
    }
    steps
}

/// A signed chain of `len` blocks (genesis included) whose state hashes are
/// the honest [`TallyRules`] hashes.
pub fn tally_chain(wallet: &Wallet, len: u64) -> Result<Vec<ActionBlock>> {
    let rules = TallyRules;
    let genesis = ActionCommand::genesis("seed", "Uruk")?;
    let mut book = ChainBook::new();
    let Ok(state) = rules.genesis_state(&genesis) else {
        return Ok(Vec::new());
    };
    book.append_local(wallet, genesis.clone(), rules.state_hash(&state))?;
    for step in tally_steps(&genesis, len.saturating_sub(1)) {
        book.append_local(wallet, step.command, step.expected_state_hash)?;
    }
    Ok(book.chain(wallet.address()).to_vec())
}
