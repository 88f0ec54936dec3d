//! Fast-path acceptance and deep replay audit across two books.

use hegemon_chain::testing::{tally_chain, train, TallyRules};
use hegemon_chain::{verify_chain, ActionBlock, ChainBook, ChainError};
use hegemon_wallet::Wallet;

#[test]
fn honest_chain_is_accepted_and_replays_clean() {
    let player = Wallet::generate();
    let blocks = tally_chain(&player, 4).unwrap();

    let mut observer = ChainBook::new();
    assert_eq!(observer.load_chain(blocks.clone()).unwrap(), 4);

    let report = verify_chain(&TallyRules, observer.chain(player.address()));
    assert!(report.valid, "{report:?}");
    assert_eq!(report.steps_verified, 4);
}

#[test]
fn tampered_state_hash_at_index_two_fails_replay_at_two() {
    let player = Wallet::generate();
    let mut blocks = tally_chain(&player, 4).unwrap();

    // Re-seal block 2 with a wrong claim so it is individually valid.
    let forged = ActionBlock::seal(
        &player,
        Some(&blocks[1]),
        blocks[2].command.clone(),
        "f".repeat(64),
        blocks[2].timestamp,
    )
    .unwrap();
    forged.check_integrity().unwrap();
    blocks[2] = forged;
    for block in &blocks {
        assert!(block.verify_signature());
    }

    let report = verify_chain(&TallyRules, &blocks);
    assert!(!report.valid);
    assert_eq!(report.failed_at_index, Some(2));
    assert_eq!(report.claimed_state_hash.as_deref(), Some("f".repeat(64).as_str()));
    assert_ne!(report.computed_state_hash, report.claimed_state_hash);
    assert_eq!(report.steps_verified, 1);
}

#[test]
fn divergent_chain_is_flagged_but_still_served() {
    let player = Wallet::generate();
    let mut own = ChainBook::new();
    own.append_local(&player, hegemon_chain::ActionCommand::genesis("seed", "Uruk").unwrap(), "lie")
        .unwrap();
    own.append_local(&player, train(3, 1).unwrap(), "another-lie")
        .unwrap();

    let mut observer = ChainBook::new();
    observer.load_chain(own.chain(player.address()).to_vec()).unwrap();

    let report = verify_chain(&TallyRules, observer.chain(player.address()));
    assert_eq!(report.failed_at_index, Some(0));
    observer.flag_suspect(player.address().clone(), report, 7);

    assert!(observer.is_suspect(player.address()));
    assert_eq!(observer.blocks_from(player.address(), 0, 10).len(), 2);
}

#[test]
fn tampered_block_is_rejected_on_the_fast_path() {
    let player = Wallet::generate();
    let mut blocks = tally_chain(&player, 3).unwrap();
    blocks[1].state_hash = "0".repeat(64);

    let mut observer = ChainBook::new();
    observer.accept_remote(blocks[0].clone()).unwrap();
    let err = observer.accept_remote(blocks[1].clone()).unwrap_err();
    assert!(matches!(err, ChainError::HashMismatch { index: 1, .. }));
    assert!(err.is_integrity());
    assert_eq!(observer.len(player.address()), 1);
}

#[test]
fn wire_round_trip_preserves_block_hash() {
    let player = Wallet::generate();
    let blocks = tally_chain(&player, 2).unwrap();
    let text = serde_json::to_string(&blocks[1]).unwrap();
    let decoded: ActionBlock = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded.compute_hash().unwrap(), blocks[1].hash);
}
