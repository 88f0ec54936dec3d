//! Store round trips for chains, journal and peers.

use hegemon_chain::testing::{tally_chain, train};
use hegemon_chain::{ActionBlock, ChainBook};
use hegemon_core::Address;
use hegemon_ledger::{Ledger, LedgerEntry, Reward};
use hegemon_store::{PeerRecord, Store, StoreError};
use hegemon_wallet::Wallet;

fn open() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("node.redb")).unwrap();
    (dir, store)
}

#[test]
fn chains_reload_in_index_order() {
    let (_dir, store) = open();
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let alice_chain = tally_chain(&alice, 4).unwrap();
    let bob_chain = tally_chain(&bob, 2).unwrap();

    // Interleave writes across players.
    for block in alice_chain.iter().rev().chain(bob_chain.iter()) {
        store.append_block(block).unwrap();
    }

    assert_eq!(store.load_chain(alice.address()).unwrap(), alice_chain);
    assert_eq!(store.load_chain(bob.address()).unwrap(), bob_chain);
    assert_eq!(store.chain_players().unwrap().len(), 2);

    let mut book = ChainBook::new();
    book.load_chain(store.load_chain(alice.address()).unwrap())
        .unwrap();
    assert_eq!(book.len(alice.address()), 4);
}

#[test]
fn block_table_is_append_only() {
    let (_dir, store) = open();
    let alice = Wallet::generate();
    let chain = tally_chain(&alice, 2).unwrap();
    let fork = ActionBlock::seal(&alice, Some(&chain[0]), train(7, 1).unwrap(), "fork", 1).unwrap();

    store.append_block(&chain[1]).unwrap();
    store.append_block(&chain[1]).unwrap();
    assert!(matches!(
        store.append_block(&fork),
        Err(StoreError::BlockConflict { index: 1, .. })
    ));
    assert_eq!(store.load_chain(alice.address()).unwrap(), vec![chain[1].clone()]);
}

#[test]
fn ledger_rebuilds_from_journal() {
    let (_dir, store) = open();
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    let mut live = Ledger::new();
    let mint = LedgerEntry::Mint {
        reward: Reward::new(alice.address().clone(), 100, 0, "founding grant")
            .unwrap()
            .sign(&alice)
            .unwrap(),
    };
    live.apply_entry(&mint).unwrap();
    assert_eq!(store.append_ledger_entry(&mint).unwrap(), 0);

    let tx = live.sign_transfer(&alice, bob.address(), 30, 1, 1).unwrap();
    live.admit(&tx).unwrap();
    assert_eq!(store.append_ledger_entry(&LedgerEntry::Transfer { tx }).unwrap(), 1);

    let rebuilt = Ledger::replay(&store.ledger_entries().unwrap()).unwrap();
    assert_eq!(rebuilt, live);
    assert_eq!(rebuilt.balance(alice.address()), 69);
}

#[test]
fn peers_track_successes() {
    let (_dir, store) = open();
    let address = Address::from_public_key(&[8; 32]);
    store
        .upsert_peer(&PeerRecord {
            address: address.clone(),
            peer_id: "peer-8".to_string(),
            name: "Lagash".to_string(),
            last_seen: 10,
            success_count: 0,
        })
        .unwrap();

    assert!(store.record_peer_success(&address, 25).unwrap());
    assert!(store.record_peer_success(&address, 20).unwrap());
    assert!(!store
        .record_peer_success(&Address::from_public_key(&[9; 32]), 1)
        .unwrap());

    let peers = store.known_peers().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].success_count, 2);
    assert_eq!(peers[0].last_seen, 25);
}
