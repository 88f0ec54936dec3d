//! Chain catch-up between peers over the in-memory network.

use hegemon_chain::testing::tally_chain;
use hegemon_chain::{ActionBlock, ChainBook};
use hegemon_sync::{
    BlockOutcome, ChainSync, CommandBlock, Envelope, MemoryNetwork, Message, SyncConfig, Topic,
    Transport,
};
use hegemon_wallet::Wallet;

fn scratch() -> Vec<ActionBlock> {
    Vec::new()
}

fn envelope(sender: &Wallet, message: Message) -> Vec<u8> {
    Envelope::new(sender.address().clone(), 0, message)
        .to_bytes()
        .unwrap()
}

#[tokio::test]
async fn gossiped_head_pulls_the_missing_range() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let chain = tally_chain(&alice, 5).unwrap();

    let mut alice_book = ChainBook::new();
    alice_book.load_chain(chain.clone()).unwrap();
    let alice_sync = ChainSync::new(alice.address().clone(), SyncConfig::default());
    let mut bob_book = ChainBook::new();
    let mut bob_sync = ChainSync::new(bob.address().clone(), SyncConfig::default());

    let net = MemoryNetwork::new();
    let alice_net = net.join("alice").await;
    let bob_net = net.join("bob").await;
    let mut alice_direct = alice_net.subscribe(Topic::Direct).await.unwrap();
    let mut bob_blocks = bob_net.subscribe(Topic::Blocks).await.unwrap();
    let mut bob_direct = bob_net.subscribe(Topic::Direct).await.unwrap();

    // Alice gossips the newest block; Bob has none of that chain.
    let head = Message::CommandBlock(CommandBlock {
        block: chain[4].clone(),
    });
    alice_net
        .publish(Topic::Blocks, envelope(&alice, head))
        .await
        .unwrap();

    let inbound = bob_blocks.recv().await.unwrap();
    let Message::CommandBlock(gossip) = Envelope::from_bytes(&inbound.bytes).unwrap().message else {
        panic!("expected a command block");
    };
    let BlockOutcome::Behind { request, .. } =
        bob_sync.on_command_block(&mut bob_book, &mut scratch(), &inbound.from, gossip.block, 1)
    else {
        panic!("expected catch-up");
    };
    let out = request.unwrap();
    assert_eq!(out.request.from_index, 0);
    bob_net
        .send(&out.peer, envelope(&bob, Message::ChainRequest(out.request)))
        .await
        .unwrap();

    // Alice serves the range.
    let inbound = alice_direct.recv().await.unwrap();
    let Message::ChainRequest(request) = Envelope::from_bytes(&inbound.bytes).unwrap().message
    else {
        panic!("expected a chain request");
    };
    let response = alice_sync.on_chain_request(&alice_book, &request);
    alice_net
        .send(&inbound.from, envelope(&alice, Message::ChainResponse(response)))
        .await
        .unwrap();

    // Bob applies it and now holds Alice's full chain.
    let inbound = bob_direct.recv().await.unwrap();
    let Message::ChainResponse(response) = Envelope::from_bytes(&inbound.bytes).unwrap().message
    else {
        panic!("expected a chain response");
    };
    let outcome =
        bob_sync.on_chain_response(&mut bob_book, &mut scratch(), &inbound.from, response, 2);
    assert_eq!(outcome.accepted, 5);
    assert!(outcome.failed.is_none());
    assert_eq!(bob_book.chain(alice.address()), chain.as_slice());
    assert!(bob_sync.pending().is_empty());
}

#[tokio::test]
async fn unresponsive_peer_falls_back_to_a_replica() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let carol = Wallet::generate();
    let chain = tally_chain(&alice, 3).unwrap();

    let mut carol_book = ChainBook::new();
    carol_book.load_chain(chain.clone()).unwrap();
    let carol_sync = ChainSync::new(carol.address().clone(), SyncConfig::default());
    let mut bob_book = ChainBook::new();
    let mut bob_sync = ChainSync::new(bob.address().clone(), SyncConfig::default());

    let net = MemoryNetwork::new();
    let bob_net = net.join("bob").await;
    let mut bob_events = bob_net.peer_events().await.unwrap();
    let mut bob_direct = bob_net.subscribe(Topic::Direct).await.unwrap();
    let _alice_net = net.join("alice").await;
    let carol_net = net.join("carol").await;
    let mut carol_direct = carol_net.subscribe(Topic::Direct).await.unwrap();
    for _ in 0..2 {
        let event = bob_events.recv().await.unwrap();
        bob_sync.on_peer_event(&event, 0);
    }

    // Alice's head arrives, then the link to Bob drops before Alice answers.
    let BlockOutcome::Behind { request, .. } =
        bob_sync.on_command_block(&mut bob_book, &mut scratch(), "alice", chain[2].clone(), 0)
    else {
        panic!("expected catch-up");
    };
    assert_eq!(request.unwrap().peer, "alice");
    net.sever("alice", "bob").await;
    let event = bob_events.recv().await.unwrap();
    bob_sync.on_peer_event(&event, 10);

    let deadline = bob_sync.config().request_timeout_ms;
    let retries = bob_sync.on_tick(&bob_book, deadline);
    assert_eq!(retries.len(), 1);
    let retry = retries.into_iter().next().unwrap();
    assert_eq!(retry.peer, "carol");
    bob_net
        .send(&retry.peer, envelope(&bob, Message::ChainRequest(retry.request)))
        .await
        .unwrap();

    let inbound = carol_direct.recv().await.unwrap();
    let Message::ChainRequest(request) = Envelope::from_bytes(&inbound.bytes).unwrap().message
    else {
        panic!("expected a chain request");
    };
    let response = carol_sync.on_chain_request(&carol_book, &request);
    carol_net
        .send(&inbound.from, envelope(&carol, Message::ChainResponse(response)))
        .await
        .unwrap();

    let inbound = bob_direct.recv().await.unwrap();
    let Message::ChainResponse(response) = Envelope::from_bytes(&inbound.bytes).unwrap().message
    else {
        panic!("expected a chain response");
    };
    let outcome = bob_sync.on_chain_response(
        &mut bob_book,
        &mut scratch(),
        &inbound.from,
        response,
        deadline + 1,
    );
    assert_eq!(outcome.accepted, 3);
    assert_eq!(bob_book.len(alice.address()), 3);
}
