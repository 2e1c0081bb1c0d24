//! Integration tests for host and peer components
//!
//! These tests validate cross-crate interactions and real network behavior.

use client::network::Client;
use client::session::{sample_shop, PeerSession, PurchaseError};
use server::network::{Server, ServerConfig};
use server::world::HostWorld;
use shared::{
    ActionRequest, MailTiming, Packet, PeerPredicate, SessionPeer, StockError, TargetSelector,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

fn save_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("replisync-it-{}-{}", name, std::process::id()))
}

fn session_peers() -> Vec<SessionPeer> {
    vec![
        SessionPeer {
            id: 1,
            is_host: true,
        },
        SessionPeer {
            id: 2,
            is_host: false,
        },
    ]
}

fn world_with_two_players(name: &str) -> HostWorld {
    let mut world = HostWorld::new(save_dir(name));
    world.add_player(1);
    world.add_player(2);
    world
}

/// Ticks the world until a day rolls over
async fn tick_until_new_day(world: &mut HostWorld) -> Option<u32> {
    for _ in 0..500 {
        if let Some(day) = world.tick() {
            return Some(day);
        }
        sleep(Duration::from_millis(2)).await;
    }
    None
}

/// ACTION REQUEST TESTS
mod action_tests {
    use super::*;

    /// An action encoded by a peer is applied by the host to every match
    #[test]
    fn peer_action_reaches_selected_players() {
        let mut world = world_with_two_players("action");
        let request = ActionRequest::set_mail(
            TargetSelector::Matching(PeerPredicate::RemoteOnly),
            "wizardInvite",
            MailTiming::Now,
            true,
        );
        let packet = Packet::Action {
            payload: request.to_bytes().unwrap(),
        };

        let datagram = bincode::serialize(&packet).unwrap();
        let Packet::Action { payload } = bincode::deserialize::<Packet>(&datagram).unwrap()
        else {
            panic!("Wrong packet type after deserialization");
        };
        let changed = assert_ok!(world.apply_action(&payload, &session_peers()));

        assert_eq!(changed, vec![2]);
        assert!(world.player(2).unwrap().mailbox.contains("wizardInvite"));
        assert!(!world.player(1).unwrap().mailbox.contains("wizardInvite"));
    }

    /// A truncated payload is rejected without touching any player
    #[test]
    fn truncated_action_is_dropped() {
        let mut world = world_with_two_players("truncated");
        let request = ActionRequest::set_event_seen(TargetSelector::All, "festival", true);
        let bytes = request.to_bytes().unwrap();

        assert_err!(world.apply_action(&bytes[..bytes.len() - 1], &session_peers()));
        assert!(world.player(1).unwrap().events_seen.is_empty());
        assert!(world.player(2).unwrap().events_seen.is_empty());
    }

    /// Applying the same request twice leaves the same state as applying it once
    #[test]
    fn repeated_action_is_idempotent() {
        let mut world = world_with_two_players("repeat");
        let request = ActionRequest::set_crafting_recipe(TargetSelector::All, "Scarecrow", true)
            .only_for(1);

        assert_eq!(world.perform(&request, &session_peers()), vec![1]);
        assert!(world.perform(&request, &session_peers()).is_empty());
        assert_eq!(world.player_flags(1).unwrap().crafting_recipes.len(), 1);
        assert!(world.player_flags(2).unwrap().crafting_recipes.is_empty());
    }
}

/// SHARED STOCK TESTS
mod stock_tests {
    use super::*;

    fn connected_session(peer_id: u64) -> PeerSession {
        let mut session = PeerSession::new(sample_shop("ShopA"));
        session.apply_packet(&Packet::Connected { peer_id });
        session
    }

    /// Forwards a peer's purchase to the host and returns the counter it left
    fn forward(world: &mut HostWorld, purchase: Option<Packet>) -> Result<i32, StockError> {
        let Some(Packet::StockPurchase {
            key,
            amount,
            listed,
        }) = purchase
        else {
            panic!("shared purchase should be reported to the host");
        };
        world.purchase_stock(&key, amount, listed)
    }

    /// Purchases from two peers converge through the host's counters
    #[test]
    fn two_peers_converge_on_global_stock() {
        let mut world = world_with_two_players("converge");
        let mut first = connected_session(1);
        let mut second = connected_session(2);

        assert_eq!(forward(&mut world, first.purchase("Eggs", 2).unwrap()), Ok(3));
        let snapshot = world.stock_snapshot();
        first.apply_packet(&snapshot);
        second.apply_packet(&snapshot);

        assert_eq!(second.view().entries[0].stock, 3);
        assert_eq!(
            second.purchase("Eggs", 4),
            Err(PurchaseError::SoldOut { available: 3 })
        );

        assert_eq!(forward(&mut world, second.purchase("Eggs", 3).unwrap()), Ok(0));
        let snapshot = world.stock_snapshot();
        first.apply_packet(&snapshot);
        second.apply_packet(&snapshot);

        // the per-player offer under the same name is still there for both
        for session in [&first, &second] {
            let eggs: Vec<_> = session
                .view()
                .entries
                .iter()
                .filter(|entry| entry.item.display_name == "Eggs")
                .collect();
            assert_eq!(eggs.len(), 1);
            assert_eq!(eggs[0].item.sync_key.as_deref(), Some("Eggs1"));
        }
    }

    /// Two peers buying from the same snapshot can only drain the counter
    #[test]
    fn concurrent_purchases_from_one_snapshot_never_restock() {
        let mut world = world_with_two_players("concurrent");
        let mut first = connected_session(1);
        let mut second = connected_session(2);
        let snapshot = world.stock_snapshot();
        first.apply_packet(&snapshot);
        second.apply_packet(&snapshot);

        // both still list 5 eggs when they buy
        let from_second = second.purchase("Eggs", 4).unwrap();
        let from_first = first.purchase("Eggs", 1).unwrap();

        assert_eq!(forward(&mut world, from_second), Ok(1));
        assert_eq!(forward(&mut world, from_first), Ok(0));
        assert_eq!(world.stock_remaining("ShopA/Global/Eggs"), Some(0));

        // the first peer's view still shows 4, the host knows better
        let late = first.purchase("Eggs", 1).unwrap();
        assert_eq!(
            forward(&mut world, late),
            Err(StockError::Insufficient { available: 0 })
        );
        assert_eq!(world.stock_remaining("ShopA/Global/Eggs"), Some(0));

        let mut fresh = connected_session(3);
        fresh.apply_packet(&world.stock_snapshot());
        assert_eq!(fresh.view().entries[0].item.sync_key.as_deref(), Some("Eggs1"));
        assert_eq!(fresh.view().entries[0].stock, 3);
    }

    /// Per-player counters written by one peer do not limit another
    #[test]
    fn per_player_stock_is_independent() {
        let mut world = world_with_two_players("per-player");
        let mut first = connected_session(1);
        let mut second = connected_session(2);

        let purchase = first.purchase("Parsnip Seeds", 10).unwrap();
        let Some(Packet::StockPurchase { key, .. }) = &purchase else {
            panic!("per-player purchase should be reported to the host");
        };
        assert_eq!(key, "ShopA/1/Parsnip Seeds");
        assert_eq!(forward(&mut world, purchase), Ok(0));

        let snapshot = world.stock_snapshot();
        first.apply_packet(&snapshot);
        second.apply_packet(&snapshot);

        assert!(first
            .view()
            .entries
            .iter()
            .all(|entry| entry.item.display_name != "Parsnip Seeds"));
        assert_ok!(second.purchase("Parsnip Seeds", 10));
    }
}

/// DAY SYNC TESTS
mod day_sync_tests {
    use super::*;

    /// Ending the day saves, delivers tomorrow's mail and restocks
    #[tokio::test]
    async fn day_end_rolls_over_after_background_save() {
        let dir = save_dir("rollover");
        let mut world = HostWorld::new(&dir);
        world.add_player(1);
        let letter =
            ActionRequest::set_mail(TargetSelector::All, "robinLetter", MailTiming::Tomorrow, true);
        world.perform(&letter, &session_peers()[..1]);
        assert_eq!(world.purchase_stock("ShopA/Global/Eggs", 5, 5), Ok(0));

        assert!(world.request_day_end());
        assert!(!world.request_day_end());
        assert_eq!(world.day(), 1);

        assert_eq!(tick_until_new_day(&mut world).await, Some(2));
        assert!(!world.day_sync_pending());
        assert!(world.player(1).unwrap().mailbox.contains("robinLetter"));
        assert!(world.player(1).unwrap().mail_for_tomorrow.is_empty());
        assert!(world.team().limited_stock.is_empty());
        assert!(dir.join("day-1.bin").exists());

        assert!(world.request_day_end());
        assert_eq!(tick_until_new_day(&mut world).await, Some(3));
    }
}

/// END TO END NETWORK TESTS
mod network_tests {
    use super::*;

    async fn start_server(name: &str) -> String {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            tick_duration: Duration::from_millis(5),
            save_dir: save_dir(name),
            ..ServerConfig::default()
        };
        let mut server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn connect(addr: &str) -> Client {
        let mut client = Client::new(addr, sample_shop("ShopA"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_ok!(client.connect().await);
        client
    }

    /// Two peers see each other's purchases and the same day rollover
    #[tokio::test]
    async fn peers_share_stock_and_days_over_udp() {
        let addr = start_server("udp").await;
        let mut first = connect(&addr).await;
        let mut second = connect(&addr).await;

        assert_ne!(first.session().peer_id(), second.session().peer_id());
        assert_eq!(first.session().day(), 1);

        assert_ok!(first.buy("Eggs", 2).await);
        let snapshot = second
            .wait_for(|packet| matches!(packet, Packet::StockSnapshot { .. }))
            .await
            .unwrap();
        assert!(snapshot.is_some());
        assert_eq!(second.session().view().entries[0].stock, 3);

        let day = first.end_day().await.unwrap();
        assert_eq!(day, Some(2));
        let started = second
            .wait_for(|packet| matches!(packet, Packet::DayStarted { .. }))
            .await
            .unwrap();
        assert_eq!(started, Some(Packet::DayStarted { day: 2 }));
        assert_eq!(second.session().view().entries[0].stock, 5);

        assert_ok!(first.disconnect().await);
        assert_ok!(second.disconnect().await);
    }

    /// A peer buying from a stale view is refused and then sees the real count
    #[tokio::test]
    async fn stale_purchase_is_refused_over_udp() {
        let addr = start_server("refused").await;
        let mut first = connect(&addr).await;
        let mut second = connect(&addr).await;

        assert_ok!(first.buy("Eggs", 5).await);

        // the second peer has not read the broadcast yet and still lists 5
        let refused = second.buy("Eggs", 3).await.unwrap_err();
        assert_eq!(
            refused.downcast_ref::<PurchaseError>(),
            Some(&PurchaseError::Refused { available: 0 })
        );

        let eggs = &second.session().view().entries[0];
        assert_eq!(eggs.item.sync_key.as_deref(), Some("Eggs1"));
        assert_eq!(eggs.stock, 3);

        assert_ok!(first.disconnect().await);
        assert_ok!(second.disconnect().await);
    }

    /// A mail action sent by a peer comes back in its player snapshot
    #[tokio::test]
    async fn mail_action_round_trips_through_host() {
        let addr = start_server("mail").await;
        let mut peer = connect(&addr).await;
        let peer_id = peer.session().peer_id().unwrap();

        let request = ActionRequest::set_mail(
            TargetSelector::Peers(vec![peer_id]),
            "jojaMail",
            MailTiming::Received,
            true,
        );
        assert_ok!(peer.send_action(&request).await);
        let snapshot = peer
            .wait_for(|packet| matches!(packet, Packet::PlayerSnapshot { .. }))
            .await
            .unwrap();

        assert!(snapshot.is_some());
        assert!(peer.session().flags().mail_received.contains("jojaMail"));
    }
}
