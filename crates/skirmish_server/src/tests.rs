
// Include tests
#[cfg(test)]
mod tests {
    use crate::game::{Game, JoinError, Team, TeamSelect};
    use crate::session::Session;
    use crate::*;
    use futures::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Duration};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn join_frame(game: &str, nick: &str) -> Utf8Bytes {
        format!(r#"{{"type":"join","game":"{game}","nick":"{nick}"}}"#).into()
    }

    async fn outbound_json(session: &Arc<Session>) -> serde_json::Value {
        let message = session
            .try_next_outbound()
            .await
            .expect("expected a queued outbound frame");
        let text = message.into_text().expect("expected a text frame");
        serde_json::from_str(text.as_str()).expect("expected a JSON frame")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_queued_before_handshake_flush_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let session = Session::new(peer);
            // Enqueue while the handshake has not even started.
            session.write("W1".into());
            session.write("W2".into());
            session.write("W3".into());
            session.clone().run(stream).await.unwrap();
        });

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        for expected in ["W1", "W2", "W3"] {
            let message = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for flushed frame")
                .unwrap()
                .unwrap();
            assert_eq!(message.into_text().unwrap().as_str(), expected);
        }

        ws.close(None).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn join_creates_room_and_replies_joined() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        let handler = registry.register(&session).await;

        handler(join_frame("alpha", "a"), session.clone()).await;

        let game = registry.game("alpha").await.expect("game should exist");
        assert_eq!(game.player_count().await, 1);
        assert!(game.team_of(session.id()).await.is_some());
        assert_eq!(
            registry.correlation_of(session.id()).await,
            Some(Some("alpha".to_string()))
        );
        assert!(!registry.is_unidentified(session.id()).await);

        let reply = outbound_json(&session).await;
        assert_eq!(reply["type"], "join-result");
        assert_eq!(reply["result"], "joined");
        assert!(reply["my_id"].is_u64());
        assert_eq!(reply["players"].as_array().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ten_joins_fill_both_teams_and_eleventh_is_refused() {
        let registry = SessionRegistry::new();
        let mut sessions = Vec::new();

        for i in 0..10 {
            let session = Session::new(test_addr());
            let handler = registry.register(&session).await;
            handler(join_frame("full", &format!("p{i}")), session.clone()).await;
            let reply = outbound_json(&session).await;
            assert_eq!(reply["result"], "joined");
            sessions.push(session);
        }

        let game = registry.game("full").await.unwrap();
        assert_eq!(game.player_count().await, 10);

        let mut team_a = 0;
        let mut team_b = 0;
        for session in &sessions {
            match game.team_of(session.id()).await.unwrap() {
                Team::A => team_a += 1,
                Team::B => team_b += 1,
            }
        }
        assert_eq!((team_a, team_b), (5, 5));

        // The eleventh join is refused and nothing changes.
        let latecomer = Session::new(test_addr());
        let handler = registry.register(&latecomer).await;
        handler(join_frame("full", "p10"), latecomer.clone()).await;

        let reply = outbound_json(&latecomer).await;
        assert_eq!(reply["type"], "join-result");
        assert_eq!(reply["result"], "full");
        assert!(reply.get("my_id").is_none());
        assert!(registry.is_unidentified(latecomer.id()).await);
        assert_eq!(registry.correlation_of(latecomer.id()).await, Some(None));
        assert_eq!(game.player_count().await, 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broadcast_reaches_every_member_exactly_once() {
        let registry = SessionRegistry::new();
        let first = Session::new(test_addr());
        let second = Session::new(test_addr());

        for session in [&first, &second] {
            let handler = registry.register(session).await;
            handler(join_frame("br", "n"), (*session).clone()).await;
            let reply = outbound_json(session).await;
            assert_eq!(reply["result"], "joined");
        }

        // The first member sends a frame through its installed game handler.
        let game_handler = first.current_handler().await.unwrap();
        game_handler("X".into(), first.clone()).await;

        for session in [&first, &second] {
            let message = session.try_next_outbound().await.expect("missing broadcast");
            assert_eq!(message.into_text().unwrap().as_str(), "X");
            assert!(session.try_next_outbound().await.is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn last_leaver_removes_game_and_correlation() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        let handler = registry.register(&session).await;
        handler(join_frame("solo", "s"), session.clone()).await;
        assert_eq!(registry.game_count().await, 1);

        registry.unregister(session.id()).await;

        assert_eq!(registry.correlation_of(session.id()).await, None);
        assert!(registry.game("solo").await.is_none());
        assert_eq!(registry.game_count().await, 0);
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_type_gets_one_warning_and_no_state_change() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        let handler = registry.register(&session).await;

        handler(r#"{"type":"ping"}"#.into(), session.clone()).await;

        let reply = outbound_json(&session).await;
        assert_eq!(reply["type"], "warning");
        assert_eq!(reply["message"], "Received an unidentified package.");
        assert_eq!(reply["closed"], false);
        assert!(session.try_next_outbound().await.is_none());

        assert!(registry.is_unidentified(session.id()).await);
        assert_eq!(registry.correlation_of(session.id()).await, Some(None));
        assert_eq!(registry.game_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_json_gets_a_warning() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        let handler = registry.register(&session).await;

        handler("not json at all".into(), session.clone()).await;

        let reply = outbound_json(&session).await;
        assert_eq!(reply["type"], "warning");
        assert!(registry.is_unidentified(session.id()).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        registry.register(&session).await;

        registry.unregister(session.id()).await;
        assert_eq!(registry.correlation_of(session.id()).await, None);

        // The second call is a warning-logging no-op.
        registry.unregister(session.id()).await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_register_leaves_state_unchanged() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        registry.register(&session).await;
        registry.register(&session).await;

        assert_eq!(registry.session_count().await, 1);
        assert!(registry.is_unidentified(session.id()).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unregister_after_shutdown_is_a_noop() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        registry.register(&session).await;

        registry.shutdown();
        registry.unregister(session.id()).await;

        // State is frozen; cleanup is left to process exit.
        assert!(registry.is_stopped());
        assert_eq!(registry.correlation_of(session.id()).await, Some(None));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_joins_accepted_after_shutdown() {
        let registry = SessionRegistry::new();
        let session = Session::new(test_addr());
        let handler = registry.register(&session).await;

        registry.shutdown();
        handler(join_frame("late", "l"), session.clone()).await;

        assert!(session.try_next_outbound().await.is_none());
        assert_eq!(registry.game_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leave_then_rejoin_lands_on_the_other_team() {
        let game = Game::new("g");
        let session = Session::new(test_addr());

        game.join(&session, "n", TeamSelect::A).await.unwrap();
        assert!(game.leave(session.id()).await);
        game.join(&session, "n", TeamSelect::B).await.unwrap();

        assert_eq!(game.team_of(session.id()).await, Some(Team::B));
        assert_eq!(game.player_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn explicit_team_join_does_not_spill_when_full() {
        let game = Game::new("g");
        for i in 0..5 {
            let session = Session::new(test_addr());
            game.join(&session, &format!("a{i}"), TeamSelect::A)
                .await
                .unwrap();
        }

        let sixth = Session::new(test_addr());
        let result = game.join(&sixth, "a5", TeamSelect::A).await;
        assert!(matches!(result, Err(JoinError::Full)));
        assert_eq!(game.player_count().await, 5);
        assert_eq!(game.team_of(sixth.id()).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn random_joins_balance_with_ties_toward_team_a() {
        let game = Game::new("g");

        let first = Session::new(test_addr());
        game.join(&first, "p0", TeamSelect::Random).await.unwrap();
        assert_eq!(game.team_of(first.id()).await, Some(Team::A));

        let second = Session::new(test_addr());
        game.join(&second, "p1", TeamSelect::Random).await.unwrap();
        assert_eq!(game.team_of(second.id()).await, Some(Team::B));

        let third = Session::new(test_addr());
        game.join(&third, "p2", TeamSelect::Random).await.unwrap();
        assert_eq!(game.team_of(third.id()).await, Some(Team::A));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejoining_the_same_game_is_refused() {
        let game = Game::new("g");
        let session = Session::new(test_addr());

        game.join(&session, "n", TeamSelect::Random).await.unwrap();
        let again = game.join(&session, "n", TeamSelect::Random).await;
        assert!(matches!(again, Err(JoinError::AlreadyJoined)));
        assert_eq!(game.player_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn player_ids_are_unique_within_a_game() {
        let game = Game::new("g");
        let mut seen = std::collections::HashSet::new();
        for i in 0..6 {
            let session = Session::new(test_addr());
            let join = game
                .join(&session, &format!("p{i}"), TeamSelect::Random)
                .await
                .unwrap();
            assert!(seen.insert(join.player_id));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snapshot_carries_one_object_per_player() {
        let game = Game::new("g");
        for i in 0..3 {
            let session = Session::new(test_addr());
            game.join(&session, &format!("p{i}"), TeamSelect::Random)
                .await
                .unwrap();
        }

        let snapshot = game.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        for player in &snapshot {
            assert!(player["id"].is_u64());
            assert!(player["nick"].is_string());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed_session_drops_writes() {
        let session = Session::new(test_addr());
        session.close();
        session.close(); // idempotent
        session.write("late".into());

        let first = session.try_next_outbound().await.unwrap();
        assert!(matches!(first, Message::Close(_)));
        assert!(session.try_next_outbound().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.connection_timeout, 60);
    }

    async fn started_server() -> (Arc<GameServer>, SocketAddr) {
        let config = ServerConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = Arc::new(GameServer::new(config));

        let runner = server.clone();
        tokio::spawn(async move {
            let _ = runner.start().await;
        });

        for _ in 0..100 {
            if let Some(addr) = server.local_addr() {
                return (server, addr);
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("server did not start in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn websocket_join_round_trip() {
        let (server, addr) = started_server().await;

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(Message::text(r#"{"type":"join","game":"e2e","nick":"n"}"#))
            .await
            .unwrap();

        let reply = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for join reply")
            .unwrap()
            .unwrap();
        let reply: serde_json::Value =
            serde_json::from_str(reply.into_text().unwrap().as_str()).unwrap();
        assert_eq!(reply["type"], "join-result");
        assert_eq!(reply["result"], "joined");

        let registry = server.registry();
        assert_eq!(registry.game_count().await, 1);
        assert_eq!(registry.session_count().await, 1);

        // Disconnect and wait for the last-leaver cleanup.
        ws.close(None).await.unwrap();
        for _ in 0..100 {
            if registry.session_count().await == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.game_count().await, 0);

        server.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn websocket_broadcast_between_two_clients() {
        let (server, addr) = started_server().await;

        let (mut first, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let (mut second, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        for ws in [&mut first, &mut second] {
            ws.send(Message::text(r#"{"type":"join","game":"arena","nick":"n"}"#))
                .await
                .unwrap();
            let reply = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for join reply")
                .unwrap()
                .unwrap();
            let reply: serde_json::Value =
                serde_json::from_str(reply.into_text().unwrap().as_str()).unwrap();
            assert_eq!(reply["result"], "joined");
        }

        first.send(Message::text("X")).await.unwrap();

        for ws in [&mut first, &mut second] {
            let message = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for broadcast")
                .unwrap()
                .unwrap();
            assert_eq!(message.into_text().unwrap().as_str(), "X");
        }

        server.shutdown().await.unwrap();
    }
}
