//! Client scenario tests.
//!
//! Two or three clients exchange frames by hand, standing in for the relay,
//! on a shared [`MockEnv`] clock.

use std::time::Duration;

use chatspace_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, ConnectionStatus, LogLevel,
    PresenceCounts, PresenceStatus,
};
use chatspace_core::{Environment, env::test_utils::MockEnv};
use chatspace_crypto::{Channel, Identity};

fn client(env: &MockEnv, secret: u8, session: &str, name: &str) -> Client<MockEnv> {
    let mut client = Client::with_session_id(
        env.clone(),
        ClientConfig::default(),
        Some(Identity::from_secret([secret; 32])),
        session,
    );
    client.set_name(name);
    client
}

/// Join `token` and complete the socket handshake.
fn join(client: &mut Client<MockEnv>, token: &str) -> Vec<ClientAction> {
    let mut actions = client.handle(ClientEvent::JoinRoom { token: token.to_string() }).unwrap();
    actions.extend(client.handle(ClientEvent::Connected).unwrap());
    actions
}

fn frames(actions: &[ClientAction]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|action| match action {
            ClientAction::Send(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

fn deliver(client: &mut Client<MockEnv>, frames: &[String]) -> Vec<ClientAction> {
    frames
        .iter()
        .flat_map(|frame| client.handle(ClientEvent::FrameReceived(frame.clone())).unwrap())
        .collect()
}

fn tick(client: &mut Client<MockEnv>, env: &MockEnv) -> Vec<ClientAction> {
    client.handle(ClientEvent::Tick { now: env.now() }).unwrap()
}

fn type_text(client: &mut Client<MockEnv>, text: &str) -> Vec<String> {
    let caret = text.encode_utf16().count() as i64;
    let actions = client
        .handle(ClientEvent::TextInput { text: text.to_string(), caret_offset: caret })
        .unwrap();
    frames(&actions)
}

#[test]
fn typed_text_appears_at_peer() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "abc123");
    join(&mut bob, "abc123");
    alice.handle(ClientEvent::FocusChanged { focused: true }).unwrap();

    let sent = type_text(&mut alice, "hi");
    assert_eq!(sent.len(), 1);

    let actions = deliver(&mut bob, &sent);
    let view = actions
        .iter()
        .find_map(|action| match action {
            ClientAction::PresenceUpserted(view) => Some(view.clone()),
            _ => None,
        })
        .expect("bob renders alice");

    let alice_fp = alice.fingerprint().unwrap();
    assert_eq!(view.fingerprint, alice_fp.to_hex());
    assert_eq!(view.short_fingerprint, alice_fp.short());
    assert_eq!(view.session_id, "alice-tab");
    assert_eq!(view.user_name, "Alice");
    assert_eq!(view.text, "hi");
    assert_eq!(view.caret_offset, 2);
    assert_eq!(view.status, PresenceStatus::Typing);
    assert!(!view.is_friend);
    assert!(actions.iter().any(|action| matches!(
        action,
        ClientAction::CountsChanged(PresenceCounts { online: 1, typing: 1, idle: 0 })
    )));
}

#[test]
fn join_derives_channel_and_connects() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");

    let actions = alice.handle(ClientEvent::JoinRoom { token: " abc123 ".to_string() }).unwrap();

    let channel = Channel::derive("abc123");
    assert!(actions.iter().any(|action| matches!(
        action,
        ClientAction::Connect { channel_name } if channel_name == channel.name()
    )));
    assert_eq!(alice.room_token(), Some("abc123"));
    assert_eq!(alice.status(), ConnectionStatus::Connecting);

    let connected = alice.handle(ClientEvent::Connected).unwrap();
    assert_eq!(alice.status(), ConnectionStatus::Online);
    assert_eq!(frames(&connected).len(), 1, "connecting announces current state");
}

#[test]
fn clear_followed_by_update_never_flickers() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut bob, "room");

    deliver(&mut bob, &type_text(&mut alice, "hello"));
    let cleared = deliver(&mut bob, &type_text(&mut alice, ""));
    assert!(!cleared.iter().any(|a| matches!(a, ClientAction::PresenceRemoved { .. })));

    env.advance(Duration::from_millis(400));
    deliver(&mut bob, &type_text(&mut alice, "hello again"));

    env.advance(Duration::from_millis(1_000));
    let actions = tick(&mut bob, &env);
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::PresenceRemoved { .. })));

    let record = bob.presence().records().next().unwrap();
    assert_eq!(record.text, "hello again");
    assert_eq!(record.status(), PresenceStatus::Typing);
}

#[test]
fn clear_applies_after_delay() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut bob, "room");

    deliver(&mut bob, &type_text(&mut alice, "hello"));
    deliver(&mut bob, &type_text(&mut alice, ""));

    env.advance(Duration::from_millis(999));
    assert_eq!(bob.presence().records().next().unwrap().text, "hello");

    env.advance(Duration::from_millis(1));
    let actions = tick(&mut bob, &env);
    let record = bob.presence().records().next().unwrap();
    assert_eq!(record.status(), PresenceStatus::Idle);
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::PresenceUpserted(view) if view.status == PresenceStatus::Idle
    )));
}

#[test]
fn silent_peer_is_evicted_after_ten_seconds() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut bob, "room");
    deliver(&mut bob, &type_text(&mut alice, "hello"));

    env.advance(Duration::from_secs(10));
    tick(&mut bob, &env);
    assert_eq!(bob.presence().len(), 1);

    env.advance(Duration::from_millis(1));
    let actions = tick(&mut bob, &env);
    assert!(bob.presence().is_empty());
    assert!(actions.iter().any(|a| matches!(a, ClientAction::PresenceRemoved { .. })));
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::CountsChanged(PresenceCounts { online: 0, .. })
    )));
}

#[test]
fn heartbeat_keeps_peer_alive() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut bob, "room");
    deliver(&mut bob, &type_text(&mut alice, "hello"));

    for _ in 0..30 {
        env.advance(Duration::from_secs(1));
        let sent = frames(&tick(&mut alice, &env));
        deliver(&mut bob, &sent);
        tick(&mut bob, &env);
    }

    assert_eq!(bob.presence().len(), 1);
}

#[test]
fn flash_fires_once_for_first_comment_when_unfocused() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut carol = client(&env, 3, "carol-tab", "Carol");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut carol, "room");
    join(&mut bob, "room");
    bob.handle(ClientEvent::VisibilityChanged { hidden: true }).unwrap();

    let first = deliver(&mut bob, &type_text(&mut alice, "hi"));
    assert!(first.iter().any(|a| matches!(a, ClientAction::Flash)));
    let notification = first.iter().find_map(|a| match a {
        ClientAction::Notify(n) => Some(n.clone()),
        _ => None,
    });
    assert_eq!(notification.map(|n| (n.title, n.body)), Some(("Alice".to_string(), "hi".to_string())));

    let second = deliver(&mut bob, &type_text(&mut carol, "yo"));
    assert!(!second.iter().any(|a| matches!(a, ClientAction::Flash)));
}

#[test]
fn no_flash_while_typing_or_within_cooldown() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut bob, "room");

    bob.handle(ClientEvent::FocusChanged { focused: true }).unwrap();
    let focused = deliver(&mut bob, &type_text(&mut alice, "hi"));
    assert!(!focused.iter().any(|a| matches!(a, ClientAction::Flash)));

    bob.handle(ClientEvent::FocusChanged { focused: false }).unwrap();
    deliver(&mut bob, &frames(&alice.handle(ClientEvent::Commit).unwrap()));
    env.advance(Duration::from_secs(1));
    tick(&mut bob, &env);
    let first = deliver(&mut bob, &type_text(&mut alice, "again"));
    assert!(first.iter().any(|a| matches!(a, ClientAction::Flash)));
    assert!(!first.iter().any(|a| matches!(a, ClientAction::Notify(_))), "visible page");

    deliver(&mut bob, &frames(&alice.handle(ClientEvent::Commit).unwrap()));
    env.advance(Duration::from_secs(1));
    tick(&mut bob, &env);
    let within = deliver(&mut bob, &type_text(&mut alice, "third"));
    assert!(!within.iter().any(|a| matches!(a, ClientAction::Flash)));
}

#[test]
fn mismatched_session_invite_is_ignored() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "");
    join(&mut bob, "");

    let invite = bob
        .handle(ClientEvent::InvitePeer {
            fingerprint: alice.fingerprint().unwrap(),
            session_id: "someone-elses-tab".to_string(),
        })
        .unwrap();

    let actions = deliver(&mut alice, &frames(&invite));
    assert!(frames(&actions).is_empty(), "no reply");
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::InviteReceived { .. })));
    assert!(alice.invites().is_empty());
}

#[test]
fn invite_handshake_lands_both_in_the_same_room() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    let mut eve = client(&env, 5, "eve-tab", "Eve");
    join(&mut alice, "");
    join(&mut bob, "");
    join(&mut eve, "");

    let invite = frames(
        &alice
            .handle(ClientEvent::InvitePeer {
                fingerprint: bob.fingerprint().unwrap(),
                session_id: "bob-tab".to_string(),
            })
            .unwrap(),
    );
    assert!(alice.invites().is_pending(&bob.fingerprint().unwrap()));

    let eve_sees = deliver(&mut eve, &invite);
    assert!(frames(&eve_sees).is_empty());

    let bob_actions = deliver(&mut bob, &invite);
    let bob_token = bob_actions
        .iter()
        .find_map(|a| match a {
            ClientAction::InviteReceived { token, from, from_session, name } => {
                assert_eq!(*from, alice.fingerprint().unwrap());
                assert_eq!(from_session, "alice-tab");
                assert_eq!(name, "Alice");
                Some(token.clone())
            },
            _ => None,
        })
        .expect("bob is asked");
    assert_eq!(bob.room_token(), Some(""), "invitee waits for the user");

    let reply = frames(&bob_actions);
    assert_eq!(reply.len(), 1);
    assert!(frames(&deliver(&mut eve, &reply)).is_empty());

    let alice_actions = deliver(&mut alice, &reply);
    assert!(alice_actions.iter().any(|a| matches!(
        a,
        ClientAction::RoomChanged { token, .. } if *token == bob_token
    )));
    assert_eq!(alice.room_token(), Some(bob_token.as_str()));
    assert!(alice.invites().is_empty());

    // Alice moved rooms, so old-room frames no longer decrypt.
    let stale = deliver(&mut alice, &reply);
    assert!(stale.iter().all(|a| matches!(a, ClientAction::Log { level: LogLevel::Debug, .. })));

    bob.handle(ClientEvent::JoinRoom { token: bob_token.clone() }).unwrap();
    assert_eq!(alice.channel_name(), bob.channel_name());
}

#[test]
fn duplicate_reply_is_logged_and_ignored() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "");
    join(&mut bob, "");

    let invite = frames(
        &alice
            .handle(ClientEvent::InvitePeer {
                fingerprint: bob.fingerprint().unwrap(),
                session_id: "bob-tab".to_string(),
            })
            .unwrap(),
    );
    let reply = frames(&deliver(&mut bob, &invite));

    // A second tab of alice in the public room never invited bob.
    let mut alice_again = Client::with_session_id(
        env.clone(),
        ClientConfig::default(),
        Some(Identity::from_secret([1; 32])),
        "alice-tab",
    );
    join(&mut alice_again, "");

    let actions = deliver(&mut alice_again, &reply);
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::Log { level: LogLevel::Info, message } if message.contains("stale")
    )));
    assert_eq!(alice_again.room_token(), Some(""));
}

#[test]
fn invite_requires_identity_and_room() {
    let env = MockEnv::new();
    let mut anonymous =
        Client::with_session_id(env.clone(), ClientConfig::default(), None, "anon-tab");
    let peer = Identity::from_secret([2; 32]).fingerprint();
    let invite = || ClientEvent::InvitePeer { fingerprint: peer, session_id: "x".to_string() };

    assert_eq!(anonymous.handle(invite()).unwrap_err(), ClientError::KeyUnavailable);

    let mut roomless = client(&env, 1, "tab", "A");
    assert_eq!(roomless.handle(invite()).unwrap_err(), ClientError::NotInRoom);
}

#[test]
fn sends_without_identity_are_skipped() {
    let env = MockEnv::new();
    let mut anonymous =
        Client::with_session_id(env.clone(), ClientConfig::default(), None, "anon-tab");
    join(&mut anonymous, "room");

    let actions = anonymous
        .handle(ClientEvent::TextInput { text: "hi".to_string(), caret_offset: 2 })
        .unwrap();
    assert!(frames(&actions).is_empty());
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Log { level: LogLevel::Warn, .. })));

    anonymous.set_identity(Identity::from_secret([4; 32]));
    env.advance(Duration::from_secs(4));
    assert_eq!(frames(&tick(&mut anonymous, &env)).len(), 1, "heartbeat retries");
}

#[test]
fn invalid_private_key_keeps_identity() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let before = alice.fingerprint();

    let result = alice.handle(ClientEvent::ImportPrivateKey { private_key: "AAAA".to_string() });
    assert!(matches!(result, Err(ClientError::InvalidLocalKey(_))));
    assert_eq!(alice.fingerprint(), before);

    let replacement = Identity::from_secret([9; 32]);
    let actions = alice
        .handle(ClientEvent::ImportPrivateKey {
            private_key: replacement.export_private_key().to_string(),
        })
        .unwrap();
    assert_eq!(alice.fingerprint(), Some(replacement.fingerprint()));
    assert!(actions.iter().any(|a| matches!(a, ClientAction::PersistIdentity(_))));
}

#[test]
fn foreign_and_garbage_frames_are_dropped() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room-a");
    join(&mut bob, "room-b");

    let foreign = deliver(&mut bob, &type_text(&mut alice, "secret"));
    assert!(bob.presence().is_empty());
    assert!(foreign.iter().all(|a| matches!(a, ClientAction::Log { level: LogLevel::Debug, .. })));

    let garbage = deliver(&mut bob, &["{not json".to_string()]);
    assert!(garbage.iter().all(|a| matches!(a, ClientAction::Log { level: LogLevel::Warn, .. })));
    assert_eq!(bob.status(), ConnectionStatus::Online);
}

#[test]
fn own_echo_is_ignored_but_other_tabs_are_shown() {
    let env = MockEnv::new();
    let mut tab_one = client(&env, 1, "tab-one", "Alice");
    let mut tab_two = client(&env, 1, "tab-two", "Alice");
    join(&mut tab_one, "room");
    join(&mut tab_two, "room");

    let sent = type_text(&mut tab_one, "hi");
    deliver(&mut tab_one, &sent);
    assert!(tab_one.presence().is_empty());

    deliver(&mut tab_two, &sent);
    assert_eq!(tab_two.presence().len(), 1);
}

#[test]
fn close_schedules_reconnect() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    join(&mut alice, "room");

    let closed = alice.handle(ClientEvent::Disconnected { reason: "reset".to_string() }).unwrap();
    assert!(closed.iter().any(|a| matches!(a, ClientAction::StatusChanged(ConnectionStatus::Offline))));
    assert!(tick(&mut alice, &env).iter().all(|a| !matches!(a, ClientAction::Connect { .. })));

    env.advance(Duration::from_millis(50));
    let actions = tick(&mut alice, &env);
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Connect { .. })));
    assert_eq!(alice.status(), ConnectionStatus::Connecting);
}

#[test]
fn hidden_page_does_not_reconnect_until_visible() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    join(&mut alice, "room");
    alice.handle(ClientEvent::VisibilityChanged { hidden: true }).unwrap();
    alice.handle(ClientEvent::Disconnected { reason: "sleep".to_string() }).unwrap();

    env.advance(Duration::from_secs(1));
    assert!(tick(&mut alice, &env).iter().all(|a| !matches!(a, ClientAction::Connect { .. })));

    let shown = alice.handle(ClientEvent::VisibilityChanged { hidden: false }).unwrap();
    assert!(shown.iter().any(|a| matches!(a, ClientAction::Connect { .. })));
}

#[test]
fn blur_commits_after_fifteen_seconds() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    join(&mut alice, "room");
    alice.handle(ClientEvent::FocusChanged { focused: true }).unwrap();
    type_text(&mut alice, "draft");
    alice.handle(ClientEvent::FocusChanged { focused: false }).unwrap();

    env.advance(Duration::from_secs(14));
    let early = tick(&mut alice, &env);
    assert!(!early.iter().any(|a| matches!(a, ClientAction::ComposerCleared)));

    env.advance(Duration::from_secs(1));
    let actions = tick(&mut alice, &env);
    assert!(actions.iter().any(|a| matches!(a, ClientAction::ComposerCleared)));
    assert_eq!(alice.composer().text(), "");
}

#[test]
fn refocus_cancels_blur_commit() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    join(&mut alice, "room");
    type_text(&mut alice, "draft");
    alice.handle(ClientEvent::FocusChanged { focused: false }).unwrap();
    env.advance(Duration::from_secs(10));
    alice.handle(ClientEvent::FocusChanged { focused: true }).unwrap();

    env.advance(Duration::from_secs(10));
    let actions = tick(&mut alice, &env);
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::ComposerCleared)));
    assert_eq!(alice.composer().text(), "draft");
}

#[test]
fn friends_are_marked_in_views() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");
    let mut bob = client(&env, 2, "bob-tab", "Bob");
    join(&mut alice, "room");
    join(&mut bob, "room");
    deliver(&mut bob, &type_text(&mut alice, "hi"));

    let actions = bob
        .handle(ClientEvent::AddFriend {
            fingerprint: alice.fingerprint().unwrap(),
            name: "Alice".to_string(),
        })
        .unwrap();

    assert!(actions.iter().any(|a| matches!(a, ClientAction::FriendsChanged(f) if f.len() == 1)));
    assert!(actions.iter().any(|a| matches!(a, ClientAction::PresenceUpserted(v) if v.is_friend)));
}

#[test]
fn random_room_token_is_uuid_shaped() {
    let env = MockEnv::new();
    let mut alice = client(&env, 1, "alice-tab", "Alice");

    alice.handle(ClientEvent::JoinRandomRoom).unwrap();

    let token = alice.room_token().unwrap();
    assert_eq!(token.len(), 36);
    assert_eq!(token.chars().filter(|c| *c == '-').count(), 4);
}
