//! Client state machine.
//!
//! The `Client` owns everything one browser tab would: the identity, the
//! current room, the composer, the presence records of peers and the
//! outstanding invites. Every input is a [`ClientEvent`]; every effect is a
//! [`ClientAction`].

use std::{collections::BTreeMap, time::Duration};

use chatspace_core::{Environment, LogLevel, Scheduler, TaskId};
use chatspace_crypto::{Channel, Fingerprint, Identity, random_room_token};
use chatspace_proto::{Command, Envelope, InviteMessage, NO_CARET, PresenceUpdate};

use crate::{
    composer::{BLUR_COMMIT_AFTER, Composer, HEARTBEAT_AFTER, SendContext},
    error::ClientError,
    event::{ClientAction, ClientEvent, ConnectionStatus, Notification, PresenceView},
    invite::{InviteBook, is_addressed_to, respond},
    presence::{
        FlashLimiter, PresenceChange, PresenceCounts, PresenceKey, PresenceStatus, PresenceTracker,
        UpdateKind,
    },
};

/// Minimum time between two flashes.
pub const FLASH_COOLDOWN: Duration = Duration::from_secs(5);

/// Delay before reconnecting after the socket closes.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// Name shown for peers that did not set one.
pub const ANONYMOUS: &str = "Anonymous";

/// Notification tag for comment notifications.
const NOTIFICATION_TAG: &str = "chatspace.comment";

/// Client timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Resend the local state after this long without a send.
    pub heartbeat_after: Duration,
    /// Commit the text this long after the text box loses focus.
    pub blur_commit_after: Duration,
    /// Minimum time between flashes.
    pub flash_cooldown: Duration,
    /// Delay before reconnecting after a close.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_after: HEARTBEAT_AFTER,
            blur_commit_after: BLUR_COMMIT_AFTER,
            flash_cooldown: FLASH_COOLDOWN,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

#[derive(Debug)]
enum ClientTimer {
    BlurCommit,
    Reconnect,
}

struct Room {
    token: String,
    channel: Channel,
}

/// Client for a chatspace relay.
pub struct Client<E: Environment> {
    env: E,
    config: ClientConfig,
    identity: Option<Identity>,
    session_id: String,
    room: Option<Room>,
    status: ConnectionStatus,
    network_online: bool,
    hidden: bool,
    composer: Composer<E::Instant>,
    presence: PresenceTracker<E::Instant>,
    invites: InviteBook,
    friends: BTreeMap<Fingerprint, String>,
    flash: FlashLimiter<E::Instant>,
    timers: Scheduler<E::Instant, ClientTimer>,
    blur_commit: Option<TaskId>,
    reconnect: Option<TaskId>,
    counts: PresenceCounts,
}

impl<E: Environment> Client<E> {
    /// Create a client with a fresh random session identifier.
    ///
    /// Without an identity the client still receives, but every send is
    /// skipped until [`Client::set_identity`] is called.
    pub fn new(env: E, config: ClientConfig, identity: Option<Identity>) -> Self {
        let session_id = random_room_token(env.random_array());
        Self::with_session_id(env, config, identity, session_id)
    }

    /// Create a client with a fixed session identifier.
    pub fn with_session_id(
        env: E,
        config: ClientConfig,
        identity: Option<Identity>,
        session_id: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            composer: Composer::new(session_id.clone())
                .with_heartbeat_after(config.heartbeat_after),
            flash: FlashLimiter::new(config.flash_cooldown),
            env,
            config,
            identity,
            session_id,
            room: None,
            status: ConnectionStatus::Offline,
            network_online: true,
            hidden: false,
            presence: PresenceTracker::new(),
            invites: InviteBook::new(),
            friends: BTreeMap::new(),
            timers: Scheduler::new(),
            blur_commit: None,
            reconnect: None,
            counts: PresenceCounts::default(),
        }
    }

    /// Install the identity loaded by the persistence layer.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Replace the friends map loaded by the persistence layer.
    pub fn set_friends(&mut self, friends: BTreeMap<Fingerprint, String>) {
        self.friends = friends;
    }

    /// Set the display name without sending.
    pub fn set_name(&mut self, name: &str) {
        self.composer.set_name(name);
    }

    /// Current identity, if loaded.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Own fingerprint, if an identity is loaded.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.identity.as_ref().map(Identity::fingerprint)
    }

    /// This client's session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current room token.
    pub fn room_token(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.token.as_str())
    }

    /// Relay channel of the current room.
    pub fn channel_name(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.channel.name())
    }

    /// Connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Presence records of peers in the current room.
    pub fn presence(&self) -> &PresenceTracker<E::Instant> {
        &self.presence
    }

    /// Local composer state.
    pub fn composer(&self) -> &Composer<E::Instant> {
        &self.composer
    }

    /// Outstanding invites.
    pub fn invites(&self) -> &InviteBook {
        &self.invites
    }

    /// Friends map.
    pub fn friends(&self) -> &BTreeMap<Fingerprint, String> {
        &self.friends
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::FrameReceived(frame) => Ok(self.handle_frame(&frame)),
            ClientEvent::Connected => Ok(self.handle_connected()),
            ClientEvent::Disconnected { reason } => Ok(self.handle_disconnected(&reason)),
            ClientEvent::NetworkChanged { online } => Ok(self.handle_network_changed(online)),
            ClientEvent::TextInput { text, caret_offset } => {
                let now = self.env.now();
                let context = self.send_context();
                let command = self.composer.input(&text, caret_offset, now, context);
                Ok(self.send_optional(command))
            },
            ClientEvent::Commit => Ok(self.handle_commit()),
            ClientEvent::FocusChanged { focused } => Ok(self.handle_focus_changed(focused)),
            ClientEvent::VisibilityChanged { hidden } => Ok(self.handle_visibility_changed(hidden)),
            ClientEvent::NameChanged { name } => {
                self.composer.set_name(&name);
                Ok(self.send_forced())
            },
            ClientEvent::JoinRoom { token } => Ok(self.join_room(token.trim())),
            ClientEvent::JoinRandomRoom => {
                let token = random_room_token(self.env.random_array());
                Ok(self.join_room(&token))
            },
            ClientEvent::Reconnect => Ok(self.handle_reconnect()),
            ClientEvent::InvitePeer { fingerprint, session_id } => {
                self.handle_invite_peer(fingerprint, &session_id)
            },
            ClientEvent::ImportPrivateKey { private_key } => {
                self.handle_import_private_key(&private_key)
            },
            ClientEvent::AddFriend { fingerprint, name } => {
                self.friends.insert(fingerprint, name);
                Ok(self.friends_changed(&fingerprint))
            },
            ClientEvent::RemoveFriend { fingerprint } => {
                self.friends.remove(&fingerprint);
                Ok(self.friends_changed(&fingerprint))
            },
        }
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        for (id, timer) in self.timers.pop_due(now) {
            match timer {
                ClientTimer::BlurCommit => {
                    if self.blur_commit == Some(id) {
                        self.blur_commit = None;
                    }
                    actions.extend(self.handle_commit());
                },
                ClientTimer::Reconnect => {
                    if self.reconnect == Some(id) {
                        self.reconnect = None;
                    }
                    if self.network_online && !self.hidden {
                        actions.extend(self.connect());
                    }
                },
            }
        }

        let before = self.presence.counts();
        let changes = self.presence.tick(now);
        actions.extend(self.render(changes, before, now));

        if self.status == ConnectionStatus::Online {
            let context = self.send_context();
            let command = self.composer.heartbeat(now, context);
            actions.extend(self.send_optional(command));
        }

        actions
    }

    fn handle_connected(&mut self) -> Vec<ClientAction> {
        if self.room.is_none() {
            return vec![log(LogLevel::Warn, "socket opened without a room".to_string())];
        }
        let mut actions = self.set_status(ConnectionStatus::Online);
        actions.push(log(LogLevel::Info, format!("connected to {}", self.describe_room())));

        self.composer.reset_sent();
        actions.extend(self.send_forced());
        actions
    }

    fn handle_disconnected(&mut self, reason: &str) -> Vec<ClientAction> {
        let mut actions = self.set_status(ConnectionStatus::Offline);
        actions.push(log(LogLevel::Info, format!("socket closed: {reason}")));

        if self.room.is_some() && self.network_online && !self.hidden {
            self.cancel_reconnect();
            let fire_at = self.env.now() + self.config.reconnect_delay;
            self.reconnect = Some(self.timers.schedule(fire_at, ClientTimer::Reconnect));
        }
        actions
    }

    fn handle_network_changed(&mut self, online: bool) -> Vec<ClientAction> {
        self.network_online = online;
        if online { self.reconnect_if_offline() } else { Vec::new() }
    }

    fn handle_visibility_changed(&mut self, hidden: bool) -> Vec<ClientAction> {
        self.hidden = hidden;
        if hidden {
            return self.send_forced();
        }

        let mut actions = self.reconnect_if_offline();
        actions.extend(self.send_forced());
        actions
    }

    fn handle_reconnect(&mut self) -> Vec<ClientAction> {
        self.cancel_reconnect();
        self.reconnect_if_offline()
    }

    fn handle_commit(&mut self) -> Vec<ClientAction> {
        let now = self.env.now();
        let context = self.send_context();
        let command = self.composer.commit(now, context);
        let mut actions = vec![ClientAction::ComposerCleared];
        actions.extend(self.send_optional(command));
        actions
    }

    fn handle_focus_changed(&mut self, focused: bool) -> Vec<ClientAction> {
        self.composer.set_focused(focused);

        if focused {
            if let Some(id) = self.blur_commit.take() {
                self.timers.cancel(id);
            }
        } else if self.blur_commit.is_none() {
            let fire_at = self.env.now() + self.config.blur_commit_after;
            self.blur_commit = Some(self.timers.schedule(fire_at, ClientTimer::BlurCommit));
        }
        Vec::new()
    }

    fn handle_invite_peer(
        &mut self,
        fingerprint: Fingerprint,
        session_id: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.identity.is_none() {
            return Err(ClientError::KeyUnavailable);
        }
        if self.room.is_none() {
            return Err(ClientError::NotInRoom);
        }
        if self.fingerprint() == Some(fingerprint) && session_id == self.session_id {
            return Err(ClientError::InvalidInvite { reason: "cannot invite self".to_string() });
        }

        let message = self.invites.initiate(
            fingerprint,
            session_id,
            self.env.random_array(),
            &self.session_id,
            self.composer.name(),
        );

        let mut actions = vec![log(
            LogLevel::Info,
            format!("inviting {}_{session_id} to a private room", fingerprint.short()),
        )];
        actions.extend(self.send(&Command::RoomInvite(message)));
        Ok(actions)
    }

    fn handle_import_private_key(
        &mut self,
        private_key: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let identity =
            Identity::import_private_key(private_key).map_err(ClientError::InvalidLocalKey)?;

        let fingerprint = identity.fingerprint();
        let exported = identity.export();
        self.identity = Some(identity);
        self.invites.clear();

        Ok(vec![
            ClientAction::PersistIdentity(exported),
            log(LogLevel::Info, format!("identity replaced, fingerprint {}", fingerprint.short())),
        ])
    }

    fn friends_changed(&self, fingerprint: &Fingerprint) -> Vec<ClientAction> {
        let mut actions = vec![ClientAction::FriendsChanged(self.friends.clone())];
        actions.extend(
            self.presence
                .records_for(fingerprint)
                .filter(|record| record.is_visible())
                .map(|record| ClientAction::PresenceUpserted(self.view(&record.key))),
        );
        actions
    }

    fn handle_frame(&mut self, frame: &str) -> Vec<ClientAction> {
        let Some(room) = &self.room else {
            return vec![log(LogLevel::Debug, "frame received outside a room".to_string())];
        };

        let envelope = match Envelope::from_json(frame) {
            Ok(envelope) => envelope,
            Err(e) => return vec![log(LogLevel::Warn, format!("protocol violation: {e}"))],
        };

        let opened = match envelope.open::<Command>(room.channel.key()) {
            Ok(opened) => opened,
            Err(e) if e.is_foreign_traffic() => {
                return vec![log(LogLevel::Debug, format!("dropped frame: {e}"))];
            },
            Err(e) => return vec![log(LogLevel::Warn, format!("protocol violation: {e}"))],
        };

        let sender = opened.sender;
        let now = self.env.now();
        match opened.payload {
            Command::TextUpdated(update) => {
                self.receive_presence(sender, UpdateKind::Updated, &update, now)
            },
            Command::TextCleared(update) => {
                self.receive_presence(sender, UpdateKind::Cleared, &update, now)
            },
            Command::RoomInvite(invite) => self.receive_invite(sender, &invite),
            Command::RoomInviteReply(reply) => self.receive_invite_reply(sender, &reply),
        }
    }

    fn is_self(&self, sender: &Fingerprint, session_id: &str) -> bool {
        self.fingerprint().as_ref() == Some(sender) && session_id == self.session_id
    }

    fn receive_presence(
        &mut self,
        sender: Fingerprint,
        kind: UpdateKind,
        update: &PresenceUpdate,
        now: E::Instant,
    ) -> Vec<ClientAction> {
        if self.is_self(&sender, &update.session_id) {
            return Vec::new();
        }

        let before = self.presence.counts();
        let key = PresenceKey::new(sender, update.session_id.clone());
        let changes = self.presence.receive(key, kind, update, now);
        self.render(changes, before, now)
    }

    fn receive_invite(&mut self, sender: Fingerprint, invite: &InviteMessage) -> Vec<ClientAction> {
        let Some(own) = self.fingerprint() else {
            return vec![log(LogLevel::Debug, "invite ignored: no identity".to_string())];
        };
        if !is_addressed_to(invite, &own, &self.session_id) {
            return vec![log(LogLevel::Debug, "invite for another peer ignored".to_string())];
        }

        let (reply, token) = match respond(
            invite,
            &sender,
            self.env.random_array(),
            &self.session_id,
            self.composer.name(),
        ) {
            Ok(answer) => answer,
            Err(e) => {
                return vec![log(
                    LogLevel::Warn,
                    format!("invite from {} rejected: {e}", sender.short()),
                )];
            },
        };

        let mut actions = self.send(&Command::RoomInviteReply(reply));
        actions.push(ClientAction::InviteReceived {
            token,
            from: sender,
            from_session: invite.session_id.clone(),
            name: invite.name.clone(),
        });
        actions
    }

    fn receive_invite_reply(
        &mut self,
        sender: Fingerprint,
        reply: &InviteMessage,
    ) -> Vec<ClientAction> {
        let Some(own) = self.fingerprint() else {
            return vec![log(LogLevel::Debug, "invite reply ignored: no identity".to_string())];
        };
        if !is_addressed_to(reply, &own, &self.session_id) {
            return vec![log(LogLevel::Debug, "invite reply for another peer ignored".to_string())];
        }

        match self.invites.complete(&sender, reply) {
            Ok(Some(token)) => {
                let mut actions = vec![log(
                    LogLevel::Info,
                    format!("invite accepted by {}, joining private room", sender.short()),
                )];
                actions.extend(self.join_room(&token));
                actions
            },
            Ok(None) => vec![log(
                LogLevel::Info,
                format!("stale invite reply from {} ignored", sender.short()),
            )],
            Err(e) => vec![log(
                LogLevel::Warn,
                format!("invite reply from {} rejected: {e}", sender.short()),
            )],
        }
    }

    fn join_room(&mut self, token: &str) -> Vec<ClientAction> {
        let channel = Channel::derive(token);
        let mut actions = vec![ClientAction::RoomChanged {
            token: token.to_string(),
            channel_name: channel.name().to_string(),
        }];

        self.room = Some(Room { token: token.to_string(), channel });
        self.cancel_reconnect();
        actions.extend(self.connect());
        actions
    }

    fn reconnect_if_offline(&mut self) -> Vec<ClientAction> {
        if self.status == ConnectionStatus::Offline && self.room.is_some() {
            self.cancel_reconnect();
            self.connect()
        } else {
            Vec::new()
        }
    }

    /// Request a new socket for the current room, dropping peer state.
    fn connect(&mut self) -> Vec<ClientAction> {
        let Some(room) = &self.room else {
            return Vec::new();
        };
        let channel_name = room.channel.name().to_string();

        let mut actions: Vec<ClientAction> = self
            .presence
            .reset()
            .into_iter()
            .map(|key| ClientAction::PresenceRemoved { key })
            .collect();
        actions.extend(self.counts_changed());

        actions.push(ClientAction::Connect { channel_name });
        actions.extend(self.set_status(ConnectionStatus::Connecting));
        actions
    }

    fn cancel_reconnect(&mut self) {
        if let Some(id) = self.reconnect.take() {
            self.timers.cancel(id);
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) -> Vec<ClientAction> {
        if self.status == status {
            return Vec::new();
        }
        self.status = status;
        vec![ClientAction::StatusChanged(status)]
    }

    fn render(
        &mut self,
        changes: Vec<PresenceChange>,
        before: PresenceCounts,
        now: E::Instant,
    ) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        for change in changes {
            match change {
                PresenceChange::Upserted(key) => {
                    let visible = self.presence.get(&key).is_some_and(|record| record.is_visible());
                    if visible {
                        actions.push(ClientAction::PresenceUpserted(self.view(&key)));
                    } else {
                        actions.push(ClientAction::PresenceRemoved { key });
                    }
                },
                PresenceChange::Removed(key) => actions.push(ClientAction::PresenceRemoved { key }),
            }
        }

        let after = self.presence.counts();
        if before.typing == 0 && after.typing > 0 && !self.composer.is_focused() {
            actions.extend(self.flash(now));
        }
        actions.extend(self.counts_changed());
        actions
    }

    fn flash(&mut self, now: E::Instant) -> Vec<ClientAction> {
        if !self.flash.try_fire(now) {
            return Vec::new();
        }

        let mut actions = vec![ClientAction::Flash];
        if self.hidden {
            if let Some(record) = self.presence.records().find(|record| !record.text.is_empty()) {
                actions.push(ClientAction::Notify(Notification {
                    title: display_name(&record.name).to_string(),
                    body: record.text.clone(),
                    tag: NOTIFICATION_TAG.to_string(),
                    data: record.key.to_string(),
                }));
            }
        }
        actions
    }

    fn counts_changed(&mut self) -> Option<ClientAction> {
        let counts = self.presence.counts();
        if counts == self.counts {
            return None;
        }
        self.counts = counts;
        Some(ClientAction::CountsChanged(counts))
    }

    fn view(&self, key: &PresenceKey) -> PresenceView {
        let record = self.presence.get(key);
        PresenceView {
            fingerprint: key.fingerprint.to_hex(),
            short_fingerprint: key.fingerprint.short(),
            session_id: key.session_id.clone(),
            user_name: display_name(record.map_or("", |r| r.name.as_str())).to_string(),
            text: record.map(|r| r.text.clone()).unwrap_or_default(),
            caret_offset: record.map_or(NO_CARET, |r| r.caret_offset),
            is_friend: self.friends.contains_key(&key.fingerprint),
            status: record.map_or(PresenceStatus::Hidden, |r| r.status()),
        }
    }

    fn send_context(&self) -> SendContext {
        SendContext { is_active: !self.hidden, time: self.env.wall_clock_millis() }
    }

    fn send_forced(&mut self) -> Vec<ClientAction> {
        if self.status != ConnectionStatus::Online {
            return Vec::new();
        }
        let now = self.env.now();
        let context = self.send_context();
        let command = self.composer.update(true, now, context);
        self.send_optional(command)
    }

    fn send_optional(&mut self, command: Option<Command>) -> Vec<ClientAction> {
        command.map(|command| self.send(&command)).unwrap_or_default()
    }

    /// Seal `command` for the current room.
    ///
    /// Sends are abandoned, never queued, when the socket is not open or no
    /// identity is loaded; the next heartbeat carries the state instead.
    fn send(&self, command: &Command) -> Vec<ClientAction> {
        let Some(room) = &self.room else {
            return vec![log(LogLevel::Debug, format!("{} not sent: no room", command.name()))];
        };
        if self.status != ConnectionStatus::Online {
            return vec![log(LogLevel::Debug, format!("{} not sent: offline", command.name()))];
        }
        let Some(identity) = &self.identity else {
            return vec![log(
                LogLevel::Warn,
                format!("{} not sent: {}", command.name(), ClientError::KeyUnavailable),
            )];
        };

        let iv = self.env.random_array();
        match Envelope::seal(command, room.channel.key(), identity, iv).and_then(|e| e.to_json()) {
            Ok(frame) => vec![ClientAction::Send(frame)],
            Err(e) => vec![log(LogLevel::Error, format!("{} not sent: {e}", command.name()))],
        }
    }

    fn describe_room(&self) -> String {
        match self.room_token() {
            Some("") => "the public room".to_string(),
            Some(token) => format!("room #{token}"),
            None => "no room".to_string(),
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { ANONYMOUS } else { name }
}

fn log(level: LogLevel, message: String) -> ClientAction {
    ClientAction::Log { level, message }
}
