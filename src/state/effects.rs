//! Side effects requested by a session mutation, applied by the service layer.

use std::time::Duration;

use crate::{
    dao::models::{AnswerResponseEntity, GameEntity, PlayerEntity},
    dto::ws::ServerMessage,
    state::{
        identity::ConnectionId,
        timers::{TimerPurpose, TimerToken},
    },
};

/// One outbound frame.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Recipient.
    pub to: ConnectionId,
    /// Frame to send.
    pub message: ServerMessage,
}

/// Timer change requested by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Arm a timer; the resulting token must be handed back through `timer_armed`.
    Arm {
        /// What the timer is for.
        purpose: TimerPurpose,
        /// Delay before it fires.
        after: Duration,
    },
    /// Cancel a pending timer.
    Cancel(TimerToken),
}

/// Best-effort write for the persistence collaborator.
#[derive(Debug, Clone)]
pub enum PersistOp {
    /// Upsert the game record.
    SaveGame(GameEntity),
    /// Upsert one player.
    SavePlayer(PlayerEntity),
    /// Drop one player.
    RemovePlayer {
        /// Owning game.
        code: String,
        /// Case-folded name.
        name_key: String,
    },
    /// Append an analytics record.
    RecordAnswer(AnswerResponseEntity),
    /// Drop the game and its players.
    DeleteGame {
        /// Game code.
        code: String,
    },
}

impl PersistOp {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SaveGame(_) => "save_game",
            Self::SavePlayer(_) => "save_player",
            Self::RemovePlayer { .. } => "remove_player",
            Self::RecordAnswer(_) => "record_answer",
            Self::DeleteGame { .. } => "delete_game",
        }
    }
}

/// Everything a mutation wants done, in order.
#[derive(Debug, Default)]
pub struct Effects {
    /// Outbound frames, in send order.
    pub deliveries: Vec<Delivery>,
    /// Timer changes.
    pub timers: Vec<TimerCommand>,
    /// Store writes.
    pub persistence: Vec<PersistOp>,
    /// Remove the session from the registry once applied.
    pub teardown: bool,
}

impl Effects {
    /// Nothing to do.
    pub fn none() -> Self {
        Self::default()
    }

    /// Queue `message` for `to`.
    pub fn send(&mut self, to: ConnectionId, message: ServerMessage) {
        self.deliveries.push(Delivery { to, message });
    }

    /// Queue `message` for every handle in `recipients`.
    pub fn send_all<I>(&mut self, recipients: I, message: &ServerMessage)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        for to in recipients {
            self.send(to, message.clone());
        }
    }

    /// Request a timer.
    pub fn arm(&mut self, purpose: TimerPurpose, after: Duration) {
        self.timers.push(TimerCommand::Arm { purpose, after });
    }

    /// Request a cancellation.
    pub fn cancel(&mut self, token: TimerToken) {
        self.timers.push(TimerCommand::Cancel(token));
    }

    /// Request a store write.
    pub fn persist(&mut self, op: PersistOp) {
        self.persistence.push(op);
    }

    /// Whether applying these effects would change anything.
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
            && self.timers.is_empty()
            && self.persistence.is_empty()
            && !self.teardown
    }

    /// Append `other` after the effects already queued.
    pub fn extend(&mut self, other: Effects) {
        self.deliveries.extend(other.deliveries);
        self.timers.extend(other.timers);
        self.persistence.extend(other.persistence);
        self.teardown |= other.teardown;
    }

    /// Frames queued for `to`, in order.
    pub fn messages_for(&self, to: ConnectionId) -> impl Iterator<Item = &ServerMessage> {
        self.deliveries
            .iter()
            .filter(move |delivery| delivery.to == to)
            .map(|delivery| &delivery.message)
    }
}
