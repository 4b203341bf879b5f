//! Request verbs and acknowledgement handling.
//!
//! Each verb builds an `(action, id, argument)` triple and hands it to
//! [`Channel::send`], which encodes the request packet and emits it on the
//! channel's namespace with an acknowledgement handler attached. The handler
//! decodes the reply and completes the caller's [`Responder`] with either the
//! reply payload or a [`RequestError`].

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::action::ActionKind;
use crate::entity::EntityId;
use crate::error::RequestError;
use crate::packet::{self, Packet};
use crate::transport::AckHandler;

use super::{CHANNEL_TARGET, Channel};

/// Outcome delivered to a request's responder.
pub type Reply = Result<Value, RequestError>;

type ReplyFn = Box<dyn FnOnce(Reply) + Send>;

/// Optional one-shot callback receiving a request's [`Reply`].
///
/// Any `FnOnce(Reply)` closure converts into a responder; use
/// [`Responder::none`] for fire-and-forget requests.
pub struct Responder(Option<ReplyFn>);

impl Responder {
    /// Responder that discards the reply.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Returns `true` when a callback is attached.
    #[must_use]
    pub const fn is_some(&self) -> bool {
        self.0.is_some()
    }

    fn respond(self, reply: Reply) {
        if let Some(callback) = self.0 {
            callback(reply);
        }
    }
}

impl<F> From<F> for Responder
where
    F: FnOnce(Reply) + Send + 'static,
{
    fn from(callback: F) -> Self {
        Self(Some(Box::new(callback)))
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Responder").field(&self.is_some()).finish()
    }
}

/// Interprets an acknowledgement message.
///
/// `error` packets become [`RequestError::Remote`] carrying the packet's data;
/// every other packet yields its data.
pub(crate) fn interpret(message: Value) -> Reply {
    let packet = packet::decode(message)?;
    let (kind, _, data) = packet.into_parts();
    if kind == ActionKind::Error {
        Err(RequestError::Remote { payload: data })
    } else {
        Ok(data)
    }
}

fn acknowledgement(channel: String, kind: ActionKind, responder: Responder) -> AckHandler {
    Box::new(move |message| {
        let reply = interpret(message);
        if let Err(error) = &reply {
            debug!(
                target: CHANNEL_TARGET,
                channel = %channel,
                action = %kind,
                %error,
                "request failed"
            );
        }
        responder.respond(reply);
    })
}

impl Channel {
    /// Sends a request and routes its acknowledgement to `responder`.
    ///
    /// `argument` is wrapped according to `kind`: `query` requests carry it
    /// as criteria, `update` requests as changed fields, and all others as
    /// the owner. Never fails synchronously. An encoding failure is delivered
    /// to the responder straight away; without a responder it is logged.
    pub fn send(
        &self,
        kind: ActionKind,
        id: impl Into<EntityId>,
        argument: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        let reply_to: Responder = responder.into();
        let request = Packet::request(kind.clone(), id, argument);
        let message = match packet::encode(&request) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    target: CHANNEL_TARGET,
                    channel = %self.name(),
                    action = %kind,
                    %error,
                    "dropping request that failed to encode"
                );
                reply_to.respond(Err(error.into()));
                return self;
            }
        };

        debug!(
            target: CHANNEL_TARGET,
            channel = %self.name(),
            action = %kind,
            id = ?request.id(),
            "sending request"
        );
        let ack = acknowledgement(self.name().to_owned(), kind, reply_to);
        self.connection().emit(self.namespace(), message, Some(ack));
        self
    }

    /// Reads one bid.
    pub fn fetch(&self, id: impl Into<EntityId>, responder: impl Into<Responder>) -> &Self {
        self.send(ActionKind::Fetch, id, None, responder)
    }

    /// Searches bids matching `criteria`.
    pub fn find(&self, criteria: Value, responder: impl Into<Responder>) -> &Self {
        self.send(ActionKind::Query, "", Some(criteria), responder)
    }

    /// Opens (locks) a bid on behalf of `owner`.
    pub fn open(
        &self,
        id: impl Into<EntityId>,
        owner: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::Lock, id, owner, responder)
    }

    /// Cancels (unlocks) a bid.
    pub fn cancel(
        &self,
        id: impl Into<EntityId>,
        owner: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::Unlock, id, owner, responder)
    }

    /// Claims a bid.
    pub fn claim(
        &self,
        id: impl Into<EntityId>,
        owner: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::Claim, id, owner, responder)
    }

    /// Marks a bid as pending.
    pub fn pending(
        &self,
        id: impl Into<EntityId>,
        owner: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::Pending, id, owner, responder)
    }

    /// Completes (closes) a bid.
    pub fn complete(
        &self,
        id: impl Into<EntityId>,
        owner: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::Complete, id, owner, responder)
    }

    /// Unlocks a bid whoever holds it.
    pub fn force_unlock(
        &self,
        id: impl Into<EntityId>,
        owner: Option<Value>,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::ForceUnlock, id, owner, responder)
    }

    /// Changes fields of a bid.
    pub fn update(
        &self,
        id: impl Into<EntityId>,
        fields: Value,
        responder: impl Into<Responder>,
    ) -> &Self {
        self.send(ActionKind::Update, id, Some(fields), responder)
    }
}
