use std::{borrow::Cow, sync::Arc};

use crate::{envelope::Envelope, label::AppLabel, status::Status};

/// Per-connection state shared between the protocol layer and the
/// transaction handler.
///
/// The protocol layer owns `id`, `extended` and the [`Envelope`]; the
/// handler fills in `label` and `response`. One `Context` lives for exactly
/// one connection and is never shared across tasks.
#[derive(Default, Debug)]
pub struct Context {
    /// The client's EHLO/HELO argument
    pub id: String,
    /// Whether the client greeted with EHLO
    pub extended: bool,
    pub banner: Arc<str>,
    pub max_message_size: usize,
    /// Application label derived from an AUTH identity; survives `RSET`
    pub label: Option<AppLabel>,
    pub envelope: Envelope,
    /// Message body after dot-unstuffing, available once the final dot is read
    pub data: Option<Arc<[u8]>>,
    pub response: Option<(Status, Cow<'static, str>)>,
}

impl Context {
    /// Whether the client has greeted us with EHLO or HELO
    pub fn is_greeted(&self) -> bool {
        !self.id.is_empty()
    }

    /// The label a message in this transaction is attributed to.
    ///
    /// An authenticated label wins; otherwise the local-part of the envelope
    /// sender is sanitised; otherwise [`AppLabel::DEFAULT`].
    pub fn app_label(&self) -> AppLabel {
        self.label.clone().unwrap_or_else(|| {
            self.envelope
                .sender_address()
                .map_or_else(AppLabel::default, AppLabel::from_address)
        })
    }

    pub fn sender(&self) -> String {
        self.envelope
            .sender_address()
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Drop the envelope and any buffered message.
    ///
    /// The greeting and authentication label belong to the connection and are
    /// left alone.
    pub fn reset_transaction(&mut self) {
        self.envelope.clear();
        self.data = None;
    }
}
