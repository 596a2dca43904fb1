//! [`FiniteStateMachine`] implementation for the SMTP session states.
//!
//! Transitions only ever touch the protocol side of the [`Context`]: the
//! greeting and the envelope. Anything with side effects (authentication,
//! delivery) happens afterwards in the session's transaction handler.

use relais_common::{context::Context, traits::fsm::FiniteStateMachine};

use crate::{command::Command, state::State};

impl FiniteStateMachine for State {
    type Input = Command;
    type Context = Context;

    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self {
        Self::transition(self, input, context)
    }
}
