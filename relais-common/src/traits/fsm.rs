/// A state machine driven by discrete inputs.
///
/// `transition` consumes the current state and yields the next one; anything
/// the machine needs to remember across transitions lives in `Context`.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;
}
