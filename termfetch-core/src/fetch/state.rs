//! Receive-loop state machine.
//!
//! Two states. The only way out of `Receiving` is a terminal `RESPONSE`
//! event answering our request; the transition is evaluated after every
//! event, timeouts included, so a missed terminal event cannot be papered
//! over by an iteration count.

use crate::service::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Receiving,
    Done,
}

/// What the loop should do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Continue(ReceiveState),
    /// The session reported itself gone; stop with this reason.
    Abort(String),
}

impl ReceiveState {
    /// `correlation_id` is the request being waited on; a `RESPONSE` whose
    /// messages all belong to another request does not finish it.
    pub fn on_event(self, event: &Event, correlation_id: Option<u64>) -> Transition {
        match self {
            ReceiveState::Done => Transition::Continue(ReceiveState::Done),
            ReceiveState::Receiving => {
                let ours = correlation_id.map_or(true, |id| event.answers(id));
                if event.is_terminal() && ours {
                    Transition::Continue(ReceiveState::Done)
                } else if let Some(reason) = event.session_loss() {
                    Transition::Abort(reason)
                } else {
                    Transition::Continue(ReceiveState::Receiving)
                }
            }
        }
    }

    pub fn is_done(self) -> bool {
        self == ReceiveState::Done
    }
}
