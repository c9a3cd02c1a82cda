//! Command lifecycle state machine.
//!
//! `new -> requested -> executing -> complete`. Transitions are a pure function
//! of the current state so the machine can be tested without any command object.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    #[default]
    New,
    Requested,
    Executing,
    Complete,
}

impl CommandState {
    /// Applies `transition`, returning the next state or the reason it is illegal.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidActionError::Transition`] when `transition` is not legal
    /// from `self`. The caller's state is left unchanged.
    pub fn apply(self, transition: Transition) -> Result<Self, InvalidActionError> {
        match (self, transition) {
            (Self::New, Transition::Request) => Ok(Self::Requested),
            (Self::Requested, Transition::Execute) => Ok(Self::Executing),
            (Self::Executing, Transition::Complete) => Ok(Self::Complete),
            (from, transition) => Err(InvalidActionError::Transition { transition, from }),
        }
    }

    /// Attributes may only change before the command is sent.
    #[must_use]
    pub fn is_mutable(self) -> bool {
        self == Self::New
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Requested => "requested",
            Self::Executing => "executing",
            Self::Complete => "complete",
        })
    }
}

/// A lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Request,
    Execute,
    Complete,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Execute => "execute",
            Self::Complete => "complete",
        })
    }
}

/// A lifecycle contract violation. Not retryable; the call site is wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidActionError {
    #[error("cannot {transition} a command that is {from}")]
    Transition {
        transition: Transition,
        from: CommandState,
    },
    #[error("Cannot alter attributes of a {state} command")]
    Immutable { state: CommandState },
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn happy_path() {
        let state = CommandState::New
            .apply(Transition::Request)
            .and_then(|s| s.apply(Transition::Execute))
            .and_then(|s| s.apply(Transition::Complete));
        assert_eq!(state, Ok(CommandState::Complete));
    }

    #[test]
    fn cannot_complete_a_new_command() {
        let err = CommandState::New.apply(Transition::Complete).unwrap_err();
        assert_eq!(
            err,
            InvalidActionError::Transition {
                transition: Transition::Complete,
                from: CommandState::New,
            }
        );
        assert_eq!(err.to_string(), "cannot complete a command that is new");
    }

    #[test]
    fn only_new_is_mutable() {
        assert!(CommandState::New.is_mutable());
        assert!(!CommandState::Requested.is_mutable());
        assert!(!CommandState::Executing.is_mutable());
        assert!(!CommandState::Complete.is_mutable());
    }

    #[test]
    fn immutable_message() {
        let err = InvalidActionError::Immutable {
            state: CommandState::Requested,
        };
        assert_eq!(
            err.to_string(),
            "Cannot alter attributes of a requested command"
        );
    }

    fn transition_strategy() -> impl Strategy<Value = Transition> {
        prop_oneof![
            Just(Transition::Request),
            Just(Transition::Execute),
            Just(Transition::Complete),
        ]
    }

    proptest! {
        #[test]
        fn observed_states_are_a_prefix_of_the_lifecycle(
            transitions in proptest::collection::vec(transition_strategy(), 0..12)
        ) {
            let order = [
                CommandState::New,
                CommandState::Requested,
                CommandState::Executing,
                CommandState::Complete,
            ];
            let mut state = CommandState::New;
            let mut observed = vec![state];

            for transition in transitions {
                match state.apply(transition) {
                    Ok(next) => {
                        state = next;
                        observed.push(state);
                    }
                    // A failed transition leaves the state where it was.
                    Err(_) => prop_assert_eq!(state, *observed.last().unwrap()),
                }
            }

            prop_assert!(observed.len() <= order.len());
            prop_assert_eq!(&observed[..], &order[..observed.len()]);
        }
    }
}
