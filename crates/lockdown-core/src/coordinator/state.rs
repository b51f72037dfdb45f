//! Per-document lock state machine.
//!
//! `transition` is pure: given the current state and an input it returns the
//! next state plus the effects the coordinator must perform, or a
//! [`Rejection`]. The transient states are the only guard against
//! overlapping work on one document; anything arriving while a document is
//! `Locking` or `Unlocking` is refused.

use crate::host::IndicatorState;

/// What started a `Locking` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// User lock command; ends in `Locked`.
    Command,
    /// Opportunistic re-encryption of edited content; ends back in `resume`.
    Relock { resume: Resting },
}

/// What an `Unlocking` transition will leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockKind {
    /// Plaintext written back, registry entry removed.
    Permanent,
    /// Plaintext handed to the caller only; storage stays encrypted.
    Session,
}

/// Settled states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resting {
    Unlocked,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    Unlocked,
    Locking(LockKind),
    Locked,
    Unlocking(UnlockKind),
}

impl DocState {
    pub fn is_transient(&self) -> bool {
        matches!(self, DocState::Locking(_) | DocState::Unlocking(_))
    }

    pub fn indicator(&self) -> IndicatorState {
        match self {
            DocState::Unlocked => IndicatorState::Unlocked,
            DocState::Locked => IndicatorState::Locked,
            DocState::Locking(_) | DocState::Unlocking(_) => IndicatorState::Busy,
        }
    }
}

impl From<Resting> for DocState {
    fn from(resting: Resting) -> Self {
        match resting {
            Resting::Unlocked => DocState::Unlocked,
            Resting::Locked => DocState::Locked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Lock,
    Unlock(UnlockKind),
    /// Host reported new plaintext content.
    ContentChanged,
    /// The in-flight operation completed.
    Finished,
    /// The in-flight operation failed or was cancelled.
    Aborted,
    /// The session vault expired.
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Indicate(IndicatorState),
    /// Keep the password that was just used.
    CachePassword,
    /// Drop any cached password for the document.
    EvictPassword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: DocState,
    pub effects: Vec<Effect>,
}

impl Step {
    fn to(next: DocState) -> Self {
        Self {
            next,
            effects: vec![Effect::Indicate(next.indicator())],
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Why an input was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Another transition is in flight.
    Busy,
    /// Already in the requested state.
    Noop,
    /// The input makes no sense here.
    Invalid,
}

pub fn transition(state: DocState, input: Input) -> Result<Step, Rejection> {
    use DocState::*;

    match (state, input) {
        (Locking(_) | Unlocking(_), Input::Lock | Input::Unlock(_) | Input::ContentChanged) => {
            Err(Rejection::Busy)
        }
        // Expiry during a transition is handled when the transition settles.
        (Locking(_) | Unlocking(_), Input::SessionExpired) => Err(Rejection::Busy),

        (Unlocked, Input::Lock) => Ok(Step::to(Locking(LockKind::Command))),
        (Locked, Input::Lock) => Err(Rejection::Noop),

        (Locked | Unlocked, Input::Unlock(kind)) => Ok(Step::to(Unlocking(kind))),

        (Unlocked, Input::ContentChanged) => Ok(Step::to(Locking(LockKind::Relock {
            resume: Resting::Unlocked,
        }))),
        (Locked, Input::ContentChanged) => Ok(Step::to(Locking(LockKind::Relock {
            resume: Resting::Locked,
        }))),

        (Locking(LockKind::Command), Input::Finished) => {
            Ok(Step::to(Locked).with(Effect::CachePassword))
        }
        (Locking(LockKind::Command), Input::Aborted) => Ok(Step::to(Unlocked)),
        (Locking(LockKind::Relock { resume }), Input::Finished | Input::Aborted) => {
            Ok(Step::to(resume.into()))
        }

        (Unlocking(_), Input::Finished) => Ok(Step::to(Unlocked).with(Effect::CachePassword)),
        (Unlocking(_), Input::Aborted) => Ok(Step::to(Locked)),

        (Locked | Unlocked, Input::SessionExpired) => {
            Ok(Step::to(Locked).with(Effect::EvictPassword))
        }

        (Locked | Unlocked, Input::Finished | Input::Aborted) => Err(Rejection::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next(state: DocState, input: Input) -> DocState {
        transition(state, input).unwrap().next
    }

    #[test]
    fn test_lock_command_path() {
        let step = transition(DocState::Unlocked, Input::Lock).unwrap();
        assert_eq!(step.next, DocState::Locking(LockKind::Command));
        assert_eq!(step.effects, vec![Effect::Indicate(IndicatorState::Busy)]);

        let done = transition(step.next, Input::Finished).unwrap();
        assert_eq!(done.next, DocState::Locked);
        assert!(done.effects.contains(&Effect::CachePassword));
        assert!(done.effects.contains(&Effect::Indicate(IndicatorState::Locked)));
    }

    #[test]
    fn test_aborted_lock_returns_to_unlocked() {
        let locking = next(DocState::Unlocked, Input::Lock);
        assert_eq!(next(locking, Input::Aborted), DocState::Unlocked);
    }

    #[test]
    fn test_unlock_paths() {
        let unlocking = next(DocState::Locked, Input::Unlock(UnlockKind::Permanent));
        assert_eq!(unlocking, DocState::Unlocking(UnlockKind::Permanent));
        assert_eq!(next(unlocking, Input::Finished), DocState::Unlocked);
        assert_eq!(next(unlocking, Input::Aborted), DocState::Locked);
    }

    #[test]
    fn test_relock_resumes_prior_state() {
        let from_unlocked = next(DocState::Unlocked, Input::ContentChanged);
        assert_eq!(next(from_unlocked, Input::Finished), DocState::Unlocked);

        let from_locked = next(DocState::Locked, Input::ContentChanged);
        assert_eq!(next(from_locked, Input::Aborted), DocState::Locked);

        let relock = transition(from_unlocked, Input::Finished).unwrap();
        assert!(!relock.effects.contains(&Effect::CachePassword));
    }

    #[test]
    fn test_transient_states_reject_overlapping_work() {
        let transient = [
            DocState::Locking(LockKind::Command),
            DocState::Locking(LockKind::Relock {
                resume: Resting::Unlocked,
            }),
            DocState::Unlocking(UnlockKind::Permanent),
            DocState::Unlocking(UnlockKind::Session),
        ];
        let inputs = [
            Input::Lock,
            Input::Unlock(UnlockKind::Permanent),
            Input::ContentChanged,
            Input::SessionExpired,
        ];
        for state in transient {
            assert!(state.is_transient());
            for input in inputs {
                assert_eq!(transition(state, input), Err(Rejection::Busy));
            }
        }
    }

    #[test]
    fn test_lock_when_locked_is_noop() {
        assert_eq!(transition(DocState::Locked, Input::Lock), Err(Rejection::Noop));
    }

    #[test]
    fn test_session_expiry_forces_locked_and_evicts() {
        for state in [DocState::Unlocked, DocState::Locked] {
            let step = transition(state, Input::SessionExpired).unwrap();
            assert_eq!(step.next, DocState::Locked);
            assert!(step.effects.contains(&Effect::EvictPassword));
        }
    }

    #[test]
    fn test_settled_states_reject_completion_inputs() {
        assert_eq!(
            transition(DocState::Unlocked, Input::Finished),
            Err(Rejection::Invalid)
        );
        assert_eq!(
            transition(DocState::Locked, Input::Aborted),
            Err(Rejection::Invalid)
        );
    }
}
