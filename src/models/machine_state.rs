//! Machine status transitions.
//!
//! [`transition`] is the only place a machine's next status is computed.
//! Services call it inside the same transaction that writes the time entry,
//! after locking the machine row.

use serde::Serialize;
use thiserror::Error;

use crate::entities::machine::MachineStatus;
use crate::errors::ServiceError;

/// Something that happened on the floor that may move a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MachineEvent {
    StartProduction,
    StartStoppage,
    /// `linked_to_order` is true when the stoppage referenced an order, in
    /// which case the machine goes back to processing it.
    FinishStoppage { linked_to_order: bool },
    FinishProduction,
}

impl std::fmt::Display for MachineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MachineEvent::StartProduction => "start production",
            MachineEvent::StartStoppage => "start stoppage",
            MachineEvent::FinishStoppage { .. } => "finish stoppage",
            MachineEvent::FinishProduction => "finish production",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {event} while machine is {from}")]
pub struct TransitionError {
    pub from: MachineStatus,
    pub event: MachineEvent,
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        ServiceError::Conflict(err.to_string())
    }
}

/// Next status for `from` after `event`, or an error for any pair not in the table.
pub fn transition(from: MachineStatus, event: MachineEvent) -> Result<MachineStatus, TransitionError> {
    use MachineEvent::*;
    use MachineStatus::*;

    match (from, event) {
        (Available, StartProduction) => Ok(InProcess),
        (Available, StartStoppage) | (InProcess, StartStoppage) => Ok(Stopped),
        (Stopped, FinishStoppage { linked_to_order: true }) => Ok(InProcess),
        (Stopped, FinishStoppage { linked_to_order: false }) => Ok(Available),
        (InProcess, FinishProduction) => Ok(Available),
        _ => Err(TransitionError { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use proptest::prelude::*;

    const ALL_STATUSES: [MachineStatus; 3] = [
        MachineStatus::Available,
        MachineStatus::InProcess,
        MachineStatus::Stopped,
    ];

    fn any_status() -> impl Strategy<Value = MachineStatus> {
        prop::sample::select(ALL_STATUSES.to_vec())
    }

    fn any_event() -> impl Strategy<Value = MachineEvent> {
        prop_oneof![
            Just(MachineEvent::StartProduction),
            Just(MachineEvent::StartStoppage),
            Just(MachineEvent::FinishStoppage { linked_to_order: true }),
            Just(MachineEvent::FinishStoppage { linked_to_order: false }),
            Just(MachineEvent::FinishProduction),
        ]
    }

    #[test]
    fn valid_transitions() {
        use MachineEvent::*;
        use MachineStatus::*;

        assert_eq!(transition(Available, StartProduction), Ok(InProcess));
        assert_eq!(transition(Available, StartStoppage), Ok(Stopped));
        assert_eq!(transition(InProcess, StartStoppage), Ok(Stopped));
        assert_eq!(
            transition(Stopped, FinishStoppage { linked_to_order: true }),
            Ok(InProcess)
        );
        assert_eq!(
            transition(Stopped, FinishStoppage { linked_to_order: false }),
            Ok(Available)
        );
        assert_eq!(transition(InProcess, FinishProduction), Ok(Available));
    }

    #[test]
    fn rejected_transitions_are_conflicts() {
        let err = transition(MachineStatus::InProcess, MachineEvent::StartProduction).unwrap_err();
        assert_eq!(err.to_string(), "cannot start production while machine is IN_PROCESS");
        assert_eq!(ServiceError::from(err).status_code(), StatusCode::CONFLICT);

        assert!(transition(MachineStatus::Stopped, MachineEvent::StartStoppage).is_err());
        assert!(transition(MachineStatus::Stopped, MachineEvent::FinishProduction).is_err());
        assert!(transition(
            MachineStatus::Available,
            MachineEvent::FinishStoppage { linked_to_order: true }
        )
        .is_err());
    }

    proptest! {
        #[test]
        fn stoppage_can_only_start_once(from in any_status()) {
            if let Ok(next) = transition(from, MachineEvent::StartStoppage) {
                prop_assert_eq!(next, MachineStatus::Stopped);
                prop_assert!(transition(next, MachineEvent::StartStoppage).is_err());
            } else {
                prop_assert_eq!(from, MachineStatus::Stopped);
            }
        }

        #[test]
        fn only_stopped_machines_finish_stoppages(from in any_status(), linked in any::<bool>()) {
            let result = transition(from, MachineEvent::FinishStoppage { linked_to_order: linked });
            prop_assert_eq!(result.is_ok(), from == MachineStatus::Stopped);
        }

        #[test]
        fn any_event_sequence_stays_within_the_table(
            events in prop::collection::vec(any_event(), 0..40)
        ) {
            let mut status = MachineStatus::Available;
            for event in events {
                match transition(status, event) {
                    Ok(next) => {
                        // a successful event never leaves the machine where it was
                        prop_assert_ne!(next, status);
                        status = next;
                    }
                    Err(err) => prop_assert_eq!(err.from, status),
                }
            }
        }
    }
}
