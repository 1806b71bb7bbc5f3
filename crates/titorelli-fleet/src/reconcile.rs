// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation decisions.
//!
//! Pure functions mapping (logical state, observed status) to an action. The
//! reconciliation worker and on-demand convergence both go through [`decide`].

use crate::platform::{InstanceStatus, WorkloadInfo};
use crate::store::BotState;

/// What to do about one bot whose workload is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Scale the workload to one replica.
    Start,
    /// Scale the workload to zero replicas.
    Stop,
    /// Workload is mid-rollout while it should be serving. Logged only.
    MarkPossiblyFailed,
    /// Nothing to do.
    NoOp,
}

/// Decide the action for a bot whose workload is present.
///
/// | logical state      | observed               | action               |
/// |--------------------|------------------------|----------------------|
/// | starting, running  | stopped, paused        | start                |
/// | starting, running  | updating               | mark possibly-failed |
/// | starting, running  | creating, ready, unknown | no-op              |
/// | stopping           | ready, paused          | stop                 |
/// | stopping           | stopped, creating, updating, unknown | no-op  |
/// | anything else      | any                    | no-op                |
pub fn decide(state: BotState, observed: InstanceStatus) -> ReconcileAction {
    use InstanceStatus as O;
    use ReconcileAction as A;

    match (state, observed) {
        (BotState::Starting | BotState::Running, O::Stopped | O::Paused) => A::Start,
        (BotState::Starting | BotState::Running, O::Updating) => A::MarkPossiblyFailed,
        (BotState::Starting | BotState::Running, O::Creating | O::Ready | O::Unknown) => A::NoOp,

        (BotState::Stopping, O::Ready | O::Paused) => A::Stop,
        (BotState::Stopping, O::Stopped | O::Creating | O::Updating | O::Unknown) => A::NoOp,

        (
            BotState::Created | BotState::Stopped | BotState::Failed | BotState::Deleted,
            O::Creating | O::Updating | O::Ready | O::Stopped | O::Paused | O::Unknown,
        ) => A::NoOp,
    }
}

/// Collapse a workload's instances into one observed status.
///
/// Converging statuses win over settled ones, and any ready instance wins over
/// idle ones. A workload without instances reports its own aggregate status.
pub fn observed_status(info: &WorkloadInfo) -> InstanceStatus {
    const PRIORITY: [InstanceStatus; 6] = [
        InstanceStatus::Updating,
        InstanceStatus::Creating,
        InstanceStatus::Unknown,
        InstanceStatus::Ready,
        InstanceStatus::Paused,
        InstanceStatus::Stopped,
    ];

    if info.instances.is_empty() {
        return info.status;
    }

    PRIORITY
        .into_iter()
        .find(|status| info.instances.iter().any(|i| i.status == *status))
        .unwrap_or(info.status)
}

/// Whether every instance is paused or stopped.
pub fn all_idle(info: &WorkloadInfo) -> bool {
    if info.instances.is_empty() {
        return info.status.is_idle();
    }
    info.instances.iter().all(|i| i.status.is_idle())
}

/// Whether a bot in `state` is expected to have its idle workload downgraded
/// to `stopped` once the observation is stable.
pub fn settles_to_stopped(state: BotState) -> bool {
    matches!(state, BotState::Running | BotState::Stopping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::WorkloadInstance;

    fn info(status: InstanceStatus, instances: &[InstanceStatus]) -> WorkloadInfo {
        WorkloadInfo {
            name: "tbot-1-1".to_string(),
            status,
            replicas: instances.len() as u32,
            image: String::new(),
            instances: instances
                .iter()
                .enumerate()
                .map(|(i, s)| WorkloadInstance {
                    id: i.to_string(),
                    status: *s,
                    restart_count: 0,
                    is_error: false,
                    error_msg: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_decision_table() {
        use InstanceStatus::*;
        use ReconcileAction::*;

        let expected = |state: BotState, observed: InstanceStatus| match state {
            BotState::Starting | BotState::Running => match observed {
                Stopped | Paused => Start,
                Updating => MarkPossiblyFailed,
                Creating | Ready | Unknown => NoOp,
            },
            BotState::Stopping => match observed {
                Ready | Paused => Stop,
                Stopped | Creating | Updating | Unknown => NoOp,
            },
            _ => NoOp,
        };

        for state in BotState::ALL {
            for observed in InstanceStatus::ALL {
                assert_eq!(
                    decide(state, observed),
                    expected(state, observed),
                    "state={} observed={}",
                    state,
                    observed
                );
            }
        }
    }

    #[test]
    fn test_settled_states_never_act() {
        for state in [BotState::Stopped, BotState::Failed] {
            for observed in InstanceStatus::ALL {
                assert_eq!(decide(state, observed), ReconcileAction::NoOp);
            }
        }
    }

    #[test]
    fn test_observed_status_priority() {
        use InstanceStatus::*;

        assert_eq!(observed_status(&info(Ready, &[])), Ready);
        assert_eq!(observed_status(&info(Ready, &[Stopped, Ready])), Ready);
        assert_eq!(observed_status(&info(Ready, &[Ready, Updating])), Updating);
        assert_eq!(observed_status(&info(Ready, &[Creating, Ready])), Creating);
        assert_eq!(observed_status(&info(Ready, &[Stopped, Paused])), Paused);
        assert_eq!(observed_status(&info(Ready, &[Stopped])), Stopped);
        assert_eq!(observed_status(&info(Ready, &[Ready, Unknown])), Unknown);
        assert_eq!(observed_status(&info(Unknown, &[])), Unknown);
    }

    #[test]
    fn test_all_idle() {
        use InstanceStatus::*;

        assert!(all_idle(&info(Stopped, &[])));
        assert!(!all_idle(&info(Ready, &[])));
        assert!(all_idle(&info(Ready, &[Paused, Stopped])));
        assert!(!all_idle(&info(Stopped, &[Paused, Ready])));
        assert!(!all_idle(&info(Stopped, &[Stopped, Unknown])));
    }

    #[test]
    fn test_settles_to_stopped() {
        for state in BotState::ALL {
            assert_eq!(
                settles_to_stopped(state),
                matches!(state, BotState::Running | BotState::Stopping)
            );
        }
    }
}
