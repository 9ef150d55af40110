//! Publish-state machine for pages and documents.
//!
//! Each state has a fixed set of outbound actions. A transition is asked of
//! the CMS by action name; only when the CMS accepts it does the local state
//! move, following [`WorkflowAction::target`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{FsError, FsResult};

/// Review state of a workflow-aware object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Internal,
    External,
    InternallyPublished,
    InternallyRestricted,
    Private,
    Pending,
}

/// Action accepted by `content_status_modify`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Hide,
    Show,
    Retract,
    Reject,
    Submit,
    PublishExternally,
    PublishInternally,
    PublishRestricted,
}

impl WorkflowState {
    /// Human label the CMS shows for this state.
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowState::Internal => "Internal draft",
            WorkflowState::External => "Externally visible",
            WorkflowState::InternallyPublished => "Internally published",
            WorkflowState::InternallyRestricted => "Internally restricted",
            WorkflowState::Private => "Private",
            WorkflowState::Pending => "Pending review",
        }
    }

    /// Actions allowed out of this state.
    pub fn allowed_actions(&self) -> &'static [WorkflowAction] {
        use WorkflowAction::*;
        match self {
            WorkflowState::Internal => &[
                Hide,
                PublishExternally,
                PublishInternally,
                PublishRestricted,
                Submit,
            ],
            WorkflowState::External => &[Retract],
            WorkflowState::InternallyPublished => &[Retract, PublishExternally],
            WorkflowState::InternallyRestricted => &[Retract, PublishInternally],
            WorkflowState::Private => &[Show],
            WorkflowState::Pending => &[Retract, Reject, PublishExternally, PublishInternally],
        }
    }

    pub fn allows(&self, action: WorkflowAction) -> bool {
        self.allowed_actions().contains(&action)
    }

    /// Parse a listing `review_state`; unknown states map to None.
    pub fn from_review_state(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl WorkflowAction {
    /// State the object lands in after the CMS accepts this action.
    pub fn target(&self) -> WorkflowState {
        match self {
            WorkflowAction::Hide => WorkflowState::Private,
            WorkflowAction::Show | WorkflowAction::Retract | WorkflowAction::Reject => {
                WorkflowState::Internal
            }
            WorkflowAction::Submit => WorkflowState::Pending,
            WorkflowAction::PublishExternally => WorkflowState::External,
            WorkflowAction::PublishInternally => WorkflowState::InternallyPublished,
            WorkflowAction::PublishRestricted => WorkflowState::InternallyRestricted,
        }
    }
}

/// Validate `action` from `state`, returning the state it leads to.
pub fn check_transition(
    state: Option<WorkflowState>,
    action: WorkflowAction,
) -> FsResult<WorkflowState> {
    let Some(state) = state else {
        return Err(FsError::unavailable(format!(
            "cannot {action}: workflow state is unknown"
        )));
    };
    if !state.allows(action) {
        return Err(FsError::unavailable(format!(
            "cannot {action} from state {state}"
        )));
    }
    Ok(action.target())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(
            WorkflowState::from_review_state("internally_published"),
            Some(WorkflowState::InternallyPublished)
        );
        assert_eq!(WorkflowState::from_review_state("published"), None);
        assert_eq!(
            "publish_externally".parse::<WorkflowAction>(),
            Ok(WorkflowAction::PublishExternally)
        );
        assert_eq!(WorkflowAction::PublishRestricted.to_string(), "publish_restricted");
    }

    #[test]
    fn test_external_only_retracts() {
        assert_eq!(
            WorkflowState::External.allowed_actions(),
            &[WorkflowAction::Retract]
        );
        assert!(check_transition(Some(WorkflowState::External), WorkflowAction::Hide).is_err());
        assert_eq!(
            check_transition(Some(WorkflowState::External), WorkflowAction::Retract),
            Ok(WorkflowState::Internal)
        );
    }

    #[test]
    fn test_every_allowed_action_has_a_target() {
        for state in [
            WorkflowState::Internal,
            WorkflowState::External,
            WorkflowState::InternallyPublished,
            WorkflowState::InternallyRestricted,
            WorkflowState::Private,
            WorkflowState::Pending,
        ] {
            for action in state.allowed_actions() {
                assert_eq!(check_transition(Some(state), *action), Ok(action.target()));
            }
        }
    }

    #[test]
    fn test_illegal_action_names_action_and_state() {
        let err = check_transition(Some(WorkflowState::Private), WorkflowAction::Submit)
            .unwrap_err();
        assert_eq!(
            err,
            FsError::unavailable("cannot submit from state private")
        );
        assert!(check_transition(None, WorkflowAction::Show).is_err());
    }
}
