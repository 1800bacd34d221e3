//! Role authorization gate.
//!
//! Decides whether an actor may perform an action on a letter before the
//! transition engine looks at anything else. Membership in the resolved
//! pipeline is checked explicitly, independent of what the stored stage says.

use super::model::{Action, Actor, Letter, LetterStatus, Role};
use super::pipeline::PipelineTable;
use crate::error::WorkflowError;

/// Check `actor` may perform `action`. `letter` is `None` for actions that
/// create a letter.
pub fn authorize(
    pipelines: &PipelineTable,
    actor: &Actor,
    action: Action,
    letter: Option<&Letter>,
) -> Result<(), WorkflowError> {
    let unauthorized = || WorkflowError::Unauthorized {
        role: actor.role,
        action,
    };

    if action.is_clerk_action() {
        if actor.role != Role::Clerk {
            return Err(unauthorized());
        }
        let Some(letter) = letter else {
            return match action {
                Action::Create | Action::ClassifyIntake => Ok(()),
                _ => Err(WorkflowError::InvalidInput(format!(
                    "{action} needs an existing letter"
                ))),
            };
        };
        if actor.department.as_deref() != Some(letter.department.as_str()) {
            return Err(WorkflowError::Forbidden {
                role: actor.role,
                action,
                reason: format!("letter belongs to department {}", letter.department),
            });
        }
        return match action {
            Action::FinalSubmit if letter.stage != Role::Clerk => Err(WorkflowError::Forbidden {
                role: actor.role,
                action,
                reason: format!("letter is at {}", letter.stage),
            }),
            Action::Resubmit if letter.status != LetterStatus::Rejected => {
                Err(WorkflowError::InvalidTransition {
                    id: letter.id.clone(),
                    status: letter.status,
                    action,
                })
            }
            Action::FinalSubmit | Action::Resubmit => Ok(()),
            _ => Err(WorkflowError::InvalidInput(format!(
                "{action} cannot target an existing letter"
            ))),
        };
    }

    if !action.is_stage_action() {
        return Err(unauthorized());
    }

    let Some(letter) = letter else {
        return Err(WorkflowError::InvalidInput(format!(
            "{action} needs an existing letter"
        )));
    };

    if actor.role == Role::Clerk || !pipelines.contains(letter.classification, actor.role) {
        return Err(unauthorized());
    }

    if letter.stage != actor.role {
        return Err(WorkflowError::Forbidden {
            role: actor.role,
            action,
            reason: format!("letter is at {}", letter.stage),
        });
    }

    Ok(())
}

/// Boolean form of [`authorize`].
pub fn can_act(pipelines: &PipelineTable, actor: &Actor, action: Action, letter: &Letter) -> bool {
    authorize(pipelines, actor, action, Some(letter)).is_ok()
}
