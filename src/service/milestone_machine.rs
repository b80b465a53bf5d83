// service/milestone_machine.rs
//! Guards for milestone and escrow transitions. Pure functions over already
//! loaded records; the stores re-check the same conditions inside the write.
use uuid::Uuid;

use crate::{
    models::{
        escrowmodel::{Escrow, EscrowStatus},
        projectmodel::{Milestone, MilestoneStatus},
    },
    service::error::ServiceError,
};

/// The milestone with the greatest sequence order strictly below this one.
/// Gaps in the ordering are allowed.
pub fn predecessor_of<'a>(milestone: &Milestone, siblings: &'a [Milestone]) -> Option<&'a Milestone> {
    siblings
        .iter()
        .filter(|m| m.project_id == milestone.project_id && m.sequence_order < milestone.sequence_order)
        .max_by_key(|m| m.sequence_order)
}

/// Escrows only ever leave `held`, and only once.
pub fn is_valid_escrow_transition(from: EscrowStatus, to: EscrowStatus) -> bool {
    matches!(
        (from, to),
        (EscrowStatus::Held, EscrowStatus::Released) | (EscrowStatus::Held, EscrowStatus::Refunded)
    )
}

fn invalid(milestone: &Milestone, action: &'static str) -> ServiceError {
    ServiceError::InvalidMilestoneTransition {
        milestone_id: milestone.id,
        action,
        status: milestone.status,
    }
}

fn ensure_held(escrow: &Escrow, to: EscrowStatus) -> Result<(), ServiceError> {
    if is_valid_escrow_transition(escrow.status, to) {
        Ok(())
    } else {
        Err(ServiceError::EscrowNotHeld {
            escrow_id: escrow.id,
            status: escrow.status,
        })
    }
}

/// The direct "ready for funding" signal only applies to untouched milestones.
pub fn ensure_markable(
    milestone: &Milestone,
    siblings: &[Milestone],
    existing_escrow: Option<&Escrow>,
    active_dispute: bool,
) -> Result<(), ServiceError> {
    if milestone.status != MilestoneStatus::Pending {
        return Err(invalid(milestone, "mark funded"));
    }
    ensure_fundable(milestone, siblings, existing_escrow, active_dispute)
}

pub fn ensure_fundable(
    milestone: &Milestone,
    siblings: &[Milestone],
    existing_escrow: Option<&Escrow>,
    active_dispute: bool,
) -> Result<(), ServiceError> {
    if existing_escrow.is_some() {
        return Err(ServiceError::EscrowAlreadyExists(milestone.id));
    }
    // A milestone marked funded by the company still has no escrow and can be paid into.
    if !matches!(milestone.status, MilestoneStatus::Pending | MilestoneStatus::Funded) {
        return Err(invalid(milestone, "fund"));
    }
    if active_dispute {
        return Err(ServiceError::ActiveDispute(milestone.project_id));
    }
    if let Some(previous) = predecessor_of(milestone, siblings) {
        if !previous.status.is_complete() {
            return Err(ServiceError::PreviousMilestoneIncomplete {
                milestone_id: milestone.id,
                previous_id: previous.id,
            });
        }
    }
    Ok(())
}

/// A rejected milestone may be submitted again without being re-funded; its
/// escrow is still held.
pub fn ensure_submittable(
    milestone: &Milestone,
    escrow: Option<&Escrow>,
    evidence_count: i64,
) -> Result<(), ServiceError> {
    if !matches!(milestone.status, MilestoneStatus::Funded | MilestoneStatus::Rejected) {
        return Err(invalid(milestone, "submit"));
    }
    let escrow = escrow.ok_or(ServiceError::EscrowNotFound(milestone.id))?;
    if escrow.status != EscrowStatus::Held {
        return Err(ServiceError::EscrowNotHeld {
            escrow_id: escrow.id,
            status: escrow.status,
        });
    }
    if evidence_count < 1 {
        return Err(ServiceError::MissingEvidence(milestone.id));
    }
    Ok(())
}

pub fn ensure_approvable(
    milestone: &Milestone,
    evidence_count: i64,
    active_dispute: bool,
) -> Result<(), ServiceError> {
    if milestone.status != MilestoneStatus::Submitted {
        return Err(invalid(milestone, "approve"));
    }
    if evidence_count < 1 {
        return Err(ServiceError::MissingEvidence(milestone.id));
    }
    if active_dispute {
        return Err(ServiceError::ActiveDispute(milestone.project_id));
    }
    Ok(())
}

pub fn ensure_rejectable(milestone: &Milestone) -> Result<(), ServiceError> {
    if milestone.status != MilestoneStatus::Submitted {
        return Err(invalid(milestone, "reject"));
    }
    Ok(())
}

/// `admin_override` waives the approval requirement, never the held escrow.
pub fn ensure_releasable(
    milestone: &Milestone,
    escrow: &Escrow,
    admin_override: bool,
) -> Result<(), ServiceError> {
    ensure_held(escrow, EscrowStatus::Released)?;
    match milestone.status {
        MilestoneStatus::Approved => Ok(()),
        MilestoneStatus::Released => Err(invalid(milestone, "release")),
        _ if admin_override => Ok(()),
        _ => Err(invalid(milestone, "release")),
    }
}

pub fn ensure_refundable(escrow: &Escrow) -> Result<(), ServiceError> {
    ensure_held(escrow, EscrowStatus::Refunded)
}

pub fn all_verified(milestones: &[Milestone]) -> bool {
    !milestones.is_empty() && milestones.iter().all(|m| m.verified_at.is_some())
}

pub fn all_released(milestones: &[Milestone]) -> bool {
    !milestones.is_empty() && milestones.iter().all(|m| m.status == MilestoneStatus::Released)
}

/// Transfer reference for an escrow payout. Stable per escrow so a retried or
/// racing release is rejected by the provider as a duplicate.
pub fn release_transfer_reference(escrow_id: Uuid) -> String {
    format!("escrow-release-{}", escrow_id.simple())
}
