//! Who may move a demanda or an offer from one state to the next.
//!
//! Every guard is a pure check over records already loaded by the caller. The
//! stores run these inside the same critical section that applies the change,
//! so a check and its write cannot be interleaved with another request.

use thiserror::Error;

use super::model::{Actor, Demanda, Offer};
use super::status::{DemandaStatus, OfferStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The caller's role or ownership does not allow the action.
    #[error("{0}")]
    Forbidden(String),
    /// The record is not in a state that allows the action.
    #[error("{0}")]
    InvalidState(String),
    /// The action would duplicate a record that must be unique.
    #[error("{0}")]
    Conflict(String),
}

fn forbidden(msg: impl Into<String>) -> LifecycleError {
    LifecycleError::Forbidden(msg.into())
}

fn invalid_state(msg: impl Into<String>) -> LifecycleError {
    LifecycleError::InvalidState(msg.into())
}

pub fn ensure_can_create_demanda(actor: &Actor) -> Result<(), LifecycleError> {
    if actor.is_professional() {
        return Err(forbidden("Professionals cannot create demandas"));
    }
    Ok(())
}

pub fn ensure_can_edit_demanda(
    actor: &Actor,
    demanda: &Demanda,
    requested_status: Option<DemandaStatus>,
) -> Result<(), LifecycleError> {
    if demanda.client_id != actor.id {
        return Err(forbidden("You can only edit your own demandas"));
    }
    if demanda.status != DemandaStatus::Pending {
        return Err(forbidden(format!(
            "This demanda cannot be edited because its status is '{}'",
            demanda.status
        )));
    }
    if let Some(status) = requested_status {
        if status != demanda.status {
            return Err(forbidden(
                "Demanda status only changes through offer acceptance or completion",
            ));
        }
    }
    Ok(())
}

pub fn ensure_can_delete_demanda(actor: &Actor, demanda: &Demanda) -> Result<(), LifecycleError> {
    if demanda.client_id != actor.id {
        return Err(forbidden("You can only delete your own demandas"));
    }
    if demanda.status != DemandaStatus::Pending {
        return Err(forbidden(format!(
            "This demanda cannot be deleted because its status is '{}'",
            demanda.status
        )));
    }
    Ok(())
}

pub fn ensure_can_conclude(actor: &Actor, demanda: &Demanda) -> Result<(), LifecycleError> {
    if demanda.professional_id != Some(actor.id) {
        return Err(forbidden(
            "Only the assigned professional can complete this demanda",
        ));
    }
    if demanda.status != DemandaStatus::InProgress {
        return Err(invalid_state("The demanda is not in progress"));
    }
    Ok(())
}

pub fn ensure_can_offer(
    actor: &Actor,
    demanda: &Demanda,
    already_offered: bool,
) -> Result<(), LifecycleError> {
    if !actor.is_professional() {
        return Err(forbidden("Only professionals can make offers"));
    }
    if demanda.client_id == actor.id {
        return Err(forbidden("You cannot make an offer on your own demanda"));
    }
    if demanda.status != DemandaStatus::Pending {
        return Err(forbidden("This demanda is not open for offers"));
    }
    if already_offered {
        return Err(LifecycleError::Conflict(
            "You already made an offer for this demanda".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_can_edit_offer() -> Result<(), LifecycleError> {
    Err(forbidden("Offers cannot be edited"))
}

pub fn ensure_can_withdraw_offer(actor: &Actor, offer: &Offer) -> Result<(), LifecycleError> {
    if offer.professional_id != actor.id {
        return Err(forbidden("You can only withdraw your own offers"));
    }
    if offer.status != OfferStatus::Pending {
        return Err(invalid_state(format!(
            "This offer cannot be withdrawn because its status is '{}'",
            offer.status
        )));
    }
    Ok(())
}

pub fn ensure_can_accept(
    actor: &Actor,
    demanda: &Demanda,
    offer: &Offer,
) -> Result<(), LifecycleError> {
    if demanda.client_id != actor.id {
        return Err(forbidden(
            "You are not the client of this demanda and cannot accept this offer",
        ));
    }
    if demanda.status != DemandaStatus::Pending {
        return Err(invalid_state("The demanda is not open for acceptance"));
    }
    if offer.status != OfferStatus::Pending {
        return Err(invalid_state(format!(
            "This offer cannot be accepted because its status is '{}'",
            offer.status
        )));
    }
    Ok(())
}

pub fn ensure_can_leave_feedback(
    actor: &Actor,
    demanda: &Demanda,
    already_reviewed: bool,
) -> Result<(), LifecycleError> {
    if actor.is_professional() {
        return Err(forbidden("Only clients can leave feedback"));
    }
    if demanda.client_id != actor.id {
        return Err(forbidden("You can only leave feedback for your own demandas"));
    }
    if demanda.status != DemandaStatus::Completed {
        return Err(forbidden(
            "Feedback can only be left after the service is completed",
        ));
    }
    if already_reviewed {
        return Err(LifecycleError::Conflict(
            "This demanda already has feedback".to_string(),
        ));
    }
    Ok(())
}

/// Applies an accepted offer: the chosen offer is accepted, the demanda moves
/// to in progress with the offering professional, and every sibling offer is
/// rejected. `siblings` must hold the other offers of the same demanda.
pub fn apply_acceptance<'a>(
    demanda: &mut Demanda,
    chosen: &mut Offer,
    siblings: impl IntoIterator<Item = &'a mut Offer>,
) {
    chosen.status = OfferStatus::Accepted;
    demanda.status = DemandaStatus::InProgress;
    demanda.professional_id = Some(chosen.professional_id);
    for offer in siblings {
        if offer.id != chosen.id {
            offer.status = OfferStatus::Rejected;
        }
    }
}

/// Whether a caller may see a single demanda.
pub fn can_view_demanda(actor: &Actor, demanda: &Demanda) -> bool {
    demanda.client_id == actor.id
        || demanda.professional_id == Some(actor.id)
        || (actor.is_professional() && demanda.status == DemandaStatus::Pending)
}

/// Whether a caller may see a single offer.
pub fn can_view_offer(actor: &Actor, offer: &Offer, demanda: &Demanda) -> bool {
    offer.professional_id == actor.id || demanda.client_id == actor.id
}
