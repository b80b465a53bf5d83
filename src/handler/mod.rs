pub mod consultations;
pub mod disputes;
pub mod milestones;
pub mod payments;
pub mod projects;

use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    middleware::AuthenticatedActor,
    models::projectmodel::{Milestone, Project},
    AppState,
};

// Ownership predicates. The services take the actor id as given; who may act
// on what is decided here.

pub(crate) fn ensure_party_or_admin(project: &Project, actor: &AuthenticatedActor) -> Result<(), HttpError> {
    if actor.is_admin() || project.is_party(actor.user_id) {
        Ok(())
    } else {
        Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()))
    }
}

pub(crate) fn ensure_project_client(project: &Project, actor: &AuthenticatedActor) -> Result<(), HttpError> {
    if project.client_id == actor.user_id {
        Ok(())
    } else {
        Err(HttpError::forbidden("Only the project's client can do this"))
    }
}

pub(crate) fn ensure_project_company(project: &Project, actor: &AuthenticatedActor) -> Result<(), HttpError> {
    if project.company_id == actor.user_id {
        Ok(())
    } else {
        Err(HttpError::forbidden("Only the project's company can do this"))
    }
}

pub(crate) async fn load_milestone_with_project(
    app_state: &AppState,
    milestone_id: Uuid,
) -> Result<(Milestone, Project), HttpError> {
    let milestone = app_state.milestone_service.get_milestone(milestone_id).await?;
    let project = app_state.project_service.get_project(milestone.project_id).await?;
    Ok((milestone, project))
}
