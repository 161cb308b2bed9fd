use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use super::{
    AppError, AppState,
    form::{AdminAction, Form, parse_id},
    views,
};
use crate::{desk::CreateOutcome, domain::Request, storage::UploadError};

pub async fn form_page(State(state): State<AppState>) -> Html<String> {
    Html(views::form_page(&state.organisation))
}

pub async fn submit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let (submission, upload) = Form::read(multipart).await?.into_submission()?;
    let outcome = state
        .run(move |desk| desk.create(submission, upload))
        .await?;

    Ok(Html(match outcome {
        CreateOutcome::Created(request) => views::confirmation_page(&state.organisation, &request),
        CreateOutcome::Duplicate => views::duplicate_page(&state.organisation),
    }))
}

pub async fn admin_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let collection = state.run(|desk| desk.collection()).await?;
    Ok(Html(views::admin_page(
        &state.organisation,
        collection.requests(),
        collection.processed_count(),
    )))
}

pub async fn admin_action(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let action = Form::read(multipart).await?.into_admin_action()?;
    let found = match action {
        AdminAction::Update { id, update, files } => state
            .run(move |desk| desk.update(id, update, files))
            .await?
            .is_some(),
        AdminAction::Delete(id) => state.run(move |desk| desk.delete(id)).await?.is_some(),
    };

    if found {
        Ok(Redirect::to("/admin"))
    } else {
        Err(AppError::NotFound)
    }
}

pub async fn remove_attachment(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Redirect, AppError> {
    let id = parse_id(&id)?;
    match state
        .run(move |desk| desk.remove_attachment(id, &key))
        .await?
    {
        Some(_) => Ok(Redirect::to("/admin")),
        None => Err(AppError::NotFound),
    }
}

async fn find(state: &AppState, id: &str) -> Result<Request, AppError> {
    let id = parse_id(id)?;
    state
        .run(move |desk| desk.find(id))
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn print_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let request = find(&state, &id).await?;
    Ok(Html(views::print_page(&state.organisation, &request)))
}

pub async fn email_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let request = find(&state, &id).await?;
    views::email_page(&state.organisation, &request)
        .map(Html)
        .ok_or(AppError::NotFound)
}

pub async fn download(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let lookup = key.clone();
    let bytes = state
        .run(move |desk| match desk.uploads().read(&lookup) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(UploadError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await?
        .ok_or(AppError::NotFound)?;

    let disposition = format!("attachment; filename=\"{key}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    #[serde(default)]
    q: String,
}

pub async fn archive_page(
    State(state): State<AppState>,
    Query(ArchiveQuery { q }): Query<ArchiveQuery>,
) -> Result<Html<String>, AppError> {
    let query = q.clone();
    let entries = state
        .run(move |desk| desk.search_archive(&query))
        .await?;
    Ok(Html(views::archive_page(&state.organisation, &q, &entries)))
}

pub async fn api_requests(State(state): State<AppState>) -> Result<Json<Vec<Request>>, AppError> {
    Ok(Json(state.run(|desk| desk.requests()).await?))
}
