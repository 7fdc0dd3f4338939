//! Route handlers. Authentication and authorization have already run by
//! the time these are invoked; identity and post come from the scope.

use super::AppState;
use super::middleware::parse_id;
use super::scope::RequestScope;
use crate::error::AccessError;
use crate::invitation::RegistrationDraft;
use crate::mailer::{TemplateData, USER_INVITATION_TEMPLATE};
use crate::store::{Identity, Post};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const MAX_TITLE_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 1000;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AccessError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AccessError::InvalidInput(e.body_text()))
}

/// `GET /v1/health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "env": state.config.server.environment,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `POST /v1/authentication/user`
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Identity>), AccessError> {
    let request = body(payload)?;
    let draft = RegistrationDraft::new(request.username, request.email, request.password);

    // Nothing fallible sits between the commit and the mail: the token
    // exists only in `issued`.
    let issued = state
        .invitations
        .register_and_invite(&draft, state.config.invitations.validity())
        .await?;
    let identity = issued.identity.clone();

    let activation_url = format!(
        "{}/{}",
        state.config.mail.activation_url.trim_end_matches('/'),
        issued.token.as_str()
    );
    let data = TemplateData::from([
        ("username", identity.username.clone()),
        ("activation_url", activation_url),
    ]);
    // The identity and invitation are durable; a lost email is not a failed registration.
    if let Err(e) = state
        .mailer
        .send(USER_INVITATION_TEMPLATE, &identity.email, &data)
        .await
    {
        tracing::error!(user_id = identity.id, error = %e, "failed to send activation email");
    }

    Ok((StatusCode::CREATED, Json(identity)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// `POST /v1/authentication/token`
pub async fn create_token(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), AccessError> {
    let request = body(payload)?;
    let session = state.login.login(&request.email, &request.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token: session.token,
        }),
    ))
}

/// `PUT /v1/users/activate/:token`
pub async fn activate_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AccessError> {
    state.invitations.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/users/:user_id`
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    _scope: RequestScope,
) -> Result<Json<Identity>, AccessError> {
    let identity = state.store.find_identity_by_id(parse_id(&user_id)?).await?;
    Ok(Json(identity))
}

/// `GET /v1/posts/:post_id`
pub async fn get_post(scope: RequestScope) -> Result<Json<Post>, AccessError> {
    Ok(Json(scope.post()?.clone()))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// `PATCH /v1/posts/:post_id`
pub async fn update_post(
    State(state): State<AppState>,
    scope: RequestScope,
    payload: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> Result<Json<Post>, AccessError> {
    let request = body(payload)?;
    let post = scope.post()?;

    let title = request.title.unwrap_or_else(|| post.title.clone());
    let content = request.content.unwrap_or_else(|| post.content.clone());
    if title.trim().is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(AccessError::InvalidInput(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        )));
    }
    if content.trim().is_empty() || content.chars().count() > MAX_CONTENT_LEN {
        return Err(AccessError::InvalidInput(format!(
            "content must be 1 to {MAX_CONTENT_LEN} characters"
        )));
    }

    let updated = state.posts.update_post(post.id, &title, &content).await?;
    tracing::info!(post_id = updated.id, user_id = scope.identity.id, "post updated");
    Ok(Json(updated))
}

/// `DELETE /v1/posts/:post_id`
pub async fn delete_post(
    State(state): State<AppState>,
    scope: RequestScope,
) -> Result<StatusCode, AccessError> {
    let post = scope.post()?;
    state.posts.delete_post(post.id).await?;
    tracing::info!(post_id = post.id, user_id = scope.identity.id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}
