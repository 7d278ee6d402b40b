use {
    crate::{
        AppState,
        adapters::api_errors::{ApiError, Unauthenticated},
        domain::{
            error::EscrowError,
            escrow::{Actor, ActorRole, Escrow, EscrowAction, NewEscrow},
            id::{EscrowId, UserId},
        },
    },
    axum::{
        Json,
        extract::{FromRequestParts, Path, State, rejection::JsonRejection},
        http::{StatusCode, request::Parts},
    },
};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Caller identity, set by the upstream auth layer.
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

        let id = header(ACTOR_ID_HEADER)
            .and_then(|v| UserId::new(v).ok())
            .ok_or(Unauthenticated("missing or malformed x-actor-id"))?;
        let role = match header(ACTOR_ROLE_HEADER) {
            None | Some("user") => ActorRole::User,
            Some("admin") => ActorRole::Admin,
            Some(_) => return Err(Unauthenticated("unknown x-actor-role")),
        };
        Ok(Self(Actor { id, role }))
    }
}

fn can_view(actor: &Actor, user: &UserId) -> bool {
    actor.is_admin() || &actor.id == user
}

pub async fn create_escrow(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<NewEscrow>, JsonRejection>,
) -> Result<(StatusCode, Json<Escrow>), ApiError> {
    let Json(new) = body.map_err(|e| EscrowError::Validation(e.body_text()))?;
    let escrow = state.escrows.create_escrow(new, &actor).await?;
    Ok((StatusCode::CREATED, Json(escrow)))
}

pub async fn get_escrow(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Json<Escrow>, ApiError> {
    let id: EscrowId = id.parse()?;
    let escrow = state.escrows.get_escrow(&id).await?;
    if !actor.is_admin() && !escrow.is_party(&actor.id) {
        // Non-parties get the same 404 as an unknown id.
        return Err(EscrowError::NotFound(format!("escrow {id}")).into());
    }
    Ok(Json(escrow))
}

pub async fn escrow_action(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<Escrow>, ApiError> {
    let id: EscrowId = id.parse()?;
    let action: EscrowAction = action.parse()?;
    let escrow = match action {
        EscrowAction::Release => state.escrows.release_escrow(&id, &actor).await?,
        EscrowAction::Cancel => state.escrows.cancel_escrow(&id, &actor).await?,
    };
    Ok(Json(escrow))
}

pub async fn user_escrows(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Escrow>>, ApiError> {
    let user_id = UserId::new(user_id)?;
    if !can_view(&actor, &user_id) {
        return Err(EscrowError::Unauthorized(format!(
            "{} may not list escrows of {user_id}",
            actor.id
        ))
        .into());
    }
    Ok(Json(state.escrows.get_user_escrows(&user_id).await?))
}
