use crate::error::{ApiError, Result};
use crate::state::AppState;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use helpdesk_core::error::HelpdeskError;
use helpdesk_core::types::{new_id, User};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use validator::{Validate, ValidationErrors};

const EMAIL_IN_USE: &str = "E-mail já está em uso";

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SignupRequest {
    name: String,
    #[validate(email(message = "E-mail inválido"))]
    email: String,
    #[validate(length(min = 6, message = "A senha deve ter pelo menos 6 caracteres"))]
    password: String,
}

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Dados inválidos".to_string())
}

fn hash_password(password: &str) -> std::result::Result<String, HelpdeskError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HelpdeskError::Internal(format!("password hashing failed: {e}")))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    if request.name.trim().is_empty() || request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("Nome, e-mail e senha são obrigatórios".into()));
    }
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(first_message(&e)))?;

    let fail = state.fail("Erro interno do servidor");
    let email = request.email.trim().to_lowercase();
    if state.sqlite.find_user_by_email(&email).await.map_err(&fail)?.is_some() {
        return Err(ApiError::BadRequest(EMAIL_IN_USE.into()));
    }

    let user = User {
        id: new_id(),
        name: request.name.trim().to_string(),
        email,
        password_hash: hash_password(&request.password).map_err(&fail)?,
        created_at: Utc::now(),
    };
    match state.sqlite.create_user(&user).await {
        Ok(()) => {}
        // Lost a race with a concurrent signup.
        Err(HelpdeskError::AlreadyExists { .. }) => return Err(ApiError::BadRequest(EMAIL_IN_USE.into())),
        Err(e) => return Err(fail(e)),
    }
    info!(user_id = %user.id, "Account created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Conta criada com sucesso",
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "createdAt": user.created_at,
            },
        })),
    ))
}
