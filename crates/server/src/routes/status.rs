use crate::error::Result;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn database(State(state): State<AppState>) -> Result<Json<Value>> {
    state
        .sqlite
        .ping()
        .await
        .map_err(state.fail("Erro ao conectar com o banco de dados"))?;

    Ok(Json(json!({
        "status": "connected",
        "message": "Banco de dados conectado e funcionando",
    })))
}
