use crate::error::{ApiError, Result};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use helpdesk_core::types::{new_id, DocumentMetadata};
use serde::Deserialize;
use serde_json::{json, Value};
use storage::ChunkFilter;

const DEFAULT_SEARCH_LIMIT: usize = 5;

pub async fn test_connection(State(state): State<AppState>) -> Result<Json<Value>> {
    let status = state
        .knowledge
        .test_connection()
        .await
        .map_err(state.fail("Erro ao conectar com a base de conhecimento"))?;

    Ok(Json(json!({
        "status": "success",
        "message": "Conexão com a base de conhecimento funcionando",
        "data": status,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TestDocumentRequest {
    #[serde(default)]
    text: String,
    title: Option<String>,
}

pub async fn add_test_document(
    State(state): State<AppState>,
    Json(request): Json<TestDocumentRequest>,
) -> Result<Json<Value>> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Texto é obrigatório".into()));
    }

    let id = state
        .knowledge
        .add_test_document(&request.text, request.title.as_deref())
        .await
        .map_err(state.fail("Erro ao adicionar documento de teste"))?;

    Ok(Json(json!({
        "status": "success",
        "message": "Documento de teste adicionado com sucesso",
        "documentId": id,
    })))
}

pub async fn create_index(State(state): State<AppState>) -> Result<Json<Value>> {
    let created = state
        .knowledge
        .ensure_index()
        .await
        .map_err(state.fail("Erro ao criar índice"))?;

    let message = if created {
        "Índice criado com sucesso"
    } else {
        "Índice já existe"
    };
    Ok(Json(json!({
        "status": "success",
        "message": message,
        "indexName": state.knowledge.index().name(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    category: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let page = state
        .knowledge
        .list_documents(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(10),
            query.category.as_deref(),
        )
        .await
        .map_err(state.fail("Erro ao listar documentos"))?;

    Ok(Json(json!({ "status": "success", "data": page })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocumentRequest {
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(flatten)]
    metadata: DocumentMetadata,
}

pub async fn add_document(
    State(state): State<AppState>,
    Json(request): Json<NewDocumentRequest>,
) -> Result<Json<Value>> {
    if request.title.trim().is_empty() || request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Título e conteúdo são obrigatórios".into()));
    }

    let id = request.id.unwrap_or_else(new_id);
    let chunks = state
        .knowledge
        .add_document(&id, &request.title, &request.content, request.metadata)
        .await
        .map_err(state.fail("Erro ao adicionar documento"))?;

    Ok(Json(json!({
        "status": "success",
        "message": "Documento adicionado com sucesso",
        "documentId": id,
        "chunks": chunks,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequest {
    is_active: bool,
}

pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActiveRequest>,
) -> Result<Json<Value>> {
    state
        .knowledge
        .set_document_active(&id, request.is_active)
        .await
        .map_err(state.fail("Erro ao atualizar documento"))?;

    Ok(Json(json!({ "status": "success", "id": id, "isActive": request.is_active })))
}

pub async fn delete_document(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    state
        .knowledge
        .delete_document(&id)
        .await
        .map_err(state.fail("Erro ao remover documento"))?;

    Ok(Json(json!({ "status": "success", "message": "Documento removido com sucesso" })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    query: String,
    limit: Option<usize>,
    #[serde(flatten)]
    filter: ChunkFilter,
}

pub async fn search(State(state): State<AppState>, Json(request): Json<SearchRequest>) -> Result<Json<Value>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Consulta é obrigatória".into()));
    }

    let filter = (!request.filter.is_empty()).then_some(&request.filter);
    let result = state
        .knowledge
        .search_similar(&request.query, request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT), filter)
        .await
        .map_err(state.fail("Erro ao buscar na base de conhecimento"))?;

    Ok(Json(json!({ "status": "success", "data": result })))
}
