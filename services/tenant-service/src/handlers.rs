// Tenant API: CRUD, lifecycle verbs, realm lookup

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use ldp_shared::TenantId;

use crate::error::{TenantServiceError, TenantServiceResult};
use crate::models::{CreateTenantRequest, LifecycleAction, TenantRecord, UpdateTenantRequest};
use crate::service::TenantLifecycleService;

pub type ServiceState = Arc<TenantLifecycleService>;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TenantListResponse {
    pub data: Vec<TenantRecord>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct RealmResponse {
    pub realm: Option<String>,
}

pub async fn create_tenant(
    State(service): State<ServiceState>,
    Json(request): Json<CreateTenantRequest>,
) -> TenantServiceResult<(StatusCode, Json<TenantRecord>)> {
    let record = service.create_tenant(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_tenant(
    State(service): State<ServiceState>,
    Path(id): Path<TenantId>,
) -> TenantServiceResult<Json<TenantRecord>> {
    Ok(Json(service.get_tenant(&id).await?))
}

pub async fn list_tenants(
    State(service): State<ServiceState>,
    Query(query): Query<ListQuery>,
) -> TenantServiceResult<Json<TenantListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = i64::from(page - 1) * i64::from(limit);

    let (data, total) = service.list_tenants(i64::from(limit), offset).await?;
    Ok(Json(TenantListResponse {
        data,
        page,
        limit,
        total,
    }))
}

pub async fn update_tenant(
    State(service): State<ServiceState>,
    Path(id): Path<TenantId>,
    Json(request): Json<UpdateTenantRequest>,
) -> TenantServiceResult<Json<TenantRecord>> {
    Ok(Json(service.update_tenant(&id, request).await?))
}

/// DELETE maps onto deactivation: tenant records are never hard-deleted,
/// the identifier stays reserved and the audit trail survives.
pub async fn delete_tenant(
    State(service): State<ServiceState>,
    Path(id): Path<TenantId>,
) -> TenantServiceResult<Json<TenantRecord>> {
    let record = service
        .apply_lifecycle(&id, LifecycleAction::Deactivate)
        .await?;
    Ok(Json(record))
}

/// POST /tenants/{id}/{verb} for activate, suspend, deactivate, reinstate,
/// reactivate. Returns the updated record.
pub async fn lifecycle(
    State(service): State<ServiceState>,
    Path((id, verb)): Path<(TenantId, String)>,
) -> TenantServiceResult<Json<TenantRecord>> {
    let action = LifecycleAction::parse(&verb)
        .ok_or_else(|| TenantServiceError::Validation(format!("unknown verb '{}'", verb)))?;
    Ok(Json(service.apply_lifecycle(&id, action).await?))
}

pub async fn get_realm(
    State(service): State<ServiceState>,
    Path(id): Path<TenantId>,
) -> TenantServiceResult<Json<RealmResponse>> {
    let realm = service.get_realm(&id).await?;
    Ok(Json(RealmResponse { realm }))
}
