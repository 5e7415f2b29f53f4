//! Master data handlers: parties, products, designs, stages and suppliers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{PaginatedResponse, Pagination, RoleGroup};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::catalog::{
    CreateProductInput, Design, DesignInput, ManufacturingStage, Product, ProductFilter, StageInput,
    Supplier, SupplierInput, UpdateProductInput,
};
use crate::services::parties::{CreatePartyInput, Party, PartyFilter, PartyHistory, UpdatePartyInput};
use crate::services::{CatalogService, PartyService};
use crate::AppState;

fn require_catalog_admin(user: &AuthUser) -> AppResult<()> {
    user.require_any(&[RoleGroup::Admin, RoleGroup::ProductionManager])
}

// ---- Parties ----

pub async fn list_parties(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(filter): Query<PartyFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<Party>>> {
    let parties = PartyService::new(state.db.clone())
        .list_parties(filter, pagination)
        .await?;
    Ok(Json(parties))
}

pub async fn get_party(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Party>> {
    Ok(Json(PartyService::new(state.db.clone()).get_party(id).await?))
}

pub async fn create_party(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreatePartyInput>,
) -> AppResult<(StatusCode, Json<Party>)> {
    user.require(RoleGroup::PartyEditor)?;
    let party = PartyService::new(state.db.clone())
        .create_party(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(party)))
}

pub async fn update_party(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePartyInput>,
) -> AppResult<Json<Party>> {
    user.require(RoleGroup::PartyEditor)?;
    let party = PartyService::new(state.db.clone())
        .update_party(user.user_id, id, input)
        .await?;
    Ok(Json(party))
}

pub async fn delete_party(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::Admin)?;
    PartyService::new(state.db.clone()).delete_party(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_party(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Party>> {
    user.require(RoleGroup::PartyEditor)?;
    Ok(Json(PartyService::new(state.db.clone()).submit_for_approval(id).await?))
}

pub async fn approve_party(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Party>> {
    user.require(RoleGroup::ProductionManager)?;
    let party = PartyService::new(state.db.clone())
        .approve_party(user.user_id, id)
        .await?;
    Ok(Json(party))
}

pub async fn party_history(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<PartyHistory>>> {
    Ok(Json(PartyService::new(state.db.clone()).party_history(id).await?))
}

// ---- Products ----

pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(CatalogService::new(state.db.clone()).list_products(filter).await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    Ok(Json(CatalogService::new(state.db.clone()).get_product(id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    require_catalog_admin(&user)?;
    let product = CatalogService::new(state.db.clone())
        .create_product(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    require_catalog_admin(&user)?;
    Ok(Json(CatalogService::new(state.db.clone()).update_product(id, input).await?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_catalog_admin(&user)?;
    CatalogService::new(state.db.clone()).delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Designs ----

pub async fn list_designs(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<Design>>> {
    Ok(Json(CatalogService::new(state.db.clone()).list_designs().await?))
}

pub async fn create_design(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<DesignInput>,
) -> AppResult<(StatusCode, Json<Design>)> {
    require_catalog_admin(&user)?;
    let design = CatalogService::new(state.db.clone())
        .create_design(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(design)))
}

pub async fn update_design(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<DesignInput>,
) -> AppResult<Json<Design>> {
    require_catalog_admin(&user)?;
    Ok(Json(CatalogService::new(state.db.clone()).update_design(id, input).await?))
}

pub async fn delete_design(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_catalog_admin(&user)?;
    CatalogService::new(state.db.clone()).delete_design(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Manufacturing stages ----

pub async fn list_stages(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<ManufacturingStage>>> {
    Ok(Json(CatalogService::new(state.db.clone()).list_stages().await?))
}

pub async fn create_stage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<StageInput>,
) -> AppResult<(StatusCode, Json<ManufacturingStage>)> {
    require_catalog_admin(&user)?;
    let stage = CatalogService::new(state.db.clone())
        .create_stage(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

pub async fn update_stage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<StageInput>,
) -> AppResult<Json<ManufacturingStage>> {
    require_catalog_admin(&user)?;
    Ok(Json(CatalogService::new(state.db.clone()).update_stage(id, input).await?))
}

pub async fn delete_stage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_catalog_admin(&user)?;
    CatalogService::new(state.db.clone()).delete_stage(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Suppliers ----

pub async fn list_suppliers(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<Supplier>>> {
    Ok(Json(CatalogService::new(state.db.clone()).list_suppliers().await?))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<SupplierInput>,
) -> AppResult<(StatusCode, Json<Supplier>)> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::PurchaseUser])?;
    let supplier = CatalogService::new(state.db.clone())
        .create_supplier(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn update_supplier(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SupplierInput>,
) -> AppResult<Json<Supplier>> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::PurchaseUser])?;
    Ok(Json(CatalogService::new(state.db.clone()).update_supplier(id, input).await?))
}

pub async fn delete_supplier(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_catalog_admin(&user)?;
    CatalogService::new(state.db.clone()).delete_supplier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
