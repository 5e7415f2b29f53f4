//! Product catalog: products, designs, manufacturing stages and raw-material suppliers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{numbering, ProductCategory};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::{numbering::next_number, status::delete_row};

#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub product_code: String,
    pub product_category: String,
    pub product_type: String,
    pub sub_type: Option<String>,
    pub variant: Option<String>,
    pub description: Option<String>,
    pub specifications: Json<serde_json::Value>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub product_category: ProductCategory,
    pub product_type: String,
    pub sub_type: Option<String>,
    pub variant: Option<String>,
    pub description: Option<String>,
    pub specifications: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub product_type: Option<String>,
    pub sub_type: Option<String>,
    pub variant: Option<String>,
    pub description: Option<String>,
    pub specifications: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProductFilter {
    pub category: Option<ProductCategory>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Design {
    pub id: Uuid,
    pub design_name: String,
    pub design_code: String,
    pub description: Option<String>,
    pub product_category: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DesignInput {
    pub design_name: String,
    pub design_code: String,
    pub description: Option<String>,
    pub product_category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ManufacturingStage {
    pub id: Uuid,
    pub stage_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StageInput {
    pub stage_name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub supplier_code: String,
    pub name: String,
    pub material_category: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SupplierInput {
    pub name: String,
    pub material_category: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

const PRODUCT_COLUMNS: &str = "id, product_code, product_category, product_type, sub_type, variant, \
     description, specifications, is_active, created_by, created_at, updated_at";

impl CatalogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Products ----

    pub async fn list_products(&self, filter: ProductFilter) -> AppResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::text IS NULL OR product_category = $1) AND (NOT $2 OR is_active) \
             ORDER BY product_code"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(filter.category.map(|c| c.as_str()))
            .bind(filter.active_only.unwrap_or(false))
            .fetch_all(&self.db)
            .await?;
        Ok(products)
    }

    pub async fn get_product(&self, id: Uuid) -> AppResult<Product> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Product codes are D#### for doors and F#### for frames
    pub async fn create_product(&self, user_id: Uuid, input: CreateProductInput) -> AppResult<Product> {
        check_field("product_type", shared::validate_non_empty(&input.product_type))?;
        let category = input.product_category.as_str();

        let mut tx = self.db.begin().await?;
        let code = next_number(
            &mut tx,
            "products",
            "product_code",
            numbering::product_series(category),
        )
        .await?;

        let sql = format!(
            r#"
            INSERT INTO products (product_code, product_category, product_type, sub_type, variant,
                                  description, specifications, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(&code)
            .bind(category)
            .bind(&input.product_type)
            .bind(&input.sub_type)
            .bind(&input.variant)
            .bind(&input.description)
            .bind(Json(input.specifications.unwrap_or_else(|| serde_json::json!({}))))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(product_code = %code, "Product created");
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, input: UpdateProductInput) -> AppResult<Product> {
        let sql = format!(
            r#"
            UPDATE products SET
                product_type = COALESCE($2, product_type),
                sub_type = COALESCE($3, sub_type),
                variant = COALESCE($4, variant),
                description = COALESCE($5, description),
                specifications = COALESCE($6, specifications),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(input.product_type)
            .bind(input.sub_type)
            .bind(input.variant)
            .bind(input.description)
            .bind(input.specifications.map(Json))
            .bind(input.is_active)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    pub async fn delete_product(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "products", id, "Product").await
    }

    // ---- Designs ----

    pub async fn list_designs(&self) -> AppResult<Vec<Design>> {
        let designs = sqlx::query_as::<_, Design>(
            "SELECT id, design_name, design_code, description, product_category, is_active, \
             created_at, updated_at FROM designs ORDER BY design_name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(designs)
    }

    pub async fn create_design(&self, user_id: Uuid, input: DesignInput) -> AppResult<Design> {
        check_field("design_name", shared::validate_non_empty(&input.design_name))?;
        check_field("design_code", shared::validate_non_empty(&input.design_code))?;

        let design = sqlx::query_as::<_, Design>(
            r#"
            INSERT INTO designs (design_name, design_code, description, product_category, is_active, created_by)
            VALUES ($1, $2, $3, COALESCE($4, 'Shutter'), COALESCE($5, TRUE), $6)
            RETURNING id, design_name, design_code, description, product_category, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(input.design_name.trim())
        .bind(input.design_code.trim())
        .bind(input.description)
        .bind(input.product_category)
        .bind(input.is_active)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(design)
    }

    pub async fn update_design(&self, id: Uuid, input: DesignInput) -> AppResult<Design> {
        sqlx::query_as::<_, Design>(
            r#"
            UPDATE designs SET
                design_name = $2, design_code = $3,
                description = COALESCE($4, description),
                product_category = COALESCE($5, product_category),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, design_name, design_code, description, product_category, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(input.design_name.trim())
        .bind(input.design_code.trim())
        .bind(input.description)
        .bind(input.product_category)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Design".to_string()))
    }

    pub async fn delete_design(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "designs", id, "Design").await
    }

    // ---- Manufacturing stages ----

    pub async fn list_stages(&self) -> AppResult<Vec<ManufacturingStage>> {
        let stages = sqlx::query_as::<_, ManufacturingStage>(
            "SELECT id, stage_name, description, is_active, created_at, updated_at \
             FROM manufacturing_stages ORDER BY stage_name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(stages)
    }

    pub async fn create_stage(&self, user_id: Uuid, input: StageInput) -> AppResult<ManufacturingStage> {
        check_field("stage_name", shared::validate_non_empty(&input.stage_name))?;
        let stage = sqlx::query_as::<_, ManufacturingStage>(
            r#"
            INSERT INTO manufacturing_stages (stage_name, description, is_active, created_by)
            VALUES ($1, $2, COALESCE($3, TRUE), $4)
            RETURNING id, stage_name, description, is_active, created_at, updated_at
            "#,
        )
        .bind(input.stage_name.trim())
        .bind(input.description)
        .bind(input.is_active)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(stage)
    }

    pub async fn update_stage(&self, id: Uuid, input: StageInput) -> AppResult<ManufacturingStage> {
        sqlx::query_as::<_, ManufacturingStage>(
            r#"
            UPDATE manufacturing_stages SET
                stage_name = $2,
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, stage_name, description, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(input.stage_name.trim())
        .bind(input.description)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Manufacturing stage".to_string()))
    }

    pub async fn delete_stage(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "manufacturing_stages", id, "Manufacturing stage").await
    }

    // ---- Suppliers ----

    pub async fn list_suppliers(&self) -> AppResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT id, supplier_code, name, material_category, contact_person, phone, is_active, \
             created_at, updated_at FROM suppliers ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(suppliers)
    }

    pub async fn create_supplier(&self, user_id: Uuid, input: SupplierInput) -> AppResult<Supplier> {
        check_field("name", shared::validate_non_empty(&input.name))?;

        let mut tx = self.db.begin().await?;
        let code = next_number(&mut tx, "suppliers", "supplier_code", numbering::SUPPLIER).await?;
        let supplier = sqlx::query_as::<_, Supplier>(
            r#"
            INSERT INTO suppliers (supplier_code, name, material_category, contact_person, phone,
                                   is_active, created_by)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, TRUE), $7)
            RETURNING id, supplier_code, name, material_category, contact_person, phone, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(&code)
        .bind(input.name.trim())
        .bind(input.material_category)
        .bind(input.contact_person)
        .bind(input.phone)
        .bind(input.is_active)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(supplier)
    }

    pub async fn update_supplier(&self, id: Uuid, input: SupplierInput) -> AppResult<Supplier> {
        sqlx::query_as::<_, Supplier>(
            r#"
            UPDATE suppliers SET
                name = $2,
                material_category = COALESCE($3, material_category),
                contact_person = COALESCE($4, contact_person),
                phone = COALESCE($5, phone),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, supplier_code, name, material_category, contact_person, phone, is_active,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.material_category)
        .bind(input.contact_person)
        .bind(input.phone)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))
    }

    pub async fn delete_supplier(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "suppliers", id, "Supplier").await
    }
}
