use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    entities::{category, product, product_image, product_specification, product_variant},
    errors::ServiceError,
};

/// Filters for the product listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Category slug
    pub category: Option<String>,
    /// Case-insensitive substring match on name and description
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// A product with its sub-resources, as shown on a product page
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: product::Model,
    pub current_price: Decimal,
    pub images: Vec<product_image::Model>,
    pub specifications: Vec<product_specification::Model>,
    pub variants: Vec<product_variant::Model>,
}

/// A page of products
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductInput {
    pub category_id: Option<i64>,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub slug: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub main_image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub stock_quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductImageInput {
    #[validate(length(min = 1))]
    pub image_url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductSpecificationInput {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub value: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductVariantInput {
    #[validate(length(min = 1))]
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub price_adjustment: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Catalog read and management service. Customer-facing reads see only active
/// rows; staff see everything and own the write operations.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // Categories

    #[instrument(skip(self))]
    pub async fn list_categories(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<category::Model>, ServiceError> {
        let mut query = category::Entity::find()
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Name);
        if !include_inactive {
            query = query.filter(category::Column::IsActive.eq(true));
        }
        Ok(query.all(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_category(
        &self,
        slug: &str,
        include_inactive: bool,
    ) -> Result<category::Model, ServiceError> {
        let mut query = category::Entity::find().filter(category::Column::Slug.eq(slug));
        if !include_inactive {
            query = query.filter(category::Column::IsActive.eq(true));
        }
        query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category not found".to_string()))
    }

    /// Active products of a category, newest first.
    #[instrument(skip(self))]
    pub async fn category_products(
        &self,
        slug: &str,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let category = self.get_category(slug, false).await?;
        Ok(product::Entity::find()
            .filter(product::Column::CategoryId.eq(category.id))
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn create_category(
        &self,
        input: CategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let created = category::ActiveModel {
            name: Set(input.name),
            slug: Set(input.slug),
            description: Set(input.description),
            image_url: Set(input.image_url),
            is_active: Set(input.is_active),
            sort_order: Set(input.sort_order),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!("Created category {} ({})", created.id, created.slug);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        id: i64,
        input: CategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category not found".to_string()))?;

        let mut active: category::ActiveModel = existing.into();
        active.name = Set(input.name);
        active.slug = Set(input.slug);
        active.description = Set(input.description);
        active.image_url = Set(input.image_url);
        active.is_active = Set(input.is_active);
        active.sort_order = Set(input.sort_order);
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: i64) -> Result<(), ServiceError> {
        let result = category::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Category not found".to_string()));
        }
        info!("Deleted category {}", id);
        Ok(())
    }

    // Products

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        include_inactive: bool,
    ) -> Result<ProductPage, ServiceError> {
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(20).clamp(1, 100);

        let mut query = product::Entity::find().order_by_desc(product::Column::CreatedAt);
        if !include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        if let Some(slug) = filter.category.as_deref() {
            let category = self.get_category(slug, include_inactive).await?;
            query = query.filter(product::Column::CategoryId.eq(category.id));
        }
        if let Some(featured) = filter.featured {
            query = query.filter(product::Column::IsFeatured.eq(featured));
        }
        if let Some(search) = filter.search.as_deref() {
            let pattern = format!("%{}%", search);
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.like(&pattern))
                    .add(product::Column::Description.like(&pattern)),
            );
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            products,
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        slug: &str,
        include_inactive: bool,
    ) -> Result<ProductDetail, ServiceError> {
        let mut query = product::Entity::find().filter(product::Column::Slug.eq(slug));
        if !include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        let product = query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        self.load_product_detail(product).await
    }

    async fn load_product_detail(
        &self,
        product: product::Model,
    ) -> Result<ProductDetail, ServiceError> {
        let images = product_image::Entity::find()
            .filter(product_image::Column::ProductId.eq(product.id))
            .order_by_asc(product_image::Column::SortOrder)
            .all(&*self.db)
            .await?;
        let specifications = product_specification::Entity::find()
            .filter(product_specification::Column::ProductId.eq(product.id))
            .order_by_asc(product_specification::Column::SortOrder)
            .all(&*self.db)
            .await?;
        let variants = product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product.id))
            .filter(product_variant::Column::IsActive.eq(true))
            .order_by_asc(product_variant::Column::Id)
            .all(&*self.db)
            .await?;

        let current_price = product.current_price();
        Ok(ProductDetail {
            product,
            current_price,
            images,
            specifications,
            variants,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: ProductInput,
    ) -> Result<product::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let created = product::ActiveModel {
            category_id: Set(input.category_id),
            name: Set(input.name),
            slug: Set(input.slug),
            sku: Set(input.sku),
            description: Set(input.description),
            short_description: Set(input.short_description),
            price: Set(input.price),
            sale_price: Set(input.sale_price),
            main_image_url: Set(input.main_image_url),
            is_active: Set(input.is_active),
            is_featured: Set(input.is_featured),
            stock_quantity: Set(input.stock_quantity),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!("Created product {} ({})", created.id, created.slug);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: i64,
        input: ProductInput,
    ) -> Result<product::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let mut active: product::ActiveModel = existing.into();
        active.category_id = Set(input.category_id);
        active.name = Set(input.name);
        active.slug = Set(input.slug);
        active.sku = Set(input.sku);
        active.description = Set(input.description);
        active.short_description = Set(input.short_description);
        active.price = Set(input.price);
        active.sale_price = Set(input.sale_price);
        active.main_image_url = Set(input.main_image_url);
        active.is_active = Set(input.is_active);
        active.is_featured = Set(input.is_featured);
        active.stock_quantity = Set(input.stock_quantity);
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i64) -> Result<(), ServiceError> {
        let result = product::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Product not found".to_string()));
        }
        info!("Deleted product {}", id);
        Ok(())
    }

    // Product sub-resources

    #[instrument(skip(self, input))]
    pub async fn add_product_image(
        &self,
        product_id: i64,
        input: ProductImageInput,
    ) -> Result<product_image::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        self.require_product(product_id).await?;

        Ok(product_image::ActiveModel {
            product_id: Set(product_id),
            image_url: Set(input.image_url),
            alt_text: Set(input.alt_text),
            sort_order: Set(input.sort_order),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product_image(
        &self,
        product_id: i64,
        image_id: i64,
    ) -> Result<(), ServiceError> {
        let result = product_image::Entity::delete_many()
            .filter(product_image::Column::Id.eq(image_id))
            .filter(product_image::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Product image not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn add_product_specification(
        &self,
        product_id: i64,
        input: ProductSpecificationInput,
    ) -> Result<product_specification::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        self.require_product(product_id).await?;

        Ok(product_specification::ActiveModel {
            product_id: Set(product_id),
            name: Set(input.name),
            value: Set(input.value),
            sort_order: Set(input.sort_order),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product_specification(
        &self,
        product_id: i64,
        spec_id: i64,
    ) -> Result<(), ServiceError> {
        let result = product_specification::Entity::delete_many()
            .filter(product_specification::Column::Id.eq(spec_id))
            .filter(product_specification::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(
                "Product specification not found".to_string(),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn add_product_variant(
        &self,
        product_id: i64,
        input: ProductVariantInput,
    ) -> Result<product_variant::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        self.require_product(product_id).await?;

        Ok(product_variant::ActiveModel {
            product_id: Set(product_id),
            name: Set(input.name),
            sku: Set(input.sku),
            price_adjustment: Set(input.price_adjustment),
            stock_quantity: Set(input.stock_quantity),
            is_active: Set(input.is_active),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product_variant(
        &self,
        product_id: i64,
        variant_id: i64,
        input: ProductVariantInput,
    ) -> Result<product_variant::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = product_variant::Entity::find_by_id(variant_id)
            .filter(product_variant::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product variant not found".to_string()))?;

        let mut active: product_variant::ActiveModel = existing.into();
        active.name = Set(input.name);
        active.sku = Set(input.sku);
        active.price_adjustment = Set(input.price_adjustment);
        active.stock_quantity = Set(input.stock_quantity);
        active.is_active = Set(input.is_active);
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product_variant(
        &self,
        product_id: i64,
        variant_id: i64,
    ) -> Result<(), ServiceError> {
        let result = product_variant::Entity::delete_many()
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(
                "Product variant not found".to_string(),
            ));
        }
        Ok(())
    }

    async fn require_product(&self, product_id: i64) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }
}
