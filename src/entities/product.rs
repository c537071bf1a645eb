use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Catalog product. Prices are in AED with two decimal places.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub sku: Option<String>,
    pub description: String,
    pub short_description: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub sale_price: Option<Decimal>,
    pub main_image_url: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Price the shop currently charges: the sale price applies only while it
    /// undercuts the regular price.
    pub fn current_price(&self) -> Decimal {
        match self.sale_price {
            Some(sale) if sale < self.price => sale,
            _ => self.price,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    #[sea_orm(has_many = "super::product_image::Entity")]
    Images,
    #[sea_orm(has_many = "super::product_specification::Entity")]
    Specifications,
    #[sea_orm(has_many = "super::product_variant::Entity")]
    Variants,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::product_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl Related<super::product_specification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Specifications.def()
    }
}

impl Related<super::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Variants.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal, sale_price: Option<Decimal>) -> Model {
        Model {
            id: 1,
            category_id: None,
            name: "Self-inking stamp".to_string(),
            slug: "self-inking-stamp".to_string(),
            sku: None,
            description: String::new(),
            short_description: String::new(),
            price,
            sale_price,
            main_image_url: None,
            is_active: true,
            is_featured: false,
            stock_quantity: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn current_price_without_sale() {
        assert_eq!(product(dec!(100.00), None).current_price(), dec!(100.00));
    }

    #[test]
    fn current_price_uses_lower_sale_price() {
        assert_eq!(
            product(dec!(100.00), Some(dec!(75.00))).current_price(),
            dec!(75.00)
        );
    }

    #[test]
    fn sale_price_at_or_above_regular_is_ignored() {
        assert_eq!(
            product(dec!(100.00), Some(dec!(100.00))).current_price(),
            dec!(100.00)
        );
        assert_eq!(
            product(dec!(100.00), Some(dec!(120.00))).current_price(),
            dec!(100.00)
        );
    }
}
