use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    entities::{cart, cart_item, product, product_variant},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Identifies who a cart belongs to: a signed-in account or a guest session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(i64),
    Guest(String),
}

/// Input for adding an item to a cart
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct AddToCartInput {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
}

/// A cart line joined with its catalog names, plus the derived line total.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub product_slug: String,
    pub variant_id: Option<i64>,
    pub variant_name: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
}

/// A cart with its lines and derived totals
#[derive(Debug, Clone, Serialize)]
pub struct CartWithItems {
    pub id: i64,
    pub items: Vec<CartLineView>,
    pub subtotal: Decimal,
    pub items_count: i32,
}

/// Shopping cart service.
///
/// Carts are created lazily on first access and identified by owner, never by
/// a client-supplied cart id. Item prices are captured when a line is created
/// and are not recomputed afterwards.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Finds the owner's cart, creating it if it does not exist yet.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = find_cart(&*self.db, owner).await? {
            return Ok(existing);
        }

        let active = match owner {
            CartOwner::User(user_id) => cart::ActiveModel {
                user_id: Set(Some(*user_id)),
                session_key: Set(None),
                ..Default::default()
            },
            CartOwner::Guest(session_key) => cart::ActiveModel {
                user_id: Set(None),
                session_key: Set(Some(session_key.clone())),
                ..Default::default()
            },
        };

        let created = active.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::CartCreated(created.id))
            .await;

        info!("Created cart {} for {:?}", created.id, owner);
        Ok(created)
    }

    /// Returns the owner's cart with items and derived totals, creating the
    /// cart lazily when missing.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_cart(owner).await?;
        load_cart_view(&*self.db, &cart).await
    }

    /// Adds a product (or product variant) to the owner's cart.
    ///
    /// The line price is captured here: current product price plus the variant
    /// adjustment. Adding the same product/variant pair again increments the
    /// existing line's quantity and keeps its originally captured price.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        input: AddToCartInput,
    ) -> Result<CartWithItems, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(owner).await?;

        let txn = self.db.begin().await?;

        let product = product::Entity::find_by_id(input.product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let mut price = product.current_price();

        if let Some(variant_id) = input.variant_id {
            let variant = product_variant::Entity::find_by_id(variant_id)
                .filter(product_variant::Column::ProductId.eq(product.id))
                .filter(product_variant::Column::IsActive.eq(true))
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Product variant not found".to_string()))?;
            price += variant.price_adjustment;
        }

        // One line per (product, variant) pair
        let mut query = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id));
        query = match input.variant_id {
            Some(variant_id) => query.filter(cart_item::Column::VariantId.eq(variant_id)),
            None => query.filter(cart_item::Column::VariantId.is_null()),
        };
        let existing_item = query.one(&txn).await?;

        if let Some(item) = existing_item {
            let current_quantity = item.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(current_quantity + input.quantity);
            item.update(&txn).await?;
        } else {
            cart_item::ActiveModel {
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
                price: Set(price),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
                variant_id: input.variant_id,
                quantity: input.quantity,
            })
            .await;

        info!(
            "Added item to cart {}: product {} x{}",
            cart.id, input.product_id, input.quantity
        );
        load_cart_view(&*self.db, &cart).await
    }

    /// Updates the quantity of an item in the owner's cart.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        owner: &CartOwner,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(owner).await?;
        let item = self.find_owned_item(&cart, item_id).await?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
                quantity,
            })
            .await;

        load_cart_view(&*self.db, &cart).await
    }

    /// Removes an item from the owner's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: i64,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_cart(owner).await?;
        let item = self.find_owned_item(&cart, item_id).await?;

        cart_item::Entity::delete_by_id(item.id)
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;

        load_cart_view(&*self.db, &cart).await
    }

    /// Removes all items from the owner's cart. The cart row itself persists.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, owner: &CartOwner) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_cart(owner).await?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;

        info!("Cleared cart {}", cart.id);
        load_cart_view(&*self.db, &cart).await
    }

    /// Looks up a cart item and checks it belongs to the given cart. A miss
    /// on either count is the same generic NotFound so item ids of other
    /// carts cannot be probed.
    async fn find_owned_item(
        &self,
        cart: &cart::Model,
        item_id: i64,
    ) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))
    }
}

/// Finds an owner's cart without creating it.
pub async fn find_cart<C: ConnectionTrait>(
    db: &C,
    owner: &CartOwner,
) -> Result<Option<cart::Model>, ServiceError> {
    let query = match owner {
        CartOwner::User(user_id) => {
            cart::Entity::find().filter(cart::Column::UserId.eq(*user_id))
        }
        CartOwner::Guest(session_key) => {
            cart::Entity::find().filter(cart::Column::SessionKey.eq(session_key.clone()))
        }
    };
    Ok(query.one(db).await?)
}

/// Loads the lines of a cart joined with product/variant names.
pub async fn load_cart_lines<C: ConnectionTrait>(
    db: &C,
    cart_id: i64,
) -> Result<Vec<CartLineView>, ServiceError> {
    let rows = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::Id)
        .find_also_related(product::Entity)
        .all(db)
        .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for (item, product) in rows {
        let variant_name = match item.variant_id {
            Some(variant_id) => product_variant::Entity::find_by_id(variant_id)
                .one(db)
                .await?
                .map(|v| v.name),
            None => None,
        };

        let (product_name, product_slug) = product
            .map(|p| (p.name, p.slug))
            .unwrap_or_else(|| ("(removed)".to_string(), String::new()));

        lines.push(CartLineView {
            id: item.id,
            product_id: item.product_id,
            product_name,
            product_slug,
            variant_id: item.variant_id,
            variant_name,
            quantity: item.quantity,
            price: item.price,
            line_total: item.line_total(),
        });
    }

    Ok(lines)
}

async fn load_cart_view<C: ConnectionTrait>(
    db: &C,
    cart: &cart::Model,
) -> Result<CartWithItems, ServiceError> {
    let items = load_cart_lines(db, cart.id).await?;
    Ok(summarize(cart.id, items))
}

fn summarize(cart_id: i64, items: Vec<CartLineView>) -> CartWithItems {
    let subtotal = items.iter().map(|line| line.line_total).sum();
    let items_count = items.iter().map(|line| line.quantity).sum();
    CartWithItems {
        id: cart_id,
        items,
        subtotal,
        items_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(id: i64, price: Decimal, quantity: i32) -> CartLineView {
        CartLineView {
            id,
            product_id: id,
            product_name: format!("Product {}", id),
            product_slug: format!("product-{}", id),
            variant_id: None,
            variant_name: None,
            quantity,
            price,
            line_total: price * Decimal::from(quantity),
        }
    }

    #[test]
    fn subtotal_is_sum_of_line_totals() {
        let view = summarize(1, vec![line(1, dec!(100.00), 2), line(2, dec!(50.00), 1)]);
        assert_eq!(view.subtotal, dec!(250.00));
        assert_eq!(view.items_count, 3);
    }

    #[test]
    fn empty_cart_has_zero_totals() {
        let view = summarize(1, vec![]);
        assert_eq!(view.subtotal, Decimal::ZERO);
        assert_eq!(view.items_count, 0);
    }

    #[test]
    fn line_total_follows_captured_price() {
        let item = cart_item::Model {
            id: 1,
            cart_id: 1,
            product_id: 1,
            variant_id: None,
            quantity: 3,
            price: dec!(19.99),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(item.line_total(), dec!(59.97));
    }
}
