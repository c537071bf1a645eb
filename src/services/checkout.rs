use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        cart_item,
        order::{self, OrderStatus, PaymentStatus},
        order_file, order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::cart::{find_cart, load_cart_lines, CartOwner},
    storage::FileStorage,
};

/// Matches upload field names of the form `products[<index>][<file_type>]`.
static FILE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^products\[(\d+)\]\[([A-Za-z0-9_-]+)\]$").unwrap());

/// Billing and delivery details collected at checkout
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutInput {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub phone: String,
    pub company_name: Option<String>,
    #[validate(length(min = 1))]
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub country: String,
    pub postal_code: Option<String>,
    pub order_notes: Option<String>,
}

/// One multipart file part, already read into memory by the handler
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Raw multipart field name, e.g. `products[0][specificDesign]`
    pub field_name: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Outcome of a completed checkout
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub files: Vec<order_file::Model>,
}

/// Converts a cart into an order.
///
/// The whole conversion runs in one transaction; the cart is cleared only
/// after the order and its lines exist, so a failure leaves the cart intact.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    storage: FileStorage,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: FileStorage,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            storage,
            event_sender,
        }
    }

    /// Places an order from the owner's cart.
    ///
    /// Line prices are the prices captured when the items entered the cart,
    /// never today's catalog prices. Uploaded files are matched to cart lines
    /// by position through their `products[<index>][<file_type>]` field name;
    /// parts with a malformed field name or an index past the end of the cart
    /// are dropped without failing the checkout. Every surviving upload is
    /// extension-checked before the transaction opens and before anything is
    /// written to disk, so a rejected file leaves no order rows and no
    /// stray files behind.
    #[instrument(skip(self, input, files), fields(files = files.len()))]
    pub async fn checkout(
        &self,
        owner: &CartOwner,
        user_id: Option<i64>,
        input: CheckoutInput,
        files: Vec<UploadedFile>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let cart = find_cart(&*self.db, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        // Snapshot before anything mutates
        let lines = load_cart_lines(&*self.db, cart.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Match uploads to cart lines and reject bad extensions up front, so
        // nothing has touched the database or the disk when a part fails
        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            let Some((index, file_type)) = parse_file_key(&file.field_name) else {
                warn!("Dropping upload with unrecognized field {:?}", file.field_name);
                continue;
            };
            let Some(line) = lines.get(index) else {
                warn!(
                    "Dropping upload {:?}: index {} beyond cart size {}",
                    file.field_name,
                    index,
                    lines.len()
                );
                continue;
            };
            FileStorage::validate_extension(&file.file_name)?;
            attachments.push((file, file_type, line.product_name.clone()));
        }

        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
        let shipping_cost = Decimal::ZERO;
        let tax = Decimal::ZERO;
        let total = subtotal + shipping_cost + tax;

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            order_number: Set(generate_order_number()),
            user_id: Set(user_id),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            email: Set(input.email),
            phone: Set(input.phone),
            company_name: Set(input.company_name),
            address_line_1: Set(input.address_line_1),
            address_line_2: Set(input.address_line_2),
            city: Set(input.city),
            state: Set(input.state),
            country: Set(input.country),
            postal_code: Set(input.postal_code),
            order_notes: Set(input.order_notes),
            subtotal: Set(subtotal),
            shipping_cost: Set(shipping_cost),
            tax: Set(tax),
            total: Set(total),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(Some(line.product_id)),
                product_name: Set(line.product_name.clone()),
                variant_id: Set(line.variant_id),
                variant_name: Set(line.variant_name.clone()),
                quantity: Set(line.quantity),
                price: Set(line.price),
                total: Set(line.line_total),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let mut saved_files = Vec::with_capacity(attachments.len());
        for (file, file_type, product_name) in attachments {
            let stored = self.storage.store_order_file(&file.file_name, &file.data).await?;
            let saved = order_file::ActiveModel {
                order_id: Set(order.id),
                file_name: Set(file.file_name),
                stored_path: Set(stored.relative_path),
                file_type: Set(file_type),
                file_size: Set(stored.size),
                product_name: Set(Some(product_name)),
                description: Set(None),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            saved_files.push(saved);
        }

        // Clear the cart last so the order is fully built before the cart
        // stops representing it
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                order_id: order.id,
                cart_id: cart.id,
            })
            .await;

        info!(
            "Checkout complete: order {} ({}) with {} items, {} files, total {}",
            order.id, order.order_number, items.len(), saved_files.len(), order.total
        );

        Ok(CheckoutOutcome {
            order,
            items,
            files: saved_files,
        })
    }
}

/// Generates an order number of the form `ORD-YYYYMMDD-XXXXXXXX` where the
/// suffix is the first 8 hex digits of a random UUID, uppercased.
pub fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", date, suffix)
}

/// Parses an upload field name into (cart line index, file type). Returns
/// None for anything that does not match `products[<index>][<file_type>]`.
pub fn parse_file_key(field_name: &str) -> Option<(usize, String)> {
    let captures = FILE_KEY_RE.captures(field_name)?;
    let index: usize = captures.get(1)?.as_str().parse().ok()?;
    let file_type = captures.get(2)?.as_str().to_string();
    Some((index, file_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use crate::services::cart::CartLineView;

    #[test]
    fn order_number_has_expected_shape() {
        let number = generate_order_number();
        assert!(number.starts_with("ORD-"));
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn order_numbers_are_unique_enough() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert_ne!(a, b);
    }

    #[test]
    fn parses_well_formed_file_keys() {
        assert_eq!(
            parse_file_key("products[0][specificDesign]"),
            Some((0, "specificDesign".to_string()))
        );
        assert_eq!(
            parse_file_key("products[12][trade-license]"),
            Some((12, "trade-license".to_string()))
        );
    }

    #[test_case("products[abc][design]" ; "non_numeric_index")]
    #[test_case("products[0]" ; "missing_field_segment")]
    #[test_case("products[0][design][extra]" ; "extra_segment")]
    #[test_case("items[0][design]" ; "wrong_prefix")]
    #[test_case("" ; "empty_key")]
    #[test_case("products[0][]" ; "empty_field_name")]
    fn rejects_malformed_file_keys(key: &str) {
        assert_eq!(parse_file_key(key), None);
    }

    #[test]
    fn totals_use_captured_prices() {
        let lines = [
            CartLineView {
                id: 1,
                product_id: 1,
                product_name: "Business Cards".to_string(),
                product_slug: "business-cards".to_string(),
                variant_id: None,
                variant_name: None,
                quantity: 2,
                price: dec!(75.00),
                line_total: dec!(150.00),
            },
            CartLineView {
                id: 2,
                product_id: 2,
                product_name: "Roll-up Banner".to_string(),
                product_slug: "roll-up-banner".to_string(),
                variant_id: Some(5),
                variant_name: Some("200x85cm".to_string()),
                quantity: 1,
                price: dec!(240.50),
                line_total: dec!(240.50),
            },
        ];
        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        assert_eq!(subtotal, dec!(390.50));
    }
}
