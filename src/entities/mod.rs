pub mod cart;
pub mod cart_item;
pub mod category;
pub mod order;
pub mod order_file;
pub mod order_item;
pub mod product;
pub mod product_image;
pub mod product_specification;
pub mod product_variant;
pub mod user;
