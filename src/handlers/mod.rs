pub mod admin;
pub mod auth;
pub mod carts;
pub mod categories;
pub mod common;
pub mod orders;
pub mod products;
