//! Domain models for the API.
//!
//! Repository rows are converted into these types before leaving `db`.
//! Wire representations (camelCase JSON) live next to the type they render.

pub mod customer;
pub mod landing;
pub mod order;
pub mod order_update;
pub mod public_order;

use std::collections::BTreeMap;

pub use customer::{Address, Customer};
pub use landing::{LandingInput, LandingPage, LandingView};
pub use order::{Order, OrderDetails, OrderItem, OrderView, Payment};
pub use order_update::{OrderPatch, OrderUpdate};
pub use public_order::{NewPublicOrder, PublicOrderRequest};

/// Validation messages keyed by request field name.
pub type FieldErrors = BTreeMap<String, String>;
