pub mod money;
pub mod cart;
pub mod payment;
pub mod pricing;
pub mod inventory;
pub mod repository;

pub use cart::{validate_cart, CartItem, ShippingAddress};
pub use money::Cents;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Error type returned by storage and RPC collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
