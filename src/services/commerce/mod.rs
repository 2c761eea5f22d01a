/// Commerce services module - cart, pricing and the checkout transaction
pub mod cart_service;
pub mod checkout_service;
pub mod pricing_service;

// Re-export services for convenience
pub use cart_service::{AddCartLineInput, CartService};
pub use checkout_service::{CheckoutOptions, CheckoutService, PlaceOrderInput};
pub use pricing_service::Quote;
