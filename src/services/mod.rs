// Core services
pub mod orders;

// Simple status helpers that work directly with entities
pub mod order_status;

// Checkout collaborators
pub mod order_number;
pub mod payments;
pub mod settings;

// Commerce and Analytics
pub mod analytics;
pub mod commerce;
