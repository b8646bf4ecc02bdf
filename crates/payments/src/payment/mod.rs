//! Payment aggregate and related types.

mod aggregate;
mod commands;
pub mod events;
mod method;
mod status;

pub use aggregate::Payment;
pub use commands::{CreatePayment, ListPayments};
pub use events::{OrderPlaced, PaymentFailed, PaymentSucceeded};
pub use method::PaymentMethod;
pub use status::PaymentStatus;

/// Currency used when a command omits one.
pub const DEFAULT_CURRENCY: &str = "USD";
