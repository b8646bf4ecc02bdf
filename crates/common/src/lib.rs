//! Types shared by every service in the order fulfillment system.

pub mod error;
pub mod money;
pub mod response;
pub mod types;

pub use error::ErrorKind;
pub use response::{BatchRequest, BatchResponse, DataResponse, ListMeta, ListResponse};
pub use types::{OrderId, OrderItemId, ParseIdError, PaymentId, UserId};
