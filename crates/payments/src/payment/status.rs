use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PaymentError;

/// Lifecycle state of a payment.
///
/// ```text
/// pending -> processing -> success -> refunded
///                       \-> failed
/// ```
///
/// `cancelled` is reserved for payments voided before processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::Cancelled,
    ];

    /// Only pending payments can be processed.
    pub fn can_process(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Only successful payments can be refunded.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PaymentError::InvalidStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_can_be_processed() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.can_process(), status == PaymentStatus::Pending);
        }
    }

    #[test]
    fn test_only_success_can_be_refunded() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.can_refund(), status == PaymentStatus::Success);
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!(matches!(
            "settled".parse::<PaymentStatus>(),
            Err(PaymentError::InvalidStatus(_))
        ));
    }
}
