use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "CREDIT",
            TransactionKind::Debit => "DEBIT",
        }
    }

    /// Balance delta produced by moving `amount` in this direction.
    pub fn delta(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Credit => amount,
            TransactionKind::Debit => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account row. Created outside the ledger, mutated only by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub display_name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Immutable transaction log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: i64,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

/// Log entry before the store assigns its id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransactionRecord {
    pub account_id: i64,
    pub amount: Decimal,
    pub kind: TransactionKind,
}

/// Credit or debit request body
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct BalanceChangeRequest {
    #[serde(alias = "accountID", alias = "user_id")]
    #[validate(range(min = 1, message = "account id must be positive"))]
    pub account_id: i64,
    pub amount: Decimal,
}

/// Result of a committed credit or debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response envelope shared by every ledger endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub status: ResponseStatus,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            code: 200,
            status: ResponseStatus::Success,
            message: String::new(),
            data: Some(data),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ApiResponse {
            code,
            status: ResponseStatus::Error,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use validator::Validate;

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let req: BalanceChangeRequest =
            serde_json::from_str(r#"{"user_id": 3, "amount": 1000}"#).unwrap();
        assert_eq!(req.account_id, 3);
        assert_eq!(req.amount, dec!(1000));

        let req: BalanceChangeRequest =
            serde_json::from_str(r#"{"accountID": 4, "amount": "12.50"}"#).unwrap();
        assert_eq!(req.account_id, 4);
        assert_eq!(req.amount, dec!(12.50));
    }

    #[test]
    fn test_request_rejects_non_positive_account_id() {
        let req = BalanceChangeRequest {
            account_id: 0,
            amount: dec!(1),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::success(LedgerReceipt {
            transaction_id: 9,
            new_balance: dec!(1000),
        }))
        .unwrap();

        assert_eq!(body["code"], 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "");
        assert_eq!(body["data"]["transaction_id"], 9);
        assert_eq!(body["data"]["new_balance"], "1000");

        let body = serde_json::to_value(ApiResponse::<LedgerReceipt>::error(404, "Account not found"))
            .unwrap();
        assert_eq!(body["status"], "error");
        assert!(body["data"].is_null());
    }

    #[test]
    fn test_receipt_keeps_every_fractional_digit() {
        let receipt = LedgerReceipt {
            transaction_id: 1,
            new_balance: dec!(2000000000000.0001),
        };

        let body = serde_json::to_string(&receipt).unwrap();
        assert!(body.contains(r#""new_balance":"2000000000000.0001""#));

        let back: LedgerReceipt = serde_json::from_str(&body).unwrap();
        assert_eq!(back.new_balance, dec!(2000000000000.0001));
    }

    #[test]
    fn test_kind_delta() {
        assert_eq!(TransactionKind::Credit.delta(dec!(5)), dec!(5));
        assert_eq!(TransactionKind::Debit.delta(dec!(5)), dec!(-5));
        assert_eq!(
            serde_json::to_string(&TransactionKind::Debit).unwrap(),
            "\"DEBIT\""
        );
    }
}
