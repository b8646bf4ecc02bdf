//! Limits of the monetary columns shared by the order and payment stores.
//!
//! Amounts are stored as `NUMERIC(12, 2)` and currencies as `VARCHAR(3)`.
//! Values are checked against these limits before they reach a database so
//! an out-of-range amount is rejected as bad input instead of being rounded
//! or refused by the store.

use rust_decimal::Decimal;

/// Fractional digits an amount may carry.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(12, 2)` column holds: `9999999999.99`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, MONEY_SCALE);

/// True when `amount` has at most two fractional digits, ignoring trailing zeros.
pub fn has_money_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE
}

/// True when `amount` fits a `NUMERIC(12, 2)` column without rounding.
pub fn fits_money_column(amount: Decimal) -> bool {
    has_money_scale(amount) && amount.abs() <= MAX_AMOUNT
}

/// True for a three-letter uppercase ISO 4217 style code.
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
