pub mod category;
pub mod invoice;
pub mod invoice_item;
pub mod ledger_transaction;
pub mod lifecycle;
pub mod payment;

pub use lifecycle::{Audited, Lifecycle};

use rust_decimal::Decimal;

/// Decimal places stored by every money column
pub const MONEY_SCALE: u32 = 4;

/// Whether `value` fits a money column without rounding
pub fn fits_money_scale(value: Decimal) -> bool {
    value.normalize().scale() <= MONEY_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(27.5), true)]
    #[case(dec!(0.0001), true)]
    #[case(dec!(10.000000), true)]
    #[case(dec!(0.00001), false)]
    #[case(dec!(0.001) * dec!(0.001), false)]
    fn money_scale_ignores_trailing_zeros(#[case] value: Decimal, #[case] fits: bool) {
        assert_eq!(fits_money_scale(value), fits);
    }
}
