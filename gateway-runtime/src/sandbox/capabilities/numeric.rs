use std::str::FromStr;

use rhai::{FLOAT, INT, ImmutableString, Module};
use rust_decimal::Decimal;

use crate::sandbox::RhaiResultOf;

fn parse_decimal(text: &str) -> RhaiResultOf<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| format!("invalid decimal '{text}': {e}").into())
}

/// Arbitrary-precision decimals. Arithmetic and comparison on the returned
/// values are native engine operators.
pub(super) fn module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("parse", |text: ImmutableString| parse_decimal(&text));
    module.set_native_fn("from_int", |n: INT| -> RhaiResultOf<Decimal> {
        Ok(Decimal::from(n))
    });
    module.set_native_fn("from_float", |n: FLOAT| -> RhaiResultOf<Decimal> {
        Decimal::try_from(n).map_err(|e| format!("invalid decimal {n}: {e}").into())
    });

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse_decimal(" 12.50 ").unwrap().to_string(), "12.50");
        assert_eq!(parse_decimal("1e-3").unwrap(), Decimal::new(1, 3));
        assert!(parse_decimal("twelve").is_err());
    }
}
