//! # Validation Module
//!
//! Input validation for checkout requests, catalog records and listings.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure)                                           │
//! │  ├── Cart shape: non-empty, line count, quantity > 0                   │
//! │  └── Catalog fields: code, name, price, stock                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Checkout plan (kasir-core::checkout)                         │
//! │  └── Quantities against observed stock                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0), CHECK (quantity > 0)                          │
//! │  └── UNIQUE (code), UNIQUE (idempotency_key)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::checkout::CartLimits;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::CheckoutLine;
use crate::MAX_PAGE_SIZE;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Cart Validators
// =============================================================================

/// Validates the shape of a checkout request before any store access.
///
/// ## Rules
/// - At least one line (`CoreError::EmptyCart` otherwise)
/// - At most `limits.max_lines` lines
/// - Every quantity in `1..=limits.max_line_quantity`
///
/// ## Example
/// ```rust
/// use kasir_core::{CartLimits, CheckoutLine, CoreError};
/// use kasir_core::validation::validate_cart;
///
/// let limits = CartLimits::default();
/// assert!(validate_cart(&[CheckoutLine::new(1, 2)], &limits).is_ok());
/// assert_eq!(validate_cart(&[], &limits), Err(CoreError::EmptyCart));
/// ```
pub fn validate_cart(lines: &[CheckoutLine], limits: &CartLimits) -> CoreResult<()> {
    if lines.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    if lines.len() > limits.max_lines {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 1,
            max: limits.max_lines as i64,
        }
        .into());
    }

    for line in lines {
        validate_quantity(line.quantity, limits.max_line_quantity)?;
    }

    Ok(())
}

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed `max`
pub fn validate_quantity(qty: i64, max: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Catalog Validators
// =============================================================================

/// Validates a scannable product code.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - No whitespace (scanners never emit it)
///
/// ## Example
/// ```rust
/// use kasir_core::validation::validate_product_code;
///
/// assert!(validate_product_code("SNACK001").is_ok());
/// assert!(validate_product_code("").is_err());
/// assert!(validate_product_code("SNACK 001").is_err());
/// ```
pub fn validate_product_code(code: &str) -> ValidationResult<()> {
    if code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 64,
        });
    }

    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name (1–200 characters after trimming).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a unit price. Zero is allowed (free items).
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a stock level. Stock is never negative.
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Listing Validators
// =============================================================================

/// Validates a listing page size.
pub fn validate_page_size(limit: u32) -> ValidationResult<()> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_SIZE as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cart_rejects_empty() {
        assert_eq!(
            validate_cart(&[], &CartLimits::default()),
            Err(CoreError::EmptyCart)
        );
    }

    #[test]
    fn test_validate_cart_rejects_non_positive_quantity() {
        let limits = CartLimits::default();
        let err = validate_cart(&[CheckoutLine::new(1, 1), CheckoutLine::new(2, 0)], &limits)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_cart(&[CheckoutLine::new(1, -3)], &limits).is_err());
    }

    #[test]
    fn test_validate_cart_line_count() {
        let limits = CartLimits {
            max_lines: 2,
            max_line_quantity: 10,
        };
        let lines = vec![CheckoutLine::new(1, 1); 3];
        assert!(validate_cart(&lines, &limits).is_err());
        assert!(validate_cart(&lines[..2], &limits).is_ok());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1, 999).is_ok());
        assert!(validate_quantity(999, 999).is_ok());
        assert!(validate_quantity(0, 999).is_err());
        assert!(validate_quantity(1000, 999).is_err());
    }

    #[test]
    fn test_validate_product_fields() {
        assert!(validate_product_code("DRINK001").is_ok());
        assert!(validate_product_code(&"A".repeat(65)).is_err());
        assert!(validate_product_name("Aqua 600ml").is_ok());
        assert!(validate_product_name("   ").is_err());
        assert!(validate_price(Money::zero()).is_ok());
        assert!(validate_price(Money::from_minor(-1)).is_err());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-1).is_err());
    }

    #[test]
    fn test_validate_page_size() {
        assert!(validate_page_size(50).is_ok());
        assert!(validate_page_size(0).is_err());
        assert!(validate_page_size(MAX_PAGE_SIZE + 1).is_err());
    }
}
