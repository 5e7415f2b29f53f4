//! Validation utilities for the ERP
//!
//! Includes India-specific checks for tax registration and contact numbers.

use rust_decimal::Decimal;

// ============================================================================
// General Validations
// ============================================================================

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

pub fn validate_non_empty(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        return Err("Value cannot be empty");
    }
    Ok(())
}

/// Amounts and quantities entered on documents
pub fn validate_non_negative(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

pub fn validate_positive(amount: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Amount must be greater than zero");
    }
    Ok(())
}

/// Percentages such as tax and discount rates, inclusive bounds
pub fn validate_percentage(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

// ============================================================================
// India-Specific Validations
// ============================================================================

/// Validate GSTIN: 2-digit state code, 10-character PAN, entity digit, 'Z', checksum character
pub fn validate_gstin(gstin: &str) -> Result<(), &'static str> {
    let gstin = gstin.trim();
    if gstin.len() != 15 || !gstin.is_ascii() {
        return Err("GSTIN must be 15 characters");
    }
    let bytes = gstin.as_bytes();
    if !bytes[..2].iter().all(u8::is_ascii_digit) {
        return Err("GSTIN must start with a 2-digit state code");
    }
    validate_pan(&gstin[2..12]).map_err(|_| "GSTIN does not embed a valid PAN")?;
    if !bytes[12].is_ascii_alphanumeric() || bytes[12] == b'0' {
        return Err("Invalid GSTIN entity number");
    }
    if bytes[13] != b'Z' {
        return Err("GSTIN 14th character must be 'Z'");
    }
    if !bytes[14].is_ascii_alphanumeric() {
        return Err("Invalid GSTIN checksum character");
    }
    Ok(())
}

/// State code embedded in the first two digits of a GSTIN
pub fn gstin_state_code(gstin: &str) -> Option<&str> {
    validate_gstin(gstin).ok()?;
    gstin.trim().get(..2)
}

/// Validate PAN: five letters, four digits, one letter (e.g. ABCDE1234F)
pub fn validate_pan(pan: &str) -> Result<(), &'static str> {
    let bytes = pan.trim().as_bytes();
    if bytes.len() != 10 {
        return Err("PAN must be 10 characters");
    }
    let valid = bytes[..5].iter().all(u8::is_ascii_uppercase)
        && bytes[5..9].iter().all(u8::is_ascii_digit)
        && bytes[9].is_ascii_uppercase();
    if !valid {
        return Err("Invalid PAN format");
    }
    Ok(())
}

/// Validate Indian mobile number
/// Accepts: 9876543210, 98765-43210, +919876543210, 09876543210
pub fn validate_indian_mobile(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('0') => &digits[1..],
        12 if digits.starts_with("91") => &digits[2..],
        _ => return Err("Invalid Indian mobile number"),
    };
    match national.chars().next() {
        Some('6'..='9') => Ok(()),
        _ => Err("Indian mobile numbers start with 6, 7, 8 or 9"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gstin() {
        assert!(validate_gstin("27AAPFU0939F1ZV").is_ok());
        assert!(validate_gstin("27AAPFU0939F1XV").is_err());
        assert!(validate_gstin("AAPFU0939F1ZV").is_err());
        assert_eq!(gstin_state_code("27AAPFU0939F1ZV"), Some("27"));
    }

    #[test]
    fn test_pan() {
        assert!(validate_pan("ABCDE1234F").is_ok());
        assert!(validate_pan("ABCD12345F").is_err());
        assert!(validate_pan("abcde1234f").is_err());
    }

    #[test]
    fn test_indian_mobile() {
        assert!(validate_indian_mobile("9876543210").is_ok());
        assert!(validate_indian_mobile("+91 98765 43210").is_ok());
        assert!(validate_indian_mobile("09876543210").is_ok());
        assert!(validate_indian_mobile("5876543210").is_err());
        assert!(validate_indian_mobile("98765").is_err());
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(validate_percentage(Decimal::ZERO).is_ok());
        assert!(validate_percentage(Decimal::ONE_HUNDRED).is_ok());
        assert!(validate_percentage(Decimal::from(101)).is_err());
        assert!(validate_percentage(Decimal::from(-1)).is_err());
    }
}
