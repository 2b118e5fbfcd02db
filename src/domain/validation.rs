//! Field-level validation for catalog and registry input.

use super::DomainError;

pub fn require_non_empty(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// ISBN-10 or ISBN-13, digits with optional hyphens. The last ISBN-10
/// character may be `X`.
pub fn validate_isbn(raw: &str) -> Result<String, DomainError> {
    let isbn = raw.trim();
    let invalid = || {
        DomainError::Validation(format!(
            "Invalid ISBN '{}'. Use 10 or 13 digits, optionally separated by hyphens",
            isbn
        ))
    };

    if isbn.is_empty() || isbn.len() > 20 {
        return Err(invalid());
    }

    let mut digits = 0;
    let mut chars = isbn.chars().filter(|c| *c != '-').peekable();
    while let Some(c) = chars.next() {
        let is_check_x = (c == 'X' || c == 'x') && chars.peek().is_none() && digits == 9;
        if c.is_ascii_digit() || is_check_x {
            digits += 1;
        } else {
            return Err(invalid());
        }
    }

    if digits == 10 || digits == 13 {
        Ok(isbn.to_string())
    } else {
        Err(invalid())
    }
}

/// Dewey decimal class: three digits, optionally followed by a decimal part.
pub fn validate_dewey_code(raw: &str) -> Result<String, DomainError> {
    let code = raw.trim();
    let (class, decimals) = match code.split_once('.') {
        Some((class, decimals)) => (class, Some(decimals)),
        None => (code, None),
    };

    let class_ok = class.len() == 3 && class.bytes().all(|b| b.is_ascii_digit());
    let decimals_ok = decimals
        .map(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(true);

    if class_ok && decimals_ok {
        Ok(code.to_string())
    } else {
        Err(DomainError::Validation(format!(
            "Invalid category code '{}'. Expected a Dewey class such as 823 or 823.91",
            code
        )))
    }
}

/// Shape check only: one `@`, non-empty local part, dotted domain.
pub fn validate_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email.to_lowercase())
    } else {
        Err(DomainError::Validation(format!("Invalid email address '{}'", email)))
    }
}

pub fn validate_language_code(raw: &str) -> Result<String, DomainError> {
    let code = raw.trim();
    if (1..=3).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(code.to_ascii_lowercase())
    } else {
        Err(DomainError::Validation(format!(
            "Invalid language code '{}'. Use 1 to 3 letters (e.g. en, eng)",
            code
        )))
    }
}

pub fn validate_publication_year(year: i32, current_year: i32) -> Result<i32, DomainError> {
    if (1000..=current_year).contains(&year) {
        Ok(year)
    } else {
        Err(DomainError::Validation(format!(
            "publication_year must be between 1000 and {}",
            current_year
        )))
    }
}

pub fn validate_price(price: f64) -> Result<f64, DomainError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(DomainError::Validation("price cannot be negative".to_string()))
    }
}

/// Bounds check for `limit` query parameters.
pub fn validate_limit(limit: u64, max: u64) -> Result<u64, DomainError> {
    if (1..=max).contains(&limit) {
        Ok(limit)
    } else {
        Err(DomainError::Validation(format!(
            "limit must be between 1 and {}",
            max
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isbn_accepts_both_lengths_with_hyphens() {
        assert!(validate_isbn("978-0-13-110362-7").is_ok());
        assert!(validate_isbn("0131103628").is_ok());
        assert!(validate_isbn("0-8044-2957-X").is_ok());
    }

    #[test]
    fn isbn_rejects_wrong_lengths_and_letters() {
        for bad in ["", "12345", "97801311036271", "978-0-13-ABC362-7", "X131103628"] {
            assert!(validate_isbn(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn dewey_codes() {
        assert!(validate_dewey_code("823").is_ok());
        assert!(validate_dewey_code("005.133").is_ok());
        for bad in ["82", "8234", "823.", "abc", "823.9a"] {
            assert!(validate_dewey_code(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn emails_are_normalized_to_lowercase() {
        assert_eq!(validate_email("Ada@Uni.EDU").unwrap(), "ada@uni.edu");
        for bad in ["ada", "@uni.edu", "ada@uni", "ada@@uni.edu", "a da@uni.edu"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn publication_year_cannot_be_in_the_future() {
        assert!(validate_publication_year(1999, 2024).is_ok());
        assert!(validate_publication_year(2025, 2024).is_err());
        assert!(validate_publication_year(999, 2024).is_err());
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(require_non_empty("title", "   ").is_err());
        assert_eq!(require_non_empty("title", " Dune ").unwrap(), "Dune");
    }
}
