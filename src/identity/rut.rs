//! National identity (RUT) normalization and check-digit validation
//!
//! The canonical form is the punctuation-free digit body followed by the
//! upper-cased check character, e.g. `"12.345.678-5"` -> `"123456785"`.
//! Equality comparisons across the system always go through this form.

/// Canonicalize a raw identity string
///
/// Strips dots, dashes, and whitespace and upper-cases the check character.
/// Returns `None` on malformed input: empty body, non-digit body characters,
/// or an invalid check character.
pub fn canonicalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '-')
        .collect();

    if cleaned.len() < 2 {
        return None;
    }

    let mut chars = cleaned.chars();
    let check = chars.next_back()?.to_ascii_uppercase();
    let body: String = chars.collect();

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !check.is_ascii_digit() && check != 'K' {
        return None;
    }

    Some(format!("{}{}", body, check))
}

/// Compute the modulo-11 check digit for a numeric identity body
///
/// Digits are walked right-to-left with a multiplier cycling 2..=7. The
/// remainder `11 - (sum % 11)` maps 11 -> '0', 10 -> 'K', and any other
/// value to its digit.
pub fn compute_check_digit(body: &str) -> Option<char> {
    if body.is_empty() {
        return None;
    }

    let mut sum: u32 = 0;
    let mut multiplier: u32 = 2;
    for c in body.chars().rev() {
        let digit = c.to_digit(10)?;
        sum += digit * multiplier;
        multiplier = if multiplier == 7 { 2 } else { multiplier + 1 };
    }

    match 11 - (sum % 11) {
        11 => Some('0'),
        10 => Some('K'),
        n => char::from_digit(n, 10),
    }
}

/// Validate the check character of a raw identity string
pub fn validate_checksum(raw: &str) -> bool {
    let Some(canonical) = canonicalize(raw) else {
        return false;
    };
    let (body, check) = canonical.split_at(canonical.len() - 1);
    match compute_check_digit(body) {
        Some(expected) => check.chars().next() == Some(expected),
        None => false,
    }
}

/// Format an identity for display, e.g. `"123456785"` -> `"12.345.678-5"`
///
/// Must not fail even on invalid input: anything that does not canonicalize
/// is echoed back trimmed, so the UI can show exactly what was typed.
pub fn format_for_display(raw: &str) -> String {
    let Some(canonical) = canonicalize(raw) else {
        return raw.trim().to_string();
    };

    let (body, check) = canonical.split_at(canonical.len() - 1);
    let mut formatted = String::with_capacity(body.len() + body.len() / 3 + 2);
    for (i, c) in body.chars().enumerate() {
        if i > 0 && (body.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(c);
    }

    format!("{}-{}", formatted, check)
}
