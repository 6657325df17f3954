use std::collections::HashSet;

pub const COUNTRY_CODE: &str = "62";
pub const DEFAULT_ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// Reduce a phone-like recipient to its canonical digit form.
///
/// Non-digits are dropped, a leading trunk `0` becomes the country code and
/// numbers without the country code get it prepended. Returns `None` when
/// nothing is left after stripping.
pub fn canonical_digits(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let canonical = if let Some(rest) = digits.strip_prefix('0') {
        format!("{COUNTRY_CODE}{rest}")
    } else if !digits.starts_with(COUNTRY_CODE) {
        format!("{COUNTRY_CODE}{digits}")
    } else {
        digits
    };
    Some(canonical)
}

/// Canonical digits plus the transport's address suffix.
pub fn to_address(raw: &str, suffix: &str) -> Option<String> {
    canonical_digits(raw).map(|digits| format!("{digits}{suffix}"))
}

/// Strip a transport suffix (anything from `@`) off an address.
pub fn address_digits(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// Admins first, then technicians; trimmed, blanks dropped, first occurrence wins.
pub fn merge_recipients<A, T>(admins: A, technicians: T) -> Vec<String>
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let admins = admins.into_iter().map(|n| n.as_ref().trim().to_string());
    let technicians = technicians.into_iter().map(|n| n.as_ref().trim().to_string());

    for number in admins.chain(technicians) {
        if number.is_empty() {
            continue;
        }
        if seen.insert(number.clone()) {
            out.push(number);
        }
    }
    out
}
