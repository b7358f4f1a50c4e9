//! Semantic comparison of resource quantities.
//!
//! The API server stores quantities in canonical form ("2000m" comes back as
//! "2", "1024Mi" as "1Gi"), so desired and live values are compared by
//! amount rather than by spelling.

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Digits kept after the decimal point; finer values compare by spelling.
const NANO_DIGITS: u32 = 9;

/// Parse a quantity into nano-units. `None` when the text is not a quantity
/// this parser understands or the amount overflows.
pub fn nano_units(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let number_len = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(number_len);
    if number.is_empty() || number == "." {
        return None;
    }

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.contains('.') || fraction.len() > NANO_DIGITS as usize {
        return None;
    }
    let mut digits = String::with_capacity(whole.len() + fraction.len());
    digits.push_str(whole);
    digits.push_str(fraction);
    let mantissa: i128 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
    let fraction_len = u32::try_from(fraction.len()).ok()?;
    let mut value = mantissa.checked_mul(10i128.checked_pow(NANO_DIGITS - fraction_len)?)?;

    value = match suffix {
        "n" => value.checked_div(1_000_000_000)?,
        "u" => value.checked_div(1_000_000)?,
        "m" => value.checked_div(1_000)?,
        "" => value,
        "k" => value.checked_mul(1_000)?,
        "M" => value.checked_mul(1_000_000)?,
        "G" => value.checked_mul(1_000_000_000)?,
        "T" => value.checked_mul(10i128.pow(12))?,
        "P" => value.checked_mul(10i128.pow(15))?,
        "E" => value.checked_mul(10i128.pow(18))?,
        "Ki" => value.checked_mul(1 << 10)?,
        "Mi" => value.checked_mul(1 << 20)?,
        "Gi" => value.checked_mul(1 << 30)?,
        "Ti" => value.checked_mul(1 << 40)?,
        "Pi" => value.checked_mul(1 << 50)?,
        "Ei" => value.checked_mul(1 << 60)?,
        exponent => {
            let power: i32 = exponent
                .strip_prefix('e')
                .or_else(|| exponent.strip_prefix('E'))?
                .parse()
                .ok()?;
            let scale = 10i128.checked_pow(power.unsigned_abs())?;
            if power >= 0 {
                value.checked_mul(scale)?
            } else {
                value.checked_div(scale)?
            }
        }
    };

    Some(if negative { -value } else { value })
}

/// Whether two quantities denote the same amount.
pub fn same_quantity(a: &Quantity, b: &Quantity) -> bool {
    if a.0 == b.0 {
        return true;
    }
    match (nano_units(&a.0), nano_units(&b.0)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn same_quantities(a: Option<&BTreeMap<String, Quantity>>, b: Option<&BTreeMap<String, Quantity>>) -> bool {
    let empty = BTreeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    a.len() == b.len()
        && a.iter()
            .all(|(name, quantity)| b.get(name).is_some_and(|other| same_quantity(quantity, other)))
}

/// Whether two requirement blocks request and limit the same amounts. An
/// absent block equals an empty one.
pub fn same_requirements(a: Option<&ResourceRequirements>, b: Option<&ResourceRequirements>) -> bool {
    let empty = ResourceRequirements::default();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    a.claims.as_deref().unwrap_or_default() == b.claims.as_deref().unwrap_or_default()
        && same_quantities(a.requests.as_ref(), b.requests.as_ref())
        && same_quantities(a.limits.as_ref(), b.limits.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str) -> Quantity {
        Quantity(text.to_string())
    }

    #[test]
    fn test_canonical_forms_are_equal() {
        for (spelled, canonical) in [
            ("2000m", "2"),
            ("0.5", "500m"),
            ("1024Mi", "1Gi"),
            ("1.5Gi", "1536Mi"),
            ("1e3", "1k"),
            ("4096Ki", "4Mi"),
        ] {
            assert!(same_quantity(&q(spelled), &q(canonical)), "{} vs {}", spelled, canonical);
        }
    }

    #[test]
    fn test_different_amounts_differ() {
        assert!(!same_quantity(&q("2"), &q("3")));
        assert!(!same_quantity(&q("1G"), &q("1Gi")));
        assert!(!same_quantity(&q("500m"), &q("5")));
    }

    #[test]
    fn test_unparsable_compares_by_spelling() {
        assert_eq!(nano_units("lots"), None);
        assert_eq!(nano_units(""), None);
        assert!(same_quantity(&q("lots"), &q("lots")));
        assert!(!same_quantity(&q("lots"), &q("2")));
    }

    #[test]
    fn test_requirements_compare_per_resource() {
        let requirements = |cpu: &str, memory: &str| ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), q(cpu)),
                ("memory".to_string(), q(memory)),
            ])),
            ..Default::default()
        };
        assert!(same_requirements(
            Some(&requirements("2000m", "4096Mi")),
            Some(&requirements("2", "4Gi"))
        ));
        assert!(!same_requirements(
            Some(&requirements("2", "4Gi")),
            Some(&requirements("2", "6Gi"))
        ));
        assert!(!same_requirements(Some(&requirements("2", "4Gi")), None));
        assert!(same_requirements(Some(&ResourceRequirements::default()), None));
    }
}
