use rocket::serde::json::Value;

/// Read a whole, non-negative number from loosely typed client JSON.
/// Integral floats and numeric strings are accepted.
pub fn whole_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::json;

    use super::*;

    #[test]
    fn accepted_forms() {
        assert_eq!(whole_number(&json!(7)), Some(7));
        assert_eq!(whole_number(&json!(7.0)), Some(7));
        assert_eq!(whole_number(&json!(" 7 ")), Some(7));
    }

    #[test]
    fn rejected_forms() {
        assert_eq!(whole_number(&json!(-7)), None);
        assert_eq!(whole_number(&json!(7.5)), None);
        assert_eq!(whole_number(&json!("seven")), None);
        assert_eq!(whole_number(&json!(null)), None);
        assert_eq!(whole_number(&json!(true)), None);
    }
}
