//! Context identifier generation.
//!
//! Every execution context (tab, window, worker) holding a bus gets a
//! short identifier at construction time. The identifier is built from a
//! millisecond timestamp plus a random suffix, both base-36 encoded. It
//! is probabilistically unique, not cryptographically unique: at the
//! handful-of-tabs scale the bus operates at, the collision probability
//! is accepted as negligible.

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a likely-unique short identifier.
///
/// The result is lowercase alphanumeric and sorts roughly by creation
/// time thanks to the leading timestamp component.
pub fn shortid() -> String {
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    let salt: u64 = rand::random();
    let mut id = to_base36(millis);
    id.push_str(&to_base36(salt));
    id
}

/// Encode an integer in base 36 using lowercase digits.
fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36_zero() {
        assert_eq!(to_base36(0), "0");
    }

    #[test]
    fn test_base36_known_values() {
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36 * 36), "100");
    }

    #[test]
    fn test_shortid_charset() {
        let id = shortid();
        assert!(!id.is_empty());
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_shortid_uniqueness() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(shortid()));
        }
    }
}
