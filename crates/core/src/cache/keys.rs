/// Applies the configured system key to a caller-supplied key.
///
/// The transform is plain concatenation. It is only idempotent when
/// `system_key` is empty; prefixing an already prefixed key prefixes it again.
///
/// # Examples
///
/// ```
/// use cachehelper_core::cache::prefix_key;
///
/// assert_eq!(prefix_key("app1:", "x"), "app1:x");
/// assert_eq!(prefix_key("", "x"), "x");
/// ```
pub fn prefix_key(system_key: &str, key: &str) -> String {
    let mut prefixed = String::with_capacity(system_key.len() + key.len());
    prefixed.push_str(system_key);
    prefixed.push_str(key);
    prefixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_key() {
        assert_eq!(prefix_key("app1:", "x"), "app1:x");
        assert_eq!(prefix_key("app1:", ""), "app1:");
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        assert_eq!(prefix_key("", "user:1"), "user:1");
        assert_eq!(prefix_key("", &prefix_key("", "user:1")), "user:1");
    }

    #[test]
    fn test_double_prefix_is_not_deduplicated() {
        let once = prefix_key("app1:", "x");
        assert_eq!(prefix_key("app1:", &once), "app1:app1:x");
    }
}
