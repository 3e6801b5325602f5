///
/// Normalizes table and column identifiers recovered from file names or item data
/// into the destination's naming convention (casing, quoting, illegal-character
/// replacement).
///
/// A fresh `NamingConvention` is applied whenever a `Schema` is cloned for a new
/// normalize run, so a pipeline-configured convention always takes effect even if
/// the extracted package's embedded schema pre-dates it.
///
pub trait NamingConvention: Send + Sync {
    fn normalize_identifier(&self, identifier: &str) -> String;
}

///
/// The default convention: lower-case, `snake_case`, with any run of characters
/// that aren't ASCII alphanumeric or `_` collapsed to a single `_`. Leading digits
/// are prefixed with `_` since most destinations don't allow identifiers to start
/// with one.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct SnakeCaseNamingConvention;

impl NamingConvention for SnakeCaseNamingConvention {
    fn normalize_identifier(&self, identifier: &str) -> String {
        let mut out = String::with_capacity(identifier.len());
        let mut last_was_sep = false;

        for ch in identifier.chars() {
            if ch.is_ascii_alphanumeric() {
                out.push(ch.to_ascii_lowercase());
                last_was_sep = false;
            } else if !last_was_sep {
                out.push('_');
                last_was_sep = true;
            }
        }

        let trimmed = out.trim_matches('_');
        let trimmed = if trimmed.is_empty() { "_" } else { trimmed };

        if trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            format!("_{}", trimmed)
        } else {
            trimmed.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_collapses_separators() {
        let n = SnakeCaseNamingConvention;
        assert_eq!(n.normalize_identifier("Order Items"), "order_items");
        assert_eq!(n.normalize_identifier("Order__Items"), "order_items");
        assert_eq!(n.normalize_identifier("order-items!!"), "order_items");
    }

    #[test]
    fn prefixes_leading_digits() {
        let n = SnakeCaseNamingConvention;
        assert_eq!(n.normalize_identifier("123abc"), "_123abc");
    }
}
