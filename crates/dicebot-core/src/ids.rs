//! Platform-prefixed identifiers.
//!
//! The dispatch core addresses users and groups with strings such as
//! `QQ:10001` and `QQ-Group:20002`; adapters strip the prefix before talking
//! to the platform and add it back on everything they report.

/// Platform name reported by QQ-based adapters.
pub const PLATFORM_QQ: &str = "QQ";

const QQ_USER_PREFIX: &str = "QQ:";
const QQ_GROUP_PREFIX: &str = "QQ-Group:";

/// Formats a raw QQ user id as `QQ:<id>`.
pub fn format_qq_user(id: &str) -> String {
    format!("{QQ_USER_PREFIX}{id}")
}

/// Formats a raw QQ group id as `QQ-Group:<id>`.
pub fn format_qq_group(id: &str) -> String {
    format!("{QQ_GROUP_PREFIX}{id}")
}

/// Strips the `QQ:` prefix, returning the input unchanged when absent.
pub fn extract_qq_user(id: &str) -> &str {
    id.strip_prefix(QQ_USER_PREFIX).unwrap_or(id)
}

/// Strips the `QQ-Group:` prefix, returning the input unchanged when absent.
pub fn extract_qq_group(id: &str) -> &str {
    id.strip_prefix(QQ_GROUP_PREFIX).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_extract() {
        assert_eq!(format_qq_user("10001"), "QQ:10001");
        assert_eq!(format_qq_group("20002"), "QQ-Group:20002");
        assert_eq!(extract_qq_user("QQ:10001"), "10001");
        assert_eq!(extract_qq_group("QQ-Group:20002"), "20002");
    }

    #[test]
    fn test_extract_leaves_foreign_ids() {
        assert_eq!(extract_qq_user("10001"), "10001");
        // A group id is not a user id.
        assert_eq!(extract_qq_user("QQ-Group:1"), "QQ-Group:1");
        assert_eq!(extract_qq_group("QQ:1"), "QQ:1");
    }
}
