use std::collections::BTreeSet;

use crate::types::Vec3;

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

/// Team and clan tags: trimmed, at most 8 characters, empty means none.
pub fn sanitize_tag(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(8).collect())
}

pub fn player_order_key(player_id: &str) -> u64 {
    player_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

/// `MANHUNT_ADMINS`: comma-separated display names, matched case-insensitively.
pub fn parse_admins(raw: Option<&str>) -> BTreeSet<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn is_admin_name(admins: &BTreeSet<String>, name: &str) -> bool {
    admins.contains(&name.trim().to_lowercase())
}

pub fn parse_landmark(raw: Option<&str>) -> Option<Vec3> {
    raw.and_then(Vec3::parse_csv)
}

/// Chat lines starting with `/` are commands; everything else is plain chat.
pub fn chat_command(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    trimmed.starts_with('/').then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_order_key_uses_numeric_suffix() {
        assert!(player_order_key("player_2") < player_order_key("player_10"));
        assert_eq!(player_order_key("console"), u64::MAX);
    }

    #[test]
    fn sanitize_name_applies_trim_empty_and_max_len() {
        assert_eq!(sanitize_name(""), "Player");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(" Alice "), "Alice");
        assert_eq!(sanitize_name("12345678901234567890"), "1234567890123456");
    }

    #[test]
    fn sanitize_tag_drops_blank_values() {
        assert_eq!(sanitize_tag(None), None);
        assert_eq!(sanitize_tag(Some("  ")), None);
        assert_eq!(sanitize_tag(Some(" red ")).as_deref(), Some("red"));
        assert_eq!(sanitize_tag(Some("longclanname")).as_deref(), Some("longclan"));
    }

    #[test]
    fn admins_are_case_insensitive() {
        let admins = parse_admins(Some(" Alice, BOB ,,"));
        assert_eq!(admins.len(), 2);
        assert!(is_admin_name(&admins, "alice"));
        assert!(is_admin_name(&admins, "Bob"));
        assert!(!is_admin_name(&admins, "carol"));
        assert!(parse_admins(None).is_empty());
    }

    #[test]
    fn landmark_parsing_rejects_partial_vectors() {
        assert_eq!(parse_landmark(Some("1, 2, 3")), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(parse_landmark(Some("1,2")), None);
        assert_eq!(parse_landmark(None), None);
    }

    #[test]
    fn only_slash_lines_are_commands() {
        assert_eq!(chat_command("  /manhunt join"), Some("/manhunt join"));
        assert_eq!(chat_command("hello /manhunt"), None);
    }
}
