//! 通用工具函数

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

const FALLBACK_NAME: &str = "upload";
const MAX_NAME_LEN: usize = 128;

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"))
}

/// 把原始文件名清洗为文件系统安全的片段
///
/// 空白连续段替换为 `_`，去掉目录部分和其它不安全字符，
/// 开头的 `.` 被去掉以避免隐藏文件和 `..`。
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let collapsed = whitespace().replace_all(base.trim(), "_");
    let cleaned = unsafe_chars().replace_all(&collapsed, "");
    let cleaned = cleaned.trim_start_matches('.');

    let mut name: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() {
        name.push_str(FALLBACK_NAME);
    }
    name
}

/// 以创建时间（毫秒）为前缀的存储文件名
pub fn timestamped_file_name(safe_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", at.timestamp_millis(), safe_name)
}

/// 同一毫秒内重名时使用的带随机片段的文件名
pub fn disambiguated_file_name(safe_name: &str, at: DateTime<Utc>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", at.timestamp_millis(), &token[..8], safe_name)
}

/// 患者作用域下的相对存储路径
pub fn study_storage_path(patient_id: i64, file_name: &str) -> String {
    format!("{}/{}", patient_id, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_replaces_whitespace() {
        assert_eq!(sanitize_file_name("chest  scan 01.zip"), "chest_scan_01.zip");
    }

    #[test]
    fn test_sanitize_strips_directories_and_dots() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\..hidden.dcm"), "hidden.dcm");
        assert_eq!(sanitize_file_name("..."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[test]
    fn test_sanitize_drops_unsafe_characters() {
        assert_eq!(sanitize_file_name("tórax<1>.zip"), "trax1.zip");
    }

    #[test]
    fn test_timestamped_names() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(timestamped_file_name("chest.zip", at), "1700000000123_chest.zip");

        let other = disambiguated_file_name("chest.zip", at);
        assert!(other.starts_with("1700000000123_"));
        assert!(other.ends_with("_chest.zip"));
        assert_ne!(other, disambiguated_file_name("chest.zip", at));
    }

    #[test]
    fn test_study_storage_path() {
        assert_eq!(study_storage_path(7, "1_chest.zip"), "7/1_chest.zip");
    }
}
