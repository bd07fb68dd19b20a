/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a new opaque resource ID (UUIDv4, lowercase hyphenated).
///
/// Used for order and payment identifiers. UUIDs keep IDs unguessable so
/// that ownership checks, not ID secrecy, remain the only access control.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
