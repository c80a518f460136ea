//! Medium key constants

/// Keys under which records are stored on the durable medium
pub struct MediumKeys;

impl MediumKeys {
    /// Authentication key pair, both halves in one record
    pub const AUTH_KEYS: &'static str = "auth_keys";

    /// In-flight OTA deployment record
    pub const OTA_DEPLOYMENT: &'static str = "ota_deployment";

    /// All keys owned by the storage layer
    pub const ALL: [&'static str; 2] = [Self::AUTH_KEYS, Self::OTA_DEPLOYMENT];
}

/// Check that a key is safe to use as a file name on any medium
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
