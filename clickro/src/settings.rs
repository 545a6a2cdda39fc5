//! Per request server settings.
//!
//! Settings are sent as query string pairs. A handful of keys are not server
//! settings but options of the HTTP interface itself, those are intercepted
//! and handled by the client instead, see [`Settings::is_transport`].
use std::collections::{HashMap, HashSet};

/// Keys handled by the HTTP interface rather than the settings subsystem.
const TRANSPORT_KEYS: &[&str] = &[
    "buffer_size",
    "session_id",
    "compress",
    "decompress",
    "quota_key",
    "session_timeout",
    "session_check",
    "role",
    "query_id",
    "database",
    "wait_end_of_query",
];

/// A value that can be sent as a setting.
pub trait SettingValue {
    fn into_setting(self) -> String;
}

impl SettingValue for bool {
    fn into_setting(self) -> String {
        match self {
            true => "1".into(),
            false => "0".into(),
        }
    }
}

impl SettingValue for &str {
    fn into_setting(self) -> String {
        self.to_owned()
    }
}

impl SettingValue for String {
    fn into_setting(self) -> String {
        self
    }
}

macro_rules! numeric {
    ($($ty:ty),*) => {
        $(
            impl SettingValue for $ty {
                fn into_setting(self) -> String {
                    itoa::Buffer::new().format(self).to_owned()
                }
            }
        )*
    };
}

numeric!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl SettingValue for f64 {
    fn into_setting(self) -> String {
        self.to_string()
    }
}

/// Ordered settings map, later value replace earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    entries: Vec<(String, String)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` is an HTTP interface option.
    pub fn is_transport(key: &str) -> bool {
        TRANSPORT_KEYS.contains(&key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl SettingValue) {
        let key = key.into();
        let value = value.into_setting();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let at = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(at).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply `other` on top of `self`.
    pub fn extend(&mut self, other: &Settings) {
        for (k, v) in &other.entries {
            self.set(k.as_str(), v.as_str());
        }
    }

    /// Split into transport options and server settings, dropping server
    /// settings that are known to be readonly.
    pub(crate) fn partition(&self, readonly: &HashSet<String>) -> Partitioned {
        let mut out = Partitioned::default();
        for (key, value) in &self.entries {
            if Self::is_transport(key) {
                out.transport.insert(key.clone(), value.clone());
            } else if readonly.contains(key) {
                #[cfg(feature = "log")]
                log::warn!("setting `{key}` is readonly on the server, dropped");
            } else {
                out.server.push((key.clone(), value.clone()));
            }
        }
        out
    }
}

impl<K: Into<String>, V: SettingValue> FromIterator<(K, V)> for Settings {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut settings = Settings::new();
        for (k, v) in iter {
            settings.set(k, v);
        }
        settings
    }
}

#[derive(Debug, Default)]
pub(crate) struct Partitioned {
    pub(crate) transport: HashMap<String, String>,
    pub(crate) server: Vec<(String, String)>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn later_value_wins() {
        let mut settings = Settings::new();
        settings.set("max_threads", 4u32);
        settings.set("readonly", true);
        settings.set("max_threads", 8u32);
        assert_eq!(settings.get("max_threads"), Some("8"));
        assert_eq!(settings.get("readonly"), Some("1"));
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn partition_transport_and_readonly() {
        let settings: Settings = [
            ("session_id", "abc"),
            ("compress", "0"),
            ("max_threads", "2"),
            ("max_memory_usage", "100"),
        ]
        .into_iter()
        .collect();
        let readonly = HashSet::from(["max_memory_usage".to_owned()]);

        let out = settings.partition(&readonly);
        assert_eq!(out.transport.get("session_id").map(String::as_str), Some("abc"));
        assert_eq!(out.transport.get("compress").map(String::as_str), Some("0"));
        assert!(!out.transport.contains_key("max_threads"));
        assert_eq!(out.server, vec![("max_threads".to_owned(), "2".to_owned())]);
    }

    #[test]
    fn extend_overrides() {
        let mut base: Settings = [("a", 1u8), ("b", 2u8)].into_iter().collect();
        let over: Settings = [("b", 3u8)].into_iter().collect();
        base.extend(&over);
        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(base.get("b"), Some("3"));
    }
}
