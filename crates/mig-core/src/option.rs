//! Named string options for gateways and interfaces.

use serde::{Deserialize, Serialize};

/// A named configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigOption {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl MigOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Interpret the value as a boolean (`true`, `1`, `yes`, `on`).
    pub fn as_bool(&self) -> bool {
        parse_bool(&self.value)
    }
}

/// Parse a loosely formatted boolean option value.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Ordered set of options with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet {
    options: Vec<MigOption>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an option and return the stored value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> MigOption {
        let name = name.into();
        let value = value.into();
        match self.options.iter_mut().find(|o| o.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.clone()
            }
            None => {
                let option = MigOption::new(name, value);
                self.options.push(option.clone());
                option
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MigOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Value of `name`, or an empty string when unset.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).map(|o| o.value.as_str()).unwrap_or("")
    }

    pub fn remove(&mut self, name: &str) -> Option<MigOption> {
        let index = self.options.iter().position(|o| o.name == name)?;
        Some(self.options.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigOption> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl FromIterator<MigOption> for OptionSet {
    fn from_iter<T: IntoIterator<Item = MigOption>>(iter: T) -> Self {
        let mut set = Self::new();
        for option in iter {
            set.set(option.name, option.value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_existing_name() {
        let mut set = OptionSet::new();
        set.set("Port", "8080");
        set.set("Host", "0.0.0.0");
        let updated = set.set("Port", "9090");

        assert_eq!(updated.value, "9090");
        assert_eq!(set.len(), 2);
        assert_eq!(set.value("Port"), "9090");
    }

    #[test]
    fn test_missing_value_is_empty() {
        let set = OptionSet::new();
        assert!(set.get("Port").is_none());
        assert_eq!(set.value("Port"), "");
    }

    #[test]
    fn test_from_iter_deduplicates() {
        let set: OptionSet = vec![
            MigOption::new("A", "1"),
            MigOption::new("B", "2"),
            MigOption::new("A", "3"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.value("A"), "3");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" 1 "));
        assert!(parse_bool("On"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }
}
