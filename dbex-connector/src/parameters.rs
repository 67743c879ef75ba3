//! `Parameters`: the mutable `string → value` map threaded through a
//! session. Populated at session start from configuration + CLI, then
//! treated as read-only once a phase has started — threaded explicitly,
//! never a process-global.

use std::collections::HashMap;

/// Well-known parameter keys the orchestrator and data parser special-case.
pub mod well_known {
    pub const DATABASE_NAME: &str = "DatabaseName";
    pub const JOURNAL_SCHEMA: &str = "JournalSchema";
    pub const JOURNAL_TABLE: &str = "JournalTable";
    pub const USER_NAME: &str = "UserName";
    pub const DATE_TIME_NOW: &str = "DateTimeNow";
}

#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a set of defaults, then apply user overrides on top —
    /// user overrides always win.
    pub fn with_defaults_and_overrides<I, J>(defaults: I, overrides: J) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
        J: IntoIterator<Item = (String, String)>,
    {
        let mut values: HashMap<String, String> = defaults.into_iter().collect();
        values.extend(overrides);
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `{{name}}` substitution for SQL script bodies. Unknown placeholders
    /// are preserved verbatim.
    pub fn substitute_sql(&self, script: &str) -> String {
        substitute_braces(script, |name| self.get(name).map(str::to_owned))
    }
}

/// Shared implementation for `{{name}}` substitution; unknown names are left
/// untouched rather than replaced with an empty string.
pub fn substitute_braces(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        // Unterminated placeholder: preserve verbatim.
                        out.push_str(&rest[start..]);
                        break;
                    }
                    Some(end) => {
                        let name = &after_open[..end];
                        match lookup(name) {
                            Some(value) => out.push_str(&value),
                            None => {
                                out.push_str("{{");
                                out.push_str(name);
                                out.push_str("}}");
                            }
                        }
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders_and_preserves_unknown() {
        let mut params = Parameters::new();
        params.set("DatabaseName", "widgets");
        let out = params.substitute_sql("USE {{DatabaseName}}; -- {{Unknown}}");
        assert_eq!(out, "USE widgets; -- {{Unknown}}");
    }

    #[test]
    fn overrides_win_over_defaults() {
        let params = Parameters::with_defaults_and_overrides(
            [("UserName".to_string(), "default".to_string())],
            [("UserName".to_string(), "override".to_string())],
        );
        assert_eq!(params.get("UserName"), Some("override"));
    }

    #[test]
    fn unterminated_placeholder_is_preserved() {
        let params = Parameters::new();
        assert_eq!(params.substitute_sql("a {{broken"), "a {{broken");
    }
}
