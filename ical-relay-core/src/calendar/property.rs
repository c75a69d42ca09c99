//! Content lines: a name, parameters and a raw value.

/// A single iCalendar property.
///
/// `value` holds the wire form (still escaped for TEXT values). Use
/// [`Property::text`] and [`Property::from_text`] to work with plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Property {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Build a TEXT property, escaping the given plain text.
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        Property::new(name, escape_text(text))
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into().to_ascii_uppercase(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The value with TEXT escapes resolved.
    pub fn text(&self) -> String {
        unescape_text(&self.value)
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// RFC 5545 TEXT escaping. The icalendar writer emits values as given.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_escaping_survives_special_characters() {
        let prop = Property::from_text("summary", "Lunch; with Bob, Alice\nRoom \\2");
        assert_eq!(prop.name, "SUMMARY");
        assert_eq!(prop.value, "Lunch\\; with Bob\\, Alice\\nRoom \\\\2");
        assert_eq!(prop.text(), "Lunch; with Bob, Alice\nRoom \\2");
    }

    #[test]
    fn test_param_lookup_is_case_insensitive() {
        let prop = Property::new("DTSTART", "20240101").with_param("value", "DATE");
        assert_eq!(prop.param("VALUE"), Some("DATE"));
        assert_eq!(prop.param("tzid"), None);
    }
}
