//! Human readable names derived from type names

/// Turn an `InitialCaps` type name into space separated words.
///
/// A space is inserted before an uppercase letter that follows a lowercase
/// one, and before an uppercase letter that starts a new lowercase run, so
/// acronyms stay together: `UniqueVisitor` becomes `Unique Visitor` and
/// `HTTPServer` becomes `HTTP Server`.
pub fn verbose_name(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut out = String::with_capacity(type_name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let after_lower = chars[i - 1].is_ascii_lowercase();
            let starts_word = chars
                .get(i + 1)
                .map(|next| !next.is_ascii_uppercase())
                .unwrap_or(false);
            if after_lower || starts_word {
                out.push(' ');
            }
        }
        out.push(c);
    }

    out.trim().to_string()
}

/// Display names carried by every registered unit (traffic modules, plugins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayNames {
    pub name: String,
    pub verbose_name: String,
    pub verbose_name_plural: String,
}

impl DisplayNames {
    /// Derive both display names from the type name; the plural appends `s`.
    pub fn derive(name: &str) -> Self {
        let verbose_name = verbose_name(name);
        let verbose_name_plural = format!("{}s", verbose_name);
        Self {
            name: name.to_string(),
            verbose_name,
            verbose_name_plural,
        }
    }

    pub fn with_verbose_name(mut self, verbose_name: &str) -> Self {
        self.verbose_name = verbose_name.to_string();
        self.verbose_name_plural = format!("{}s", verbose_name);
        self
    }

    pub fn with_plural(mut self, plural: &str) -> Self {
        self.verbose_name_plural = plural.to_string();
        self
    }
}
