//! Response templates
//!
//! Templates use `$Field` or `${Field}` placeholders; `$$` is a literal
//! dollar sign. `Name` is the assistant's name and any device label (for
//! example `Temperature`) is that device's latest reading.

use std::sync::LazyLock;

use rand::Rng;
use rand::seq::SliceRandom;
use regex::{Captures, Regex};

use super::patterns::IntentPattern;
use crate::devices::{DeviceRegistry, DeviceType};
use crate::{Error, Result};

/// Placeholder that always resolves to the assistant's name
pub const NAME_PLACEHOLDER: &str = "Name";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:(?P<escaped>\$)|(?P<named>[_A-Za-z][_A-Za-z0-9]*)|\{(?P<braced>[_A-Za-z][_A-Za-z0-9]*)\})",
    )
    .expect("valid regex")
});

/// Outcome of filling in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Every placeholder had a value
    Resolved(String),
    /// The first placeholder without a value
    Unresolved { field: String },
}

fn field<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.name("named")
        .or_else(|| caps.name("braced"))
        .map(|m| m.as_str())
}

/// Names referenced by a template, in order of appearance
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| field(&caps))
        .collect()
}

/// Fill in a template, stopping at the first unresolvable placeholder
///
/// A `$` that does not start a placeholder is kept as is.
pub fn render<F>(template: &str, mut resolve: F) -> Rendered
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match field(&caps) {
            Some(name) => match resolve(name) {
                Some(value) => out.push_str(&value),
                None => {
                    return Rendered::Unresolved {
                        field: name.to_string(),
                    };
                }
            },
            None => out.push('$'),
        }
    }

    out.push_str(&template[last..]);
    Rendered::Resolved(out)
}

/// Live values available to templates
pub struct Placeholders<'a> {
    pub name: &'a str,
    pub registry: &'a DeviceRegistry,
}

impl Placeholders<'_> {
    /// Value for a placeholder, if one is known right now
    #[must_use]
    pub fn resolve(&self, field: &str) -> Option<String> {
        if field == NAME_PLACEHOLDER {
            return Some(self.name.to_string());
        }
        let device_type = DeviceType::from_label(field)?;
        self.registry
            .latest_value(device_type)
            .map(|value| value.to_string())
    }
}

/// Pick and fill in a response for the pattern
///
/// Falls back to a random error template when an output template refers to
/// a reading that is not available.
///
/// # Errors
///
/// Returns error if the pattern has no usable template
pub fn compose_response<R: Rng + ?Sized>(
    pattern: &IntentPattern,
    values: &Placeholders<'_>,
    rng: &mut R,
) -> Result<String> {
    let template = pattern
        .output
        .choose(rng)
        .ok_or_else(|| Error::Pattern("pattern has no output templates".to_string()))?;

    let field = match render(template, |f| values.resolve(f)) {
        Rendered::Resolved(text) => return Ok(text),
        Rendered::Unresolved { field } => field,
    };

    tracing::debug!(field, template, "placeholder unavailable, using error template");

    let fallback = pattern
        .error
        .choose(rng)
        .ok_or_else(|| Error::Pattern(format!("no error template for unresolved ${field}")))?;

    match render(fallback, |f| values.resolve(f)) {
        Rendered::Resolved(text) => Ok(text),
        Rendered::Unresolved { field } => Err(Error::Pattern(format!(
            "error template refers to unresolved ${field}"
        ))),
    }
}
