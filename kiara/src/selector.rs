use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents ways to locate elements in the live timesheet document.
///
/// Selectors are resolved by the [`crate::surface::FormSurface`] on every
/// operation; nothing here holds on to a resolved element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selector {
    /// Select by ARIA role and accessible name
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    /// Select with a raw CSS query
    Css(String),
    /// Select the input whose `name` attribute equals the value
    InputName(String),
    /// Select inputs whose `name` attribute starts with `prefix` and ends with `suffix`
    NamePattern { prefix: String, suffix: String },
    /// Move to the parent of each current match
    Parent,
    /// Keep only the n-th current match
    Nth(usize),
    /// Keep matches whose rendered text starts with the value
    TextPrefix(String),
    /// Chain multiple selectors
    Chain(Vec<Selector>),
}

impl Selector {
    pub fn role(role: &str, name: &str, exact: bool) -> Self {
        Selector::Role {
            role: role.to_string(),
            name: Some(name.to_string()),
            exact,
        }
    }

    pub fn css(query: impl Into<String>) -> Self {
        Selector::Css(query.into())
    }

    pub fn input_name(name: impl Into<String>) -> Self {
        Selector::InputName(name.into())
    }

    pub fn name_pattern(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Selector::NamePattern {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Append `next` to this selector, flattening nested chains.
    pub fn then(self, next: Selector) -> Selector {
        let mut chain = match self {
            Selector::Chain(parts) => parts,
            s => vec![s],
        };
        match next {
            Selector::Chain(mut parts) => chain.append(&mut parts),
            s => chain.push(s),
        }
        Selector::Chain(chain)
    }

    /// The selector as a flat list of steps.
    pub fn steps(&self) -> Vec<&Selector> {
        match self {
            Selector::Chain(parts) => parts.iter().flat_map(|p| p.steps()).collect(),
            s => vec![s],
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role { role, name, exact } => match name {
                Some(name) if *exact => write!(f, "role={role}[name=\"{name}\"]"),
                Some(name) => write!(f, "role={role}[name~=\"{name}\"]"),
                None => write!(f, "role={role}"),
            },
            Selector::Css(query) => write!(f, "{query}"),
            Selector::InputName(name) => write!(f, "input[name=\"{name}\"]"),
            Selector::NamePattern { prefix, suffix } => {
                write!(f, "input[name^=\"{prefix}\"][name$=\"{suffix}\"]")
            }
            Selector::Parent => write!(f, ".."),
            Selector::Nth(index) => write!(f, "nth={index}"),
            Selector::TextPrefix(text) => write!(f, ":text-starts(\"{text}\")"),
            Selector::Chain(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(" >> "))
            }
        }
    }
}
