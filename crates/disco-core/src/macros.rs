//! Discovery macro contexts.
//!
//! A discovery record binds macro names such as `{#IFNAME}` to string values
//! for one discovered instance. A context is built once per record and never
//! mutated afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Whether `c` may appear between `{#` and `}` in a macro name.
pub(crate) fn is_macro_char(c: char) -> bool {
  c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.'
}

/// Returns `true` if `token` is a complete discovery macro, e.g. `{#KEY}`.
pub fn is_macro_name(token: &str) -> bool {
  token
    .strip_prefix("{#")
    .and_then(|rest| rest.strip_suffix('}'))
    .is_some_and(|name| !name.is_empty() && name.chars().all(is_macro_char))
}

/// If `s` starts with a syntactically valid macro, return its byte length.
pub(crate) fn macro_len(s: &str) -> Option<usize> {
  let body = s.strip_prefix("{#")?;
  let name_len = body
    .char_indices()
    .find(|&(_, c)| !is_macro_char(c))
    .map(|(i, _)| i)
    .unwrap_or(body.len());
  if name_len == 0 || !body[name_len..].starts_with('}') {
    return None;
  }
  Some(2 + name_len + 1)
}

/// The macro bindings of one discovered instance.
///
/// Keys are stored in their full `{#NAME}` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct MacroContext {
  values: BTreeMap<String, String>,
}

impl MacroContext {
  pub fn new() -> Self { Self::default() }

  /// Builder-style binding. Names that are not valid macros are ignored.
  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    let name = name.into();
    if is_macro_name(&name) {
      self.values.insert(name, value.into());
    }
    self
  }

  /// Look up a macro by its full token, e.g. `ctx.get("{#KEY}")`.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  pub fn len(&self) -> usize { self.values.len() }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Build a context from one JSON discovery record.
  ///
  /// Members whose names are not macros are ignored, as are `null` values.
  /// Numbers and booleans are bound by their JSON text; nested arrays and
  /// objects by their compact serialisation.
  pub fn from_json(record: &serde_json::Value) -> Result<Self> {
    let object = record.as_object().ok_or_else(|| {
      Error::InvalidPayload(format!("discovery record is not an object: {record}"))
    })?;

    let mut values = BTreeMap::new();
    for (name, value) in object {
      if !is_macro_name(name) {
        continue;
      }
      let text = match value {
        serde_json::Value::Null => continue,
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      values.insert(name.clone(), text);
    }
    Ok(Self { values })
  }
}

impl TryFrom<BTreeMap<String, String>> for MacroContext {
  type Error = Error;

  fn try_from(values: BTreeMap<String, String>) -> Result<Self> {
    if let Some(bad) = values.keys().find(|k| !is_macro_name(k)) {
      return Err(Error::InvalidPayload(format!("invalid macro name {bad:?}")));
    }
    Ok(Self { values })
  }
}

impl From<MacroContext> for BTreeMap<String, String> {
  fn from(ctx: MacroContext) -> Self { ctx.values }
}
