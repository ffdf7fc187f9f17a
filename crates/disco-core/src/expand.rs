//! Prototype expansion — substituting `{#MACRO}` placeholders.
//!
//! Expansion is pure: the same pattern and context always produce the same
//! string, which is what makes re-discovery idempotent.

use crate::{
  Error, Result,
  macros::{MacroContext, macro_len},
};

/// Expand every discovery macro in `pattern` verbatim.
///
/// Brace sequences that are not syntactically macros (`{HOST.NAME}`,
/// `{$USER_MACRO}`, `{#lower}`) are copied unchanged. A valid macro that
/// `ctx` does not bind fails with [`Error::UnresolvedMacro`].
pub fn expand(pattern: &str, ctx: &MacroContext) -> Result<String> {
  expand_with(pattern, ctx, false)
}

/// Expand an item key, quoting substituted values inside key parameters.
///
/// A value placed at the start of an unquoted parameter is wrapped in quotes
/// when it starts with a space or `"`, or contains `,` or `]`. A `"` in the
/// middle of an unquoted value is kept as is. Inside a quoted parameter, `"`
/// is escaped as `\"`. Outside `[...]` values are substituted verbatim.
///
/// A value that ends up quoted must not end with `\`: it would escape the
/// closing quote, so expansion fails with [`Error::UnquotableKeyParam`].
pub fn expand_key(key: &str, ctx: &MacroContext) -> Result<String> {
  expand_with(key, ctx, true)
}

fn expand_with(pattern: &str, ctx: &MacroContext, key_mode: bool) -> Result<String> {
  let mut out = String::with_capacity(pattern.len());
  let mut params = KeyParams::default();
  let mut i = 0;

  while i < pattern.len() {
    let rest = &pattern[i..];

    if let Some(len) = macro_len(rest) {
      let name = &rest[..len];
      let value = ctx
        .get(name)
        .ok_or_else(|| Error::UnresolvedMacro(name.to_owned()))?;

      if key_mode {
        params.substitute(value, &mut out)?;
      } else {
        out.push_str(value);
      }
      i += len;
      continue;
    }

    let Some(c) = rest.chars().next() else { break };
    params.observe(c);
    out.push(c);
    i += c.len_utf8();
  }

  Ok(out)
}

fn needs_quoting(value: &str) -> bool {
  value.starts_with(' ') || value.starts_with('"') || value.contains([',', ']'])
}

/// Tracks where we are inside an item key's `[...]` parameter list.
#[derive(Default)]
struct KeyParams {
  depth:       usize,
  quoted:      bool,
  param_start: bool,
  escaped:     bool,
}

impl KeyParams {
  fn observe(&mut self, c: char) {
    if self.quoted {
      match c {
        '\\' if !self.escaped => {
          self.escaped = true;
          return;
        }
        '"' if !self.escaped => self.quoted = false,
        _ => {}
      }
      self.escaped = false;
      return;
    }

    match c {
      '[' => {
        self.depth += 1;
        self.param_start = true;
      }
      ']' => {
        self.depth = self.depth.saturating_sub(1);
        self.param_start = false;
      }
      ',' if self.depth > 0 => self.param_start = true,
      '"' if self.depth > 0 && self.param_start => {
        self.quoted = true;
        self.param_start = false;
      }
      ' ' => {}
      _ => self.param_start = false,
    }
  }

  fn substitute(&mut self, value: &str, out: &mut String) -> Result<()> {
    let quote = self.depth > 0 && (self.quoted || (self.param_start && needs_quoting(value)));
    if quote && value.ends_with('\\') {
      return Err(Error::UnquotableKeyParam(value.to_owned()));
    }

    if !quote {
      out.push_str(value);
    } else if self.quoted {
      out.push_str(&value.replace('"', "\\\""));
    } else {
      out.push('"');
      out.push_str(&value.replace('"', "\\\""));
      out.push('"');
    }
    self.param_start = false;
    Ok(())
  }
}
