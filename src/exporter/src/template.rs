//! Query templating with request parameters.

use std::borrow::Cow;
use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};

/// Fuel limit for `MiniJinja` template evaluation.
const FUEL_LIMIT: u64 = 100_000;

/// Render `template` against `params`.
///
/// Without parameters the template is returned verbatim and never parsed,
/// so a query that happens to contain `{{` still runs unchanged. With
/// parameters, `{{ name }}` placeholders are substituted; referencing a
/// parameter that was not supplied is an error.
pub fn render_query<'a>(
    template: &'a str,
    params: &BTreeMap<String, String>,
) -> Result<Cow<'a, str>, minijinja::Error> {
    if params.is_empty() {
        return Ok(Cow::Borrowed(template));
    }

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_fuel(Some(FUEL_LIMIT));

    let rendered = env.render_str(template, params)?;
    tracing::debug!(query = %rendered, "Rendered query template");

    Ok(Cow::Owned(rendered))
}
