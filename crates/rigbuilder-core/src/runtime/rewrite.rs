//! `@name` token rewriting for module run code.

use crate::primitives::ATTR_PREFIX;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ATTR_TOKEN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"@(\w+)"));

/// Rewrite every `@name` token to the `attr_name` binding it refers to.
///
/// A `@` not followed by a word character is left untouched. Tokens inside
/// string literals are rewritten too; run code has no escape for them.
#[must_use]
pub fn rewrite_attribute_tokens(code: &str) -> Cow<'_, str> {
    match ATTR_TOKEN.as_ref() {
        Ok(re) => re.replace_all(code, format!("{}${{1}}", ATTR_PREFIX).as_str()),
        Err(_) => Cow::Borrowed(code),
    }
}
