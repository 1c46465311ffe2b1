//! Best-effort test names for declarations that do not spell one out.
//!
//! Explicit names are always preferred. The fallbacks are: the display name
//! of a `fn` item, then a slug of the body's source text, then
//! [`NO_NAME`].

/// Name used when nothing better can be derived.
pub const NO_NAME: &str = "(No Name)";

/// The display name of callable type `F`: the last path segment of a `fn`
/// item. Closures are anonymous and yield `None`.
pub fn display_name<F: ?Sized>() -> Option<&'static str> {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") {
        return None;
    }
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().filter(|s| !s.is_empty())
}

/// Slug a body's source text into a name.
///
/// Strips the outermost `{ ... }` block if there is one, replaces every run
/// of non-word characters (anything but ASCII letters, digits and `_`) with
/// a single space, and trims. An empty result becomes [`NO_NAME`].
///
/// ```rust
/// assert_eq!(basil::name::from_source("{ assert!(user.is_admin()); }"), "assert user is_admin");
/// assert_eq!(basil::name::from_source("{ }"), "(No Name)");
/// ```
pub fn from_source(source: &str) -> String {
    let body = match (source.find('{'), source.rfind('}')) {
        (Some(open), Some(close)) if open < close => &source[open + 1..close],
        _ => source,
    };

    let mut slug = String::with_capacity(body.len());
    let mut in_gap = false;
    for ch in body.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if in_gap && !slug.is_empty() {
                slug.push(' ');
            }
            in_gap = false;
            slug.push(ch);
        } else {
            in_gap = true;
        }
    }

    if slug.is_empty() {
        NO_NAME.to_string()
    } else {
        slug
    }
}
