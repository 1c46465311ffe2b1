//! Proc macros for the `basil` test runner.

mod codegen;
mod input;

/// Declare a test, deriving its name when none is given.
///
/// Expands to `target.test_with_source(name, source, body)`, where `target`
/// is a `basil::TestRunner` or a `basil::Context`.
///
/// Name resolution, first match wins:
/// 1. an explicit string literal;
/// 2. the function name, when `body` is a path to a `fn` item;
/// 3. a slug of the body's source text (`basil::name::from_source`), which
///    falls back to `"(No Name)"`.
///
/// The body's source text is recorded on the node either way, so a
/// reporter can show the code of a failing test.
///
/// # Example
///
/// ```text
/// basil::declare!(runner, "Login flow", |ctx| {
///     basil::declare!(ctx, |_| { assert!(form_is_visible()); });
///     basil::declare!(ctx, rejects_bad_passwords);
/// });
/// ```
///
/// The inner declarations are named `"assert form_is_visible"` and
/// `"rejects_bad_passwords"`.
#[proc_macro]
pub fn declare(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let declare = syn::parse_macro_input!(input as input::Declare);
    codegen::generate(declare).into()
}
