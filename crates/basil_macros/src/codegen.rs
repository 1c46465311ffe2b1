//! Code generation: a `declare!` invocation becomes a `test_with_source`
//! call with a derived name.

use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::Expr;

use crate::input::Declare;

pub fn generate(declare: Declare) -> TokenStream {
    let Declare { target, name, body } = declare;
    let source = source_text(&body);

    let name = match (name, display_name(&body)) {
        (Some(lit), _) => quote! { #lit },
        (None, Some(ident)) => quote! { #ident },
        (None, None) => quote! { ::basil::name::from_source(#source) },
    };

    quote! {
        (#target).test_with_source(#name, #source, #body)
    }
}

/// The text shown for a failing body: the closure's body, or the whole
/// expression for anything else.
fn source_text(body: &Expr) -> String {
    match body {
        Expr::Closure(closure) => closure.body.to_token_stream().to_string(),
        other => other.to_token_stream().to_string(),
    }
}

/// The last path segment when the body names a function.
fn display_name(body: &Expr) -> Option<String> {
    match body {
        Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(input: &str) -> String {
        generate(syn::parse_str(input).unwrap()).to_string()
    }

    #[test]
    fn explicit_name_wins() {
        let out = expand(r#"ctx, "adds", |_| { assert_eq!(2 + 3, 5); }"#);
        assert!(out.contains("test_with_source (\"adds\""));
    }

    #[test]
    fn fn_path_is_named_after_the_function() {
        let out = expand("ctx, flows::logs_in");
        assert!(out.contains("test_with_source (\"logs_in\""));
    }

    #[test]
    fn closure_is_named_from_its_body() {
        let out = expand("ctx, |_| { assert!(ready); }");
        assert!(out.contains(":: basil :: name :: from_source"));
        assert!(out.contains("assert ! (ready)"));
    }
}
