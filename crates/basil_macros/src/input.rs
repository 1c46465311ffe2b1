//! Parsing of `declare!` input.

use syn::parse::{Parse, ParseStream};
use syn::{Expr, LitStr, Result, Token};

/// `declare!(target, ["name",] body)`
#[derive(Debug)]
pub struct Declare {
    /// The runner or context the declaration goes to.
    pub target: Expr,
    pub name: Option<LitStr>,
    pub body: Expr,
}

impl Parse for Declare {
    fn parse(input: ParseStream) -> Result<Self> {
        let target: Expr = input.parse()?;
        input.parse::<Token![,]>()?;

        let name = if input.peek(LitStr) {
            let name: LitStr = input.parse()?;
            input.parse::<Token![,]>()?;
            Some(name)
        } else {
            None
        };

        let body: Expr = input.parse()?;
        if input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
        }
        if !input.is_empty() {
            return Err(input.error("expected `declare!(target, [\"name\",] body)`"));
        }

        Ok(Declare { target, name, body })
    }
}
