use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned, ToTokens};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Error, Result};

/// An option in `#[rrecs(...)]` together with its name.
pub(crate) struct Named<T> {
    pub(crate) name:  syn::Ident,
    pub(crate) value: T,
}

/// The comma-separated options of all `#[rrecs(...)]` attributes on an item.
pub(crate) struct Attr<T> {
    pub(crate) items: Vec<Named<T>>,
}

impl<T> Default for Attr<T> {
    fn default() -> Self { Self { items: Vec::new() } }
}

impl<T> Parse for Attr<T>
where
    Named<T>: Parse,
{
    fn parse(input: ParseStream) -> Result<Self> {
        let items = Punctuated::<Named<T>, syn::Token![,]>::parse_terminated(input)?;
        Ok(Self { items: items.into_iter().collect() })
    }
}

impl<T> Attr<T> {
    /// Collects the options of every `#[rrecs(...)]` attribute.
    pub(crate) fn from_attrs(attrs: &[syn::Attribute]) -> Result<Self>
    where
        Named<T>: Parse,
    {
        let mut args = Self::default();
        for attr in attrs {
            if attr.path().is_ident("rrecs") {
                let this_args: Self = attr.parse_args()?;
                args.items.extend(this_args.items);
            }
        }
        Ok(args)
    }

    /// Finds the only option accepted by `matcher`.
    ///
    /// Returns an error if more than one option matches.
    pub(crate) fn find_one<'t, U: 't>(
        &'t self,
        matcher: impl Fn(&'t T) -> Option<&'t U>,
    ) -> Result<Option<(Span, &'t U)>> {
        let mut found = None;
        for item in &self.items {
            if let Some(value) = matcher(&item.value) {
                if found.is_some() {
                    return Err(Error::new_spanned(
                        &item.name,
                        format!("Argument `{}` is specified more than once", item.name),
                    ));
                }
                found = Some((item.name.span(), value));
            }
        }
        Ok(found)
    }
}

pub(crate) fn parse_generics(input: &syn::DeriveInput) -> ParsedGenerics {
    let generics = &input.generics;

    let (decl, usage) = if input.generics.params.is_empty() {
        (quote!(), quote!())
    } else {
        let decl: Vec<_> = input.generics.params.iter().collect();
        let usage: Vec<_> = input
            .generics
            .params
            .iter()
            .map(|param| match param {
                syn::GenericParam::Type(syn::TypeParam { ident, .. }) => quote!(#ident),
                syn::GenericParam::Lifetime(syn::LifetimeParam { lifetime, .. }) => {
                    quote!(#lifetime)
                }
                syn::GenericParam::Const(syn::ConstParam { ident, .. }) => quote!(#ident),
            })
            .collect();
        (
            quote_spanned!(generics.span() => <#(#decl),*>),
            quote_spanned!(generics.span() => <#(#usage),*>),
        )
    };

    let where_ = &input.generics.where_clause;

    ParsedGenerics { ident: input.ident.clone(), decl, usage, where_: where_.to_token_stream() }
}

pub(crate) struct ParsedGenerics {
    pub(crate) ident:  syn::Ident,
    pub(crate) decl:   TokenStream,
    pub(crate) usage:  TokenStream,
    pub(crate) where_: TokenStream,
}

impl ParsedGenerics {
    pub(crate) fn impl_trait(&self, trait_: TokenStream, body: TokenStream) -> TokenStream {
        let Self { ident, decl, usage, where_ } = self;
        quote! {
            impl #decl #trait_ for #ident #usage #where_ {
                #body
            }
        }
    }
}

/// Parses the argument of `rrecs_as(...)`, the path to the `rrecs` crate.
pub(crate) fn parse_crate_name(input: ParseStream) -> Result<(syn::token::Paren, TokenStream)> {
    let inner;
    let paren = syn::parenthesized!(inner in input);
    let crate_name = inner.parse()?;
    Ok((paren, crate_name))
}

pub(crate) fn crate_name_or_default(crate_name: Option<(Span, &TokenStream)>) -> TokenStream {
    crate_name.map_or_else(|| quote!(::rrecs), |(_, crate_name)| crate_name.clone())
}
