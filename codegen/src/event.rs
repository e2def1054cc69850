use matches2::option_match;
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Error, Result};

use crate::util::{self, Attr, Named};

pub(crate) fn derive(input: TokenStream) -> Result<TokenStream> {
    let input: syn::DeriveInput = syn::parse2(input)?;

    let args: Attr<ItemOpt> = Attr::from_attrs(&input.attrs)?;
    let crate_name = util::crate_name_or_default(
        args.find_one(|opt| option_match!(opt, ItemOpt::RrecsAs(_, crate_name) => crate_name))?,
    );

    let generics = util::parse_generics(&input);
    let impl_event = generics.impl_trait(quote!(#crate_name::event::Event), quote!());

    Ok(quote! {
        #[automatically_derived]
        #impl_event
    })
}

enum ItemOpt {
    RrecsAs(syn::token::Paren, TokenStream),
}

impl Parse for Named<ItemOpt> {
    fn parse(input: ParseStream) -> Result<Self> {
        let name = input.parse::<syn::Ident>()?;

        let value = match name.to_string().as_str() {
            "rrecs_as" => {
                let (paren, crate_name) = util::parse_crate_name(input)?;
                ItemOpt::RrecsAs(paren, crate_name)
            }
            _ => return Err(Error::new_spanned(&name, format!("Unknown argument `{name}`"))),
        };

        Ok(Named { name, value })
    }
}
