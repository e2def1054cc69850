use matches2::option_match;
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Error, Result};

use crate::util::{self, Attr, Named};

pub(crate) fn derive(input: TokenStream) -> Result<TokenStream> {
    let input: syn::DeriveInput = syn::parse2(input)?;
    if let syn::Data::Union(item) = &input.data {
        return Err(Error::new_spanned(item.union_token, "Component cannot be derived for unions"));
    }

    let args: Attr<ItemOpt> = Attr::from_attrs(&input.attrs)?;
    let crate_name = util::crate_name_or_default(
        args.find_one(|opt| option_match!(opt, ItemOpt::RrecsAs(_, crate_name) => crate_name))?,
    );
    let trackable = args.find_one(|opt| option_match!(opt, ItemOpt::Trackable => &()))?.is_some();

    let tracking = if trackable {
        quote! {
            fn tracking() -> ::std::option::Option<component::TrackingFns> {
                ::std::option::Option::Some(component::TrackingFns::of::<Self>())
            }
        }
    } else {
        quote!()
    };

    let generics = util::parse_generics(&input);
    let impl_component = generics.impl_trait(quote!(component::Component), tracking);

    Ok(quote! {
        const _: () = {
            use #crate_name::component;

            #[automatically_derived]
            #impl_component
        };
    })
}

enum ItemOpt {
    RrecsAs(syn::token::Paren, TokenStream),
    Trackable,
}

impl Parse for Named<ItemOpt> {
    fn parse(input: ParseStream) -> Result<Self> {
        let name = input.parse::<syn::Ident>()?;

        let value = match name.to_string().as_str() {
            "rrecs_as" => {
                let (paren, crate_name) = util::parse_crate_name(input)?;
                ItemOpt::RrecsAs(paren, crate_name)
            }
            "trackable" => ItemOpt::Trackable,
            _ => return Err(Error::new_spanned(&name, format!("Unknown argument `{name}`"))),
        };

        Ok(Named { name, value })
    }
}
