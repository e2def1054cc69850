use proc_macro::TokenStream;

mod component;
mod event;
mod util;

#[proc_macro_derive(Component, attributes(rrecs))]
pub fn component(input: TokenStream) -> TokenStream {
    component::derive(input.into()).unwrap_or_else(|err| err.to_compile_error()).into()
}

#[proc_macro_derive(Event, attributes(rrecs))]
pub fn event(input: TokenStream) -> TokenStream {
    event::derive(input.into()).unwrap_or_else(|err| err.to_compile_error()).into()
}
