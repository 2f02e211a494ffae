use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Derives `Display` and `FromStr` for a fieldless enum through its serde
/// representation, plus an `ALL` table listing every variant in declaration
/// order.
///
/// The enum must implement `Serialize` and `Deserialize`, so renames applied
/// with `#[serde(rename_all = ...)]` are what gets printed and parsed.
#[proc_macro_derive(Label)]
pub fn label_macro_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let name = &ast.ident;

    let data = match &ast.data {
        Data::Enum(data) => data,
        _ => return quote! { compile_error!("Label supports only enums"); }.into(),
    };

    if data
        .variants
        .iter()
        .any(|variant| !matches!(variant.fields, Fields::Unit))
    {
        return quote! { compile_error!("Label supports only fieldless variants"); }.into();
    }

    let variants = data.variants.iter().map(|variant| &variant.ident);
    let count = data.variants.len();

    let gen = quote! {
        impl #name {
            pub const ALL: [#name; #count] = [#(#name::#variants),*];
        }

        impl std::fmt::Display for #name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                serde::Serialize::serialize(self, f)
            }
        }

        impl std::str::FromStr for #name {
            type Err = serde::de::value::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                use serde::de::IntoDeserializer;

                <Self as serde::Deserialize>::deserialize(s.into_deserializer())
            }
        }
    };

    gen.into()
}
