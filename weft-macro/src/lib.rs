use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{DeriveInput, Expr, ExprLit, Lit, Meta, MetaNameValue, Token};

/// Turns a serde type into a schema message that can travel through weft channels.
///
/// The type gets a stable full name, a `Payload` impl and is registered for dynamic
/// decoding, so it can also be received on `AnyMessage` channels of any runtime built
/// with `RuntimeBuilder::with_linked_types()`.
///
/// # Examples
///
/// ```rust,ignore
/// use serde::{Deserialize, Serialize};
/// use weft::schema_message;
///
/// #[schema_message(name = "health.HeartRate")]
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct HeartRate {
///     bpm: u16,
/// }
///
/// // Without a name, the type's identifier is used ("Battery").
/// #[schema_message]
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Battery {
///     level: f32,
/// }
/// ```
///
/// # Parameters
///
/// - `name`: full name on the wire. Must be identical in every process exchanging the type.
///
/// The type must implement `Serialize`, `Deserialize` and `Debug`, and must not be generic.
#[proc_macro_attribute]
pub fn schema_message(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = syn::parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let item = syn::parse_macro_input!(input as DeriveInput);

    match expand_schema_message(&attr_args, &item) {
        Ok(expanded) => expanded.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_schema_message(
    attr_args: &Punctuated<Meta, Token![,]>,
    item: &DeriveInput,
) -> syn::Result<proc_macro2::TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "schema_message types must not be generic, every message needs one fixed name",
        ));
    }

    let ident = &item.ident;
    let full_name = parse_name(attr_args)?.unwrap_or_else(|| ident.to_string());
    let register_fn = format_ident!("__weft_register_schema_{}", ident);

    Ok(quote! {
        #item

        impl ::weft::weft_runtime::SchemaMessage for #ident {
            const FULL_NAME: &'static str = #full_name;
        }

        impl ::weft::weft_runtime::Payload for #ident {
            fn mutator() -> ::weft::weft_runtime::Mutator<Self> {
                ::weft::weft_runtime::schema_mutator::<Self>()
            }
        }

        // Auto-registration using linkme
        #[::weft::weft_runtime::linkme::distributed_slice(::weft::weft_runtime::SCHEMA_TYPES)]
        #[linkme(crate = ::weft::weft_runtime::linkme)]
        #[allow(non_snake_case)]
        fn #register_fn() -> ::weft::weft_runtime::SchemaRegistration {
            ::weft::weft_runtime::SchemaRegistration::of::<#ident>()
        }
    })
}

fn parse_name(attr_args: &Punctuated<Meta, Token![,]>) -> syn::Result<Option<String>> {
    let mut name = None;
    for meta in attr_args {
        match meta {
            Meta::NameValue(MetaNameValue { path, value, .. }) if path.is_ident("name") => {
                let Expr::Lit(ExprLit { lit: Lit::Str(lit), .. }) = value else {
                    return Err(syn::Error::new_spanned(value, "name must be a string literal"));
                };
                if lit.value().trim().is_empty() {
                    return Err(syn::Error::new_spanned(lit, "name must not be empty"));
                }
                name = Some(lit.value());
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unknown argument, expected `name = \"...\"`",
                ));
            }
        }
    }
    Ok(name)
}
