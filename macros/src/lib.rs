//! Derive macros for ObservR
//!
//! This crate provides procedural macros to reduce the boilerplate of
//! declaring request types.
//!
//! # Available Macros
//!
//! - `#[derive(Request)]` - Implements `observr_core::Request`
//!
//! # Example
//!
//! ```ignore
//! use observr_macros::Request;
//!
//! #[derive(Request)]
//! #[request(response = String)]
//! struct Ping {
//!     message: String,
//! }
//!
//! // No attribute: completion-only, so a `Clone` type is also a notification
//! #[derive(Request, Clone)]
//! struct CacheInvalidated;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, DeriveInput, Type, parse_macro_input, parse_quote};

/// Derive macro for request types
///
/// Implements `observr_core::Request` with the response type given by the
/// `#[request(response = T)]` attribute, or `()` when the attribute is absent.
///
/// # Attributes
///
/// - `#[request(response = T)]` - The single response type of this request
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - `#[request]` contains anything other than `response = T`
/// - `response` is given more than once
///
/// # Example
///
/// ```ignore
/// #[derive(Request)]
/// #[request(response = Vec<Order>)]
/// struct OrdersForCustomer {
///     customer_id: u64,
/// }
///
/// #[derive(Request, Clone)]
/// enum AccountEvent {
///     Opened { id: u64 },
///     Closed { id: u64 },
/// }
/// ```
#[proc_macro_derive(Request, attributes(request))]
pub fn derive_request(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let response = match response_type(&input.attrs) {
        Ok(response) => response.unwrap_or_else(|| parse_quote!(())),
        Err(error) => return error.to_compile_error().into(),
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::observr_core::Request for #name #ty_generics #where_clause {
            type Response = #response;
        }
    };

    TokenStream::from(expanded)
}

/// Read `response = T` from the `#[request(...)]` attributes
fn response_type(attrs: &[Attribute]) -> syn::Result<Option<Type>> {
    let mut response: Option<Type> = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("request")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("response") {
                return Err(meta.error("expected `response = <type>`"));
            }
            if response.is_some() {
                return Err(meta.error("duplicate `response` in #[request]"));
            }
            response = Some(meta.value()?.parse()?);
            Ok(())
        })?;
    }

    Ok(response)
}
