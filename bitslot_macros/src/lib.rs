// This file is part of bitslot, an application to manage multiple FPGA bitstream slots in SPI flash.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// bitslot is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// bitslot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, LitStr, parse_macro_input};

/// Give a programmer backend a `register_programmer()` associated function.
///
/// ```rust,ignore
/// #[programmer(backend = "image")]
/// pub struct FlashImageProgrammer { /* ... */ }
/// ```
///
/// expands to the struct plus
///
/// ```rust,ignore
/// impl FlashImageProgrammer {
///     pub fn register_programmer() {
///         crate::flash::programmer::register_programmer("image", |config| {
///             Box::new(FlashImageProgrammer::from_config(config))
///         });
///     }
/// }
/// ```
///
/// The struct must provide `from_config(&ProgrammerConfig) -> Self` and implement `Programmer`.
#[proc_macro_attribute]
pub fn programmer(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut backend: Option<LitStr> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("backend") {
            backend = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported programmer property, expected `backend`"))
        }
    });
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as ItemStruct);

    let Some(backend) = backend else {
        return syn::Error::new_spanned(
            &item.ident,
            "missing backend name, use #[programmer(backend = \"...\")]",
        )
        .to_compile_error()
        .into();
    };
    if backend.value().is_empty() {
        return syn::Error::new_spanned(&backend, "backend name must not be empty")
            .to_compile_error()
            .into();
    }

    let ident = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();
    quote! {
        #item

        impl #impl_generics #ident #ty_generics #where_clause {
            /// Add this backend to the programmer registry.
            pub fn register_programmer() {
                crate::flash::programmer::register_programmer(#backend, |config| {
                    ::std::boxed::Box::new(#ident::from_config(config))
                });
            }
        }
    }
    .into()
}
