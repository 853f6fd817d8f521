use darling::Error;
use darling::ast::NestedMeta;
use quote::quote;
use syn::{Data, DeriveInput, Fields, ItemStruct, Lit, parse_macro_input};

use proc_macro::TokenStream;

/// Implements `crate::byteorder::WriteBytesLe` by writing every field in
/// declaration order.
#[proc_macro_derive(ToBytes)]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields: Vec<syn::Member> = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => named
                .named
                .iter()
                .filter_map(|f| f.ident.clone())
                .map(syn::Member::from)
                .collect(),
            Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
                .map(|i| syn::Index::from(i).into())
                .collect(),
            Fields::Unit => Vec::new(),
        },
        _ => {
            return syn::Error::new_spanned(name, "ToBytes can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let expanded = quote! {
        impl crate::byteorder::WriteBytesLe for #name {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#fields, dst); )*
            }
        }
    };

    TokenStream::from(expanded)
}

/// Marks a struct as a RIFF chunk body with the given four byte id, e.g.
/// `#[wave_chunk(b"fmt ")]`. The struct must also derive `ToBytes`.
#[proc_macro_attribute]
pub fn wave_chunk(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(Error::from(e).write_errors()),
    };

    let id = match args.first() {
        Some(NestedMeta::Lit(Lit::ByteStr(bs))) if bs.value().len() == 4 => bs.value(),
        Some(other) => {
            return syn::Error::new_spanned(other, "wave_chunk expects a 4 byte string")
                .to_compile_error()
                .into();
        }
        None => {
            return Error::custom("wave_chunk expects a chunk id such as b\"fmt \"")
                .write_errors()
                .into();
        }
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl crate::wav::WaveChunk for #name {
            const CHUNK_ID: [u8; 4] = [#(#id),*];

            fn chunk_data(&self) -> Vec<u8> {
                let mut data = Vec::new();
                crate::byteorder::WriteBytesLe::write_le(self, &mut data);
                data
            }
        }
    };
    TokenStream::from(expanded)
}
