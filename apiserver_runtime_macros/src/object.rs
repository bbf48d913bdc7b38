use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr};

pub fn derive_object(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let kind = extract_kind(&input);

    let metadata_field = match extract_metadata_field(&input) {
        Ok(field) => field,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl apiserver_runtime::Object for #name {
            const KIND: &'static str = #kind;

            fn metadata(&self) -> &apiserver_runtime::ObjectMeta {
                &self.#metadata_field
            }

            fn metadata_mut(&mut self) -> &mut apiserver_runtime::ObjectMeta {
                &mut self.#metadata_field
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_kind(input: &DeriveInput) -> String {
    for attr in &input.attrs {
        if !attr.path().is_ident("object") {
            continue;
        }

        let mut kind = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("kind") {
                let value: LitStr = meta.value()?.parse()?;
                kind = Some(value.value());
            }
            Ok(())
        });

        if let Some(k) = kind {
            return k;
        }
    }

    input.ident.to_string()
}

fn extract_metadata_field(input: &DeriveInput) -> syn::Result<syn::Ident> {
    if let Data::Struct(data_struct) = &input.data {
        if let Fields::Named(fields) = &data_struct.fields {
            for field in &fields.named {
                for attr in &field.attrs {
                    if attr.path().is_ident("object") {
                        let mut is_metadata = false;
                        let _ = attr.parse_nested_meta(|meta| {
                            if meta.path.is_ident("metadata") {
                                is_metadata = true;
                            }
                            Ok(())
                        });
                        if is_metadata {
                            if let Some(ident) = &field.ident {
                                return Ok(ident.clone());
                            }
                        }
                    }
                }
            }

            for field in &fields.named {
                if let Some(ident) = &field.ident {
                    if ident == "metadata" {
                        return Ok(ident.clone());
                    }
                }
            }
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        "Object derive: no field marked with #[object(metadata)] and no field named `metadata`",
    ))
}
