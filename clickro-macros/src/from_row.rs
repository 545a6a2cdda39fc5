use proc_macro::TokenStream;
use quote::quote;
use syn::*;
use crate::attr::FieldAttr;

pub fn from_row(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { attrs: _, vis: _, ident, mut generics, data } = input;
    let Data::Struct(data) = data else {
        error!("only struct are currently supported")
    };

    let body = match data.fields {
        Fields::Unnamed(FieldsUnnamed { unnamed, .. }) => {
            let fields = (0..unnamed.len()).map(|i| quote! {
                ::clickro::FromValue::from_value(
                    values.next().ok_or(::clickro::DecodeError::IndexOutOfBounds(#i))?
                )?,
            });
            quote! {
                let mut values = row.into_iter();
                Ok(Self(#(#fields)*))
            }
        },
        Fields::Named(FieldsNamed { named, .. }) => {
            let mut fields = vec![];
            for field in &named {
                let Some(id) = field.ident.as_ref() else {
                    error!("named field without identifier")
                };
                let value = match FieldAttr::from_field(field)? {
                    FieldAttr::Skip => quote! { Default::default() },
                    attr => {
                        let column = attr.column(id);
                        quote! { row.try_get(#column)? }
                    }
                };
                fields.push(quote! { #id: #value, });
            }
            quote! {
                Ok(Self { #(#fields)* })
            }
        }
        Fields::Unit => quote! { Ok(Self) },
    };

    for ty in generics.type_params_mut() {
        ty.bounds.push(syn::parse_quote!(::clickro::FromValue));
    }

    let (g1, g2, g3) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #g1 ::clickro::FromRow for #ident #g2 #g3 {
            fn from_row(row: ::clickro::Row) -> Result<Self, ::clickro::DecodeError> {
                #body
            }
        }
    }.into())
}
