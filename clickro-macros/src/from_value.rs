use proc_macro::TokenStream;
use quote::quote;
use syn::*;

pub fn from_value(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { attrs: _, vis: _, ident, mut generics, data } = input;

    let q1 = match data {
        Data::Struct(st) => match &st.fields {
            Fields::Unnamed(FieldsUnnamed { unnamed, .. }) => {
                if unnamed.len() != 1 {
                    error!("only one field struct is supported")
                }

                quote! {
                    Ok(Self(::clickro::FromValue::from_value(value)?))
                }
            }
            Fields::Named(FieldsNamed { named, .. }) => {
                let Some(name) = named.first().and_then(|f| f.ident.as_ref()) else {
                    error!("only one field struct is supported")
                };
                if named.len() != 1 {
                    error!("only one field struct is supported")
                }

                quote! {
                    Ok(Self {
                        #name: ::clickro::FromValue::from_value(value)?,
                    })
                }
            },
            Fields::Unit => error!("unit struct carry no value"),
        },
        Data::Enum(_) => error!("enum is not yet supported"),
        Data::Union(_) => error!("union is not supported"),
    };

    for ty in generics.type_params_mut() {
        ty.bounds.push(syn::parse_quote!(::clickro::FromValue));
    }

    let (g1, g2, g3) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #g1 ::clickro::FromValue for #ident #g2 #g3 {
            fn from_value(value: ::clickro::Value) -> Result<Self, ::clickro::DecodeError> {
                #q1
            }
        }
    }.into())
}
