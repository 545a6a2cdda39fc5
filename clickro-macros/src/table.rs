use proc_macro::TokenStream;
use quote::quote;
use syn::*;
use crate::attr::{FieldAttr, to_snake_case};

pub fn table(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { attrs, vis: _, ident, generics, data } = input;
    let Data::Struct(data) = data else {
        error!("only struct are supported")
    };

    let table = attrs
        .iter()
        .find(|e| e.path().is_ident("sql"))
        .map(|e| Ok::<_, Error>(e.parse_args::<LitStr>()?.value()))
        .unwrap_or_else(|| Ok(to_snake_case(&ident.to_string())))?;

    let Fields::Named(FieldsNamed { named, .. }) = data.fields else {
        error!("only named struct are supported")
    };

    let mut columns = vec![];
    let mut values = vec![];
    for field in &named {
        let Some(id) = field.ident.as_ref() else {
            error!("named field without identifier")
        };
        let attr = FieldAttr::from_field(field)?;
        if matches!(attr, FieldAttr::Skip) {
            continue;
        }
        columns.push(attr.column(id));
        values.push(quote! { ::clickro::Value::from(self.#id) });
    }

    let (g1, g2, g3) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #g1 ::clickro::Table for #ident #g2 #g3 {
            const TABLE: &'static str = #table;

            const COLUMNS: &'static [&'static str] = &[#(#columns),*];

            fn into_values(self) -> Vec<::clickro::Value> {
                vec![#(#values),*]
            }
        }
    }.into())
}
