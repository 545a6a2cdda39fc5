use proc_macro::TokenStream;
use syn::DeriveInput;

macro_rules! error {
    ($($tt:tt)*) => {
        return Err(syn::Error::new(proc_macro::Span::call_site().into(), format!($($tt)*)))
    };
}

mod attr;
mod from_row;
mod from_value;
mod table;

/// Derive `FromRow`.
///
/// Named fields are looked up by column name, `#[sql("column")]` overrides
/// the name. Tuple struct fields are taken by position.
#[proc_macro_derive(FromRow, attributes(sql))]
pub fn from_row(input: TokenStream) -> TokenStream {
    match from_row::from_row(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(ok) => ok,
        Err(err) => err.into_compile_error().into(),
    }
}

/// Derive `FromValue` for single field struct.
#[proc_macro_derive(FromValue)]
pub fn from_value(input: TokenStream) -> TokenStream {
    match from_value::from_value(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(ok) => ok,
        Err(err) => err.into_compile_error().into(),
    }
}

/// Derive `Table`.
///
/// Table name is the snake case struct name, `#[sql("table")]` on the struct
/// overrides it. On fields, `#[sql("column")]` renames and `#[sql(skip)]`
/// excludes the field from inserts.
#[proc_macro_derive(Table, attributes(sql))]
pub fn table(input: TokenStream) -> TokenStream {
    match table::table(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(ok) => ok,
        Err(err) => err.into_compile_error().into(),
    }
}
