use syn::*;

/// `#[sql(..)]` field attribute.
#[derive(Debug)]
pub enum FieldAttr {
    /// no attribute
    None,
    /// `#[sql(skip)]`
    Skip,
    /// `#[sql("column")]`
    Rename(String),
}

impl FieldAttr {
    pub fn from_field(field: &Field) -> Result<Self> {
        field
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident("sql"))
            .map(|attr| {
                attr.parse_args_with(|e: parse::ParseStream| {
                    let look = e.lookahead1();
                    if look.peek(Ident) {
                        if e.parse::<Ident>()? == "skip" {
                            Ok(Self::Skip)
                        } else {
                            error!("possible value are: `skip` or `\"column\"`")
                        }
                    } else if look.peek(LitStr) {
                        Ok(Self::Rename(e.parse::<LitStr>()?.value()))
                    } else {
                        Err(look.error())
                    }
                })
            })
            .unwrap_or(Ok(Self::None))
    }

    /// Column name of a named field.
    pub fn column(&self, ident: &Ident) -> String {
        match self {
            Self::Rename(name) => name.clone(),
            _ => ident.to_string(),
        }
    }
}

pub fn to_snake_case(string: &str) -> String {
    let mut output = String::with_capacity(string.len());

    let mut iter = string.chars();
    let Some(lead) = iter.next() else {
        return output;
    };

    output.extend(lead.to_lowercase());

    for it in iter {
        if it.is_uppercase() {
            output.push('_');
            output.extend(it.to_lowercase());
        } else {
            output.push(it);
        }
    }

    output
}
