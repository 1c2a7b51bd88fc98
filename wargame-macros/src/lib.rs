//! Proc macros for structured oracle responses.
//!
//! Provides `#[derive(Tool)]`, which turns a plain struct into a Claude tool
//! definition whose JSON schema mirrors the struct. The oracle is forced to
//! answer through that tool, so the struct doubles as the deserialization
//! target for the answer.
//!
//! # Example
//!
//! ```ignore
//! /// Report the plausible outcomes of one order
//! #[derive(Tool, Deserialize)]
//! #[tool(name = "forecast_outcomes")]
//! struct ForecastOutcomes {
//!     /// Candidate outcomes with relative likelihoods
//!     #[tool(nested, min_items = 1)]
//!     outcomes: Vec<Candidate>,
//!     /// Free-form reasoning
//!     rationale: Option<String>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, LitInt, LitStr, Meta, Type};

/// Derive macro for generating Tool implementations.
///
/// # Attributes
///
/// - `#[tool(name = "...")]` - Override the tool name (defaults to snake_case struct name)
/// - `#[tool(optional)]` on fields - Mark field as optional in JSON schema
/// - `#[tool(rename = "...")]` on fields - Override field name in schema
/// - `#[tool(nested)]` on fields - The field's type (or `Vec`/`Option` element
///   type) also derives `Tool`; embed its object schema instead of a bare `object`
/// - `#[tool(min_items = N)]` on `Vec` fields - Require at least `N` elements
#[proc_macro_derive(Tool, attributes(tool))]
pub fn derive_tool(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_tool(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Per-field options collected from `#[tool(...)]`.
#[derive(Default)]
struct FieldOptions {
    rename: Option<String>,
    optional: bool,
    nested: bool,
    min_items: Option<u64>,
}

fn expand_tool(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;

    let tool_name = get_tool_name(&input)?;
    let description = get_doc_comment(&input.attrs);

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Tool derive only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(input, "Tool derive only supports structs")),
    };

    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let options = get_field_options(field)?;
        let field_name_str = match &options.rename {
            Some(name) => name.clone(),
            None => field
                .ident
                .as_ref()
                .map(|ident| ident.to_string())
                .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?,
        };
        let field_desc = get_doc_comment(&field.attrs);
        let field_type = &field.ty;

        let type_schema = type_to_schema(field_type, &options)?;

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        property_tokens.push(quote! {
            {
                #[allow(unused_mut)]
                let mut property = #type_schema;
                #desc_token
                properties.insert(#field_name_str.to_string(), property);
            }
        });

        if !options.optional && !is_option_type(field_type) {
            required_fields.push(field_name_str);
        }
    }

    let required_array: Vec<_> = required_fields.iter().map(|s| quote! { #s }).collect();

    Ok(quote! {
        impl #struct_name {
            /// Get the tool name.
            pub fn tool_name() -> &'static str {
                #tool_name
            }

            /// Get the tool description.
            pub fn tool_description() -> &'static str {
                #description
            }

            /// Generate the JSON schema for this tool's input.
            pub fn input_schema() -> serde_json::Value {
                let mut properties = serde_json::Map::new();
                #(#property_tokens)*

                let required: Vec<&str> = vec![#(#required_array),*];

                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                })
            }

            /// Create a Tool definition for use with the Claude API.
            pub fn as_tool() -> claude::Tool {
                claude::Tool {
                    name: Self::tool_name().to_string(),
                    description: Self::tool_description().to_string(),
                    input_schema: Self::input_schema(),
                }
            }
        }
    })
}

fn get_tool_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("tool") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("name") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
        }
    }

    Ok(to_snake_case(&input.ident.to_string()))
}

fn get_field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("tool") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("optional") {
                options.optional = true;
            } else if meta.path.is_ident("nested") {
                options.nested = true;
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                options.rename = Some(value.value());
            } else if meta.path.is_ident("min_items") {
                let value: LitInt = meta.value()?.parse()?;
                options.min_items = Some(value.base10_parse()?);
            } else {
                return Err(meta.error("unsupported tool attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

/// First generic argument of `Option<T>` / `Vec<T>`.
fn inner_type(segment: &syn::PathSegment) -> Option<&Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

fn type_to_schema(ty: &Type, options: &FieldOptions) -> syn::Result<TokenStream2> {
    let Type::Path(type_path) = ty else {
        return Ok(quote! { serde_json::json!({}) });
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Ok(quote! { serde_json::json!({}) });
    };

    Ok(match segment.ident.to_string().as_str() {
        "String" | "str" => quote! { serde_json::json!({"type": "string"}) },
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            quote! { serde_json::json!({"type": "integer"}) }
        }
        "f32" | "f64" => quote! { serde_json::json!({"type": "number"}) },
        "bool" => quote! { serde_json::json!({"type": "boolean"}) },
        "Option" => match inner_type(segment) {
            Some(inner) => return type_to_schema(inner, options),
            None => quote! { serde_json::json!({}) },
        },
        "Vec" => {
            let items = match inner_type(segment) {
                Some(inner) => type_to_schema(inner, options)?,
                None => quote! { serde_json::json!({}) },
            };
            let min_items = match options.min_items {
                Some(min) => quote! { array["minItems"] = serde_json::json!(#min); },
                None => quote! {},
            };
            quote! {
                {
                    #[allow(unused_mut)]
                    let mut array = serde_json::json!({
                        "type": "array",
                        "items": #items
                    });
                    #min_items
                    array
                }
            }
        }
        _ if options.nested => quote! { <#ty>::input_schema() },
        _ => quote! { serde_json::json!({"type": "object"}) },
    })
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
