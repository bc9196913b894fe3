//! Rust field types to `ColumnKind` and `sea_query::Value`
//!
//! Values go through `sea_query::Value::from`, so every type `sea-query`
//! converts (including `Option<T>` as a typed NULL) is supported. The column
//! kind only decides how key parameters are bound.
//!
//! Supported kinds:
//! - Integer types: i8, i16, i32, i64, u8, u16, u32
//! - Floating point: f32, f64
//! - Boolean: bool
//! - `uuid::Uuid`
//! - `chrono::NaiveDate`, `chrono::NaiveDateTime`, `chrono::DateTime<Tz>`
//! - JSON: `serde_json::Value`
//! - Everything else binds as text

use proc_macro2::TokenStream;
use quote::quote;
use syn::{GenericArgument, PathArguments, Type, TypePath};

/// Inner type of `Option<T>`, or the type itself
pub fn unwrap_option(ty: &Type) -> &Type {
    if let Type::Path(TypePath { path, .. }) = ty {
        if let Some(segment) = path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

/// Check if a type is `serde_json::Value`
pub fn is_json_value_type(ty: &Type) -> bool {
    if let Type::Path(TypePath { path, .. }) = ty {
        let segments: Vec<_> = path.segments.iter().collect();
        segments.len() == 2 && segments[0].ident == "serde_json" && segments[1].ident == "Value"
    } else {
        false
    }
}

/// Name of the `flux_serializer::ColumnKind` variant for a field type
pub fn column_kind_name(ty: &Type) -> &'static str {
    let inner = unwrap_option(ty);
    if is_json_value_type(inner) {
        return "Json";
    }
    let Type::Path(TypePath { path, .. }) = inner else {
        return "Text";
    };
    let Some(segment) = path.segments.last() else {
        return "Text";
    };
    match segment.ident.to_string().as_str() {
        "bool" => "Boolean",
        "i8" | "i16" | "u8" => "SmallInteger",
        "i32" | "u16" => "Integer",
        "i64" | "u32" => "BigInteger",
        "f32" => "Float",
        "f64" => "Double",
        "Uuid" => "Uuid",
        "NaiveDate" => "Date",
        "NaiveDateTime" => "Timestamp",
        "DateTime" => "TimestampTz",
        _ => "Text",
    }
}

/// Generate code reading `self.field` as a `sea_query::Value`
pub fn generate_field_to_value(field_name: &syn::Ident) -> TokenStream {
    quote! {
        ::flux_serializer::sea_query::Value::from(::core::clone::Clone::clone(&self.#field_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(src: &str) -> Type {
        syn::parse_str(src).unwrap()
    }

    #[test]
    fn test_column_kind_name() {
        assert_eq!(column_kind_name(&ty("i64")), "BigInteger");
        assert_eq!(column_kind_name(&ty("Option<i32>")), "Integer");
        assert_eq!(column_kind_name(&ty("uuid::Uuid")), "Uuid");
        assert_eq!(column_kind_name(&ty("chrono::DateTime<chrono::Utc>")), "TimestampTz");
        assert_eq!(column_kind_name(&ty("serde_json::Value")), "Json");
        assert_eq!(column_kind_name(&ty("String")), "Text");
    }

    #[test]
    fn test_unwrap_option() {
        let inner = unwrap_option(&ty("Option<String>")).clone();
        assert_eq!(inner, ty("String"));
    }
}
