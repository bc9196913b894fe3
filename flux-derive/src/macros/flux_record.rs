//! FluxRecord derive macro implementation

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DataStruct, DeriveInput, Fields};

use crate::attributes::{self, RelationAttribute, RelationKind};
use crate::type_conversion;
use crate::utils;

struct ColumnField<'a> {
    ident: &'a syn::Ident,
    column: String,
    kind: &'static str,
}

/// Derive macro for `FluxRecord`
///
/// The primary key is the field marked `#[primary_key]`, else the field
/// named `id`. The table name defaults to the pluralized snake_case struct
/// name.
pub fn derive_flux_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(fields),
            ..
        }) => &fields.named,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "FluxRecord can only be derived for structs with named fields",
            ))
        }
    };

    let table_name = attributes::extract_table_name(&input.attrs)
        .unwrap_or_else(|| utils::default_table_name(&struct_name.to_string()));

    let mut columns = Vec::new();
    let mut primary_key: Option<String> = None;
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = attributes::parse_column_attributes(field);
        if attrs.is_skipped {
            continue;
        }
        let column = attrs.column_name.unwrap_or_else(|| ident.to_string());
        if attrs.is_primary_key {
            if primary_key.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "FluxRecord supports a single #[primary_key] field",
                ));
            }
            primary_key = Some(column.clone());
        }
        columns.push(ColumnField {
            ident,
            column,
            kind: type_conversion::column_kind_name(&field.ty),
        });
    }

    let primary_key = match primary_key {
        Some(pk) => pk,
        None if columns.iter().any(|c| c.column == "id") => "id".to_string(),
        None => {
            return Err(syn::Error::new(
                struct_name.span(),
                "FluxRecord needs a #[primary_key] field or a field named `id`",
            ))
        }
    };

    let get_arms = columns.iter().map(|c| {
        let name = &c.column;
        let value = type_conversion::generate_field_to_value(c.ident);
        quote! { #name => ::core::option::Option::Some(#value), }
    });

    let column_defs = columns.iter().map(|c| {
        let name = &c.column;
        let kind = format_ident!("{}", c.kind);
        quote! { .column(#name, ::flux_serializer::ColumnKind::#kind) }
    });

    let relations = attributes::parse_relations(&input.attrs)?;
    let relation_defs = relations
        .iter()
        .map(|r| relation_tokens(r, &table_name, &primary_key, struct_name))
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl ::flux_serializer::Record for #struct_name {
            fn entity_type(&self) -> ::flux_serializer::EntityType {
                ::flux_serializer::EntityType::new(#table_name)
            }

            fn get(&self, column: &str) -> ::core::option::Option<::flux_serializer::sea_query::Value> {
                match column {
                    #(#get_arms)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl ::flux_serializer::FluxModel for #struct_name {
            fn entity_schema() -> ::flux_serializer::EntitySchema {
                ::flux_serializer::EntitySchema::new(#table_name, #primary_key)
                    #(#column_defs)*
                    #(#relation_defs)*
            }
        }
    })
}

fn relation_tokens(
    relation: &RelationAttribute,
    table_name: &str,
    primary_key: &str,
    struct_name: &syn::Ident,
) -> syn::Result<TokenStream2> {
    let constructor = format_ident!("{}", relation.kind.constructor());
    let name = &relation.name;
    let entity = &relation.entity;
    let missing = |side: &str| {
        syn::Error::new(
            struct_name.span(),
            format!("relationship `{name}` needs `{side} = \"<column>\"`"),
        )
    };
    let (from, to) = match relation.kind {
        RelationKind::BelongsTo => (
            relation.from.clone().ok_or_else(|| missing("from"))?,
            relation.to.clone().unwrap_or_else(|| "id".to_string()),
        ),
        RelationKind::HasMany | RelationKind::HasOne => (
            relation.from.clone().unwrap_or_else(|| primary_key.to_string()),
            relation.to.clone().ok_or_else(|| missing("to"))?,
        ),
    };
    Ok(quote! {
        .relation(::flux_serializer::RelationDef::#constructor(#name, #table_name, #from, #entity, #to))
    })
}
