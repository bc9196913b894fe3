//! Attribute parsing utilities

use syn::{Attribute, ExprLit, Field, Lit, LitStr};

fn string_value(attr: &Attribute) -> Option<String> {
    if let Ok(meta) = attr.meta.require_name_value() {
        if let syn::Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) = &meta.value
        {
            return Some(s.value());
        }
    }
    None
}

/// Extract table name from struct attributes
pub fn extract_table_name(attrs: &[Attribute]) -> Option<String> {
    attrs
        .iter()
        .find(|attr| attr.path().is_ident("table_name"))
        .and_then(string_value)
}

/// Column attributes of one field
#[derive(Default)]
pub struct ColumnAttributes {
    pub is_primary_key: bool,
    pub column_name: Option<String>,
    pub is_skipped: bool,
}

/// Parse `#[primary_key]`, `#[column_name = "..."]` and `#[skip]`
pub fn parse_column_attributes(field: &Field) -> ColumnAttributes {
    let mut attrs = ColumnAttributes::default();
    for attr in &field.attrs {
        if attr.path().is_ident("primary_key") {
            attrs.is_primary_key = true;
        } else if attr.path().is_ident("column_name") {
            attrs.column_name = string_value(attr);
        } else if attr.path().is_ident("skip") {
            attrs.is_skipped = true;
        }
    }
    attrs
}

/// Relationship kind, named after its `flux_serializer::RelationDef` constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
    HasOne,
}

impl RelationKind {
    pub fn constructor(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasMany => "has_many",
            RelationKind::HasOne => "has_one",
        }
    }
}

/// One `#[belongs_to(...)]`, `#[has_many(...)]` or `#[has_one(...)]` declaration
///
/// `from` defaults to the primary key for has-many/has-one, `to` defaults to
/// `id` for belongs-to. The other side is required.
#[derive(Debug, Clone)]
pub struct RelationAttribute {
    pub kind: RelationKind,
    pub name: String,
    pub entity: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Parse every relationship declared on the struct
pub fn parse_relations(attrs: &[Attribute]) -> syn::Result<Vec<RelationAttribute>> {
    let mut relations = Vec::new();
    for attr in attrs {
        let kind = if attr.path().is_ident("belongs_to") {
            RelationKind::BelongsTo
        } else if attr.path().is_ident("has_many") {
            RelationKind::HasMany
        } else if attr.path().is_ident("has_one") {
            RelationKind::HasOne
        } else {
            continue;
        };

        let mut name = None;
        let mut entity = None;
        let mut from = None;
        let mut to = None;
        attr.parse_nested_meta(|meta| {
            let value: LitStr = meta.value()?.parse()?;
            if meta.path.is_ident("name") {
                name = Some(value.value());
            } else if meta.path.is_ident("entity") {
                entity = Some(value.value());
            } else if meta.path.is_ident("from") {
                from = Some(value.value());
            } else if meta.path.is_ident("to") {
                to = Some(value.value());
            } else {
                return Err(meta.error("expected `name`, `entity`, `from` or `to`"));
            }
            Ok(())
        })?;

        let entity = entity.ok_or_else(|| syn::Error::new_spanned(attr, "relationship needs `entity = \"...\"`"))?;
        let name = name.unwrap_or_else(|| entity.clone());
        match kind {
            RelationKind::BelongsTo if from.is_none() => {
                return Err(syn::Error::new_spanned(attr, "belongs_to needs `from = \"<local column>\"`"));
            }
            RelationKind::HasMany | RelationKind::HasOne if to.is_none() => {
                return Err(syn::Error::new_spanned(attr, "has_many/has_one need `to = \"<target column>\"`"));
            }
            _ => {}
        }
        relations.push(RelationAttribute {
            kind,
            name,
            entity,
            from,
            to,
        });
    }
    Ok(relations)
}
