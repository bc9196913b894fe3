//! Procedural macros for flux-serializer
//!
//! This crate provides the `FluxRecord` derive.

mod attributes;
mod macros;
mod type_conversion;
mod utils;

use proc_macro::TokenStream;

/// Derive macro for `FluxRecord` - exposes a struct to the serializer
///
/// This macro generates:
/// - `Record` implementation (attribute lookup by column name)
/// - `FluxModel` implementation (static `EntitySchema` with columns and relationships)
///
/// # Example
///
/// ```ignore
/// use flux_serializer::FluxRecord;
///
/// #[derive(FluxRecord, Debug)]
/// #[table_name = "posts"]
/// #[belongs_to(name = "author", entity = "users", from = "author_id")]
/// #[has_many(name = "comments", entity = "comments", to = "post_id")]
/// pub struct Post {
///     #[primary_key]
///     pub id: i64,
///     pub title: String,
///     pub author_id: Option<i64>,
///     #[skip]
///     pub cached_score: f64,
/// }
/// ```
#[proc_macro_derive(FluxRecord, attributes(table_name, primary_key, column_name, skip, belongs_to, has_many, has_one))]
pub fn derive_flux_record(input: TokenStream) -> TokenStream {
    macros::derive_flux_record(input)
}
