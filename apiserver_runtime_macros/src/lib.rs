mod object;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Object)] derive macro
// ============================================================================

/// Derive macro for the `Object` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Default, Serialize, Deserialize, Object)]
/// #[object(kind = "Demo")]
/// struct Demo {
///     #[serde(default)]
///     pub metadata: ObjectMeta,
///     #[serde(default)]
///     pub spec: DemoSpec,
/// }
/// ```
///
/// - `#[object(kind = "...")]` sets the kind name.
///   If omitted, defaults to the struct name.
/// - `#[object(metadata)]` marks the `ObjectMeta` field.
///   If omitted, defaults to a field named `metadata`.
#[proc_macro_derive(Object, attributes(object))]
pub fn derive_object(input: TokenStream) -> TokenStream {
    object::derive_object(input)
}
