mod from_repr;

use proc_macro::TokenStream;

/// Derives `fn from_repr(discriminant: <repr>) -> Option<Self>` for a fieldless
/// enum with an explicit `#[repr(_)]` and explicit discriminants on every
/// variant. Used for the wire-kind and ref-flag tag bytes, not for deriving
/// per-struct serializers.
#[proc_macro_derive(FromRepr)]
pub fn derive_from_repr(input: TokenStream) -> TokenStream {
    from_repr::derive(input).into()
}
