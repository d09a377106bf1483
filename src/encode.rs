//! Path encoder: bidirectional encoding of package names into
//! filesystem-safe segments.
//!
//! Scoped package names (`@scope/name`) contain a `/`, which can't appear in
//! a single path segment. Store and virtual-store paths special-case this
//! with `name.replace('/', "+")`; this module makes that transform a
//! first-class, round-trippable pair of functions instead of an inline
//! `.replace()` scattered across call sites.

/// Encode a package name for use as a filesystem path segment.
///
/// `@scope/name` -> `@scope+name`. Unscoped names pass through unchanged.
pub fn encode(name: &str) -> String {
    name.replacen('/', "+", 1)
}

/// Decode a filesystem-safe segment back into a package name.
///
/// Inverse of [`encode`]. Only the first `+` is treated as the scope
/// separator, so a package name that itself contains `+` round-trips
/// correctly as long as it has no literal `/` — npm package names can't
/// contain `/` outside the scope separator, so this is unambiguous.
pub fn decode(encoded: &str) -> String {
    encoded.replacen('+', "/", 1)
}
