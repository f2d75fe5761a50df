//! Fuzz target for slug normalization and store naming.
//!
//! Any slug that is accepted must yield a safe, bounded PostgreSQL identifier.

#![no_main]

use arbitrary::Arbitrary;
use keystone_tenancy::{StoreNaming, normalize_slug};
use keystone_tenancy::schema::quote_ident;
use libfuzzer_sys::fuzz_target;

/// Arbitrary naming input.
#[derive(Debug, Arbitrary)]
struct FuzzNaming {
    /// Raw slug as typed at signup
    slug: String,
    /// Candidate store prefix
    prefix: String,
}

fuzz_target!(|data: FuzzNaming| {
    let naming = StoreNaming::new(data.prefix.clone()).unwrap_or_default();

    let Ok(slug) = normalize_slug(&data.slug) else {
        assert!(naming.store_name(&data.slug).is_err());
        return;
    };

    let name = naming.store_name(&data.slug).unwrap();
    assert!(name.len() <= 63);
    assert!(name.starts_with(naming.prefix()));
    assert!(name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_'));

    // Deterministic
    assert_eq!(naming.store_name(&slug).unwrap(), name);

    // Quoting never needs escaping for accepted names
    assert_eq!(quote_ident(&name), format!("\"{}\"", name));
});
