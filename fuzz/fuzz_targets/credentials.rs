//! Fuzz target for credential resolution.
//!
//! Arbitrary URLs and overrides must never panic, and generated connection
//! URLs must parse back to the same host and user.

#![no_main]

use arbitrary::Arbitrary;
use keystone_tenancy::config::{Credentials, TlsMode, is_loopback};
use libfuzzer_sys::fuzz_target;
use percent_encoding::percent_decode_str;
use url::Url;

/// Arbitrary credential input.
#[derive(Debug, Arbitrary)]
struct FuzzCredentials {
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    ssl_required: bool,
}

fuzz_target!(|data: FuzzCredentials| {
    let credentials = Credentials {
        url: data.url,
        host: data.host,
        port: data.port,
        user: data.user,
        password: data.password,
    };

    let _ = format!("{:?}", credentials);

    let Ok(resolved) = credentials.resolve(data.ssl_required) else {
        return;
    };

    if is_loopback(&resolved.host) {
        assert_eq!(resolved.tls, TlsMode::Disabled);
    }

    let url = resolved.connection_url("tenant_fuzz");
    let _ = resolved.redacted_url("tenant_fuzz");

    let parsed = Url::parse(&url).expect("generated URL must parse");
    assert_eq!(parsed.host_str(), Some(resolved.host.as_str()));
    let user = percent_decode_str(parsed.username())
        .decode_utf8()
        .expect("encoded user must decode");
    assert_eq!(user, resolved.user);
});
