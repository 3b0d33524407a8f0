// ABOUTME: Normalization and validation of profile ("me") URLs and client identifiers
// ABOUTME: Lower-cases hosts, defaults empty paths to "/", and rejects unsafe URL shapes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! Identifier URL parsing
//!
//! A profile URL must be http(s), carry no userinfo, fragment, dot path
//! segment, explicit port or IP literal host. A client identifier follows the
//! same rules but may use a port and a loopback IP literal, so local
//! development clients can be registered.

use url::{Host, Url};

/// Normalize a profile URL, returning `None` when it is not acceptable as `me`
#[must_use]
pub fn parse_profile_url(input: &str) -> Option<String> {
    let url = parse_common(input)?;

    if has_explicit_port(input) || !matches!(url.host(), Some(Host::Domain(_))) {
        return None;
    }

    Some(url.into())
}

/// Normalize a client identifier, returning `None` when it is not acceptable as `client_id`
#[must_use]
pub fn parse_client_id(input: &str) -> Option<String> {
    let url = parse_common(input)?;

    match url.host() {
        Some(Host::Domain(_)) => {}
        Some(Host::Ipv4(ip)) if ip.is_loopback() => {}
        Some(Host::Ipv6(ip)) if ip.is_loopback() => {}
        _ => return None,
    }

    Some(url.into())
}

fn parse_common(input: &str) -> Option<Url> {
    let (authority, path) = split_raw(input)?;

    if input.contains('#') || authority.contains('@') || has_dot_segment(path) {
        return None;
    }

    let url = Url::parse(input).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    Some(url)
}

/// Split the raw input into authority and path before the URL parser
/// resolves dot segments or drops default ports.
fn split_raw(input: &str) -> Option<(&str, &str)> {
    let (_, rest) = input.split_once("://")?;
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    let path_end = tail.find(['?', '#']).unwrap_or(tail.len());
    Some((authority, &tail[..path_end]))
}

fn has_dot_segment(path: &str) -> bool {
    path.contains("/./")
        || path.contains("/../")
        || path.ends_with("/.")
        || path.ends_with("/..")
}

fn has_explicit_port(input: &str) -> bool {
    split_raw(input).is_some_and(|(authority, _)| {
        let host_end = authority.rfind(']').map_or(0, |i| i + 1);
        authority[host_end..].contains(':')
    })
}
