// ABOUTME: HTML and header parsing for rel links, pgpkey links, redirect_uri whitelists and h-app names
// ABOUTME: All hrefs are resolved against the URL the document was fetched from
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! Microformats parsing
//!
//! Only the small subset of microformats2 the server relies on: `rel` values
//! on `<link>` and `<a>` elements (in document order), an `h-app`/`h-x-app`
//! item's name and url, and `Link` response headers.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A link element or anchor carrying a `rel` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelLink {
    /// Absolute target
    pub href: String,
    /// Whitespace separated relation values, lower-cased
    pub rels: Vec<String>,
}

impl RelLink {
    /// Whether the link carries the given relation
    #[must_use]
    pub fn has(&self, rel: &str) -> bool {
        self.rels.iter().any(|r| r == rel)
    }
}

/// Identity links a profile page offers for authentication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthLinks {
    /// Candidate identity links, in document order
    pub links: Vec<String>,
    /// Public key link, if the page publishes one
    pub pgpkey: Option<String>,
}

/// Client application details published on its `client_id` page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct App {
    /// Display name, falling back to the app url
    pub name: String,
    /// Declared url of the app
    pub url: String,
    /// Redirect URIs declared with `rel="redirect_uri"`
    pub redirect_uris: Vec<String>,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collect every `<link rel>` and `<a rel>` in document order
#[must_use]
pub fn rel_links(html: &str, base: &Url) -> Vec<RelLink> {
    let document = Html::parse_document(html);
    let Some(rel_selector) = selector("link[rel][href], a[rel][href]") else {
        return Vec::new();
    };

    document
        .select(&rel_selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let rel = element.value().attr("rel")?;
            let href = base.join(href.trim()).ok()?;
            Some(RelLink {
                href: href.into(),
                rels: rel.split_whitespace().map(str::to_lowercase).collect(),
            })
        })
        .collect()
}

/// Targets of every `rel="me"` link, in document order
#[must_use]
pub fn rel_me_links(html: &str, base: &Url) -> Vec<String> {
    rel_links(html, base)
        .into_iter()
        .filter(|link| link.has("me"))
        .map(|link| link.href)
        .collect()
}

/// Identity links for authentication
///
/// Links marked `rel="me authn"` take precedence; when there are none every
/// `rel="me"` link is a candidate. The pgpkey link follows the same tiering:
/// with authn links present only an `authn pgpkey` link counts.
#[must_use]
pub fn auth_links(html: &str, base: &Url) -> AuthLinks {
    let rels = rel_links(html, base);
    let has_authn = rels.iter().any(|link| link.has("me") && link.has("authn"));

    let links = rels
        .iter()
        .filter(|link| link.has("me") && (!has_authn || link.has("authn")))
        .map(|link| link.href.clone())
        .collect();

    let pgpkey = rels
        .iter()
        .find(|link| link.has("pgpkey") && (!has_authn || link.has("authn")))
        .map(|link| link.href.clone());

    AuthLinks { links, pgpkey }
}

/// Parse the first `h-app` or `h-x-app` item, returning `None` when the page has none
///
/// Redirect URIs are collected from the whole document even when no app item exists,
/// so callers always get them through [`redirect_uris`].
#[must_use]
pub fn parse_app(html: &str, base: &Url) -> Option<App> {
    let document = Html::parse_document(html);
    let app_selector = selector(".h-app, .h-x-app")?;
    let item = document.select(&app_selector).next()?;

    let url = selector(".u-url")
        .and_then(|s| item.select(&s).next())
        .and_then(|el| el.value().attr("href").or_else(|| el.value().attr("src")))
        .and_then(|href| base.join(href).ok())
        .map(String::from)
        .unwrap_or_default();

    let name = selector(".p-name")
        .and_then(|s| item.select(&s).next())
        .map_or_else(|| implied_name(item), text_of);

    Some(App {
        name: if name.is_empty() { url.clone() } else { name },
        url,
        redirect_uris: redirect_uris(html, base),
    })
}

/// Targets of every `rel="redirect_uri"` link in the document
#[must_use]
pub fn redirect_uris(html: &str, base: &Url) -> Vec<String> {
    rel_links(html, base)
        .into_iter()
        .filter(|link| link.has("redirect_uri"))
        .map(|link| link.href)
        .collect()
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn implied_name(item: ElementRef<'_>) -> String {
    if let Some(alt) = item.value().attr("alt") {
        return alt.trim().to_owned();
    }
    text_of(item)
}

/// Targets of `Link` header entries carrying the given relation
///
/// Handles several comma separated entries per header and relative targets.
#[must_use]
pub fn link_header_targets<'a>(
    headers: impl IntoIterator<Item = &'a str>,
    rel: &str,
    base: &Url,
) -> Vec<String> {
    let mut targets = Vec::new();

    for header in headers {
        let mut rest = header;
        while let Some(start) = rest.find('<') {
            let Some(len) = rest[start..].find('>') else {
                break;
            };
            let target = &rest[start + 1..start + len];
            let after = &rest[start + len + 1..];
            let params_end = after.find('<').unwrap_or(after.len());
            let params = &after[..params_end];

            if link_params_have_rel(params, rel) {
                if let Ok(url) = base.join(target.trim()) {
                    targets.push(url.into());
                }
            }
            rest = &after[params_end..];
        }
    }

    targets
}

fn link_params_have_rel(params: &str, rel: &str) -> bool {
    params.split(';').any(|param| {
        let Some((key, value)) = param.split_once('=') else {
            return false;
        };
        key.trim().eq_ignore_ascii_case("rel")
            && value
                .trim()
                .trim_end_matches(',')
                .trim_matches('"')
                .split_whitespace()
                .any(|v| v.eq_ignore_ascii_case(rel))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://me.example/").unwrap()
    }

    #[test]
    fn test_rel_me_links_in_document_order() {
        let html = r#"<html><head><link rel="me" href="https://a.example/"></head>
            <body><a rel="me" href="https://example.com/a">a</a>
            <div><a rel="what me ok" href="https://example.com/b">b</a></div>
            <a rel="nofollow" href="https://example.com/c">c</a></body></html>"#;

        assert_eq!(
            rel_me_links(html, &base()),
            vec![
                "https://a.example/".to_owned(),
                "https://example.com/a".to_owned(),
                "https://example.com/b".to_owned(),
            ]
        );
    }

    #[test]
    fn test_authn_links_take_precedence() {
        let html = r#"<a rel="me authn" href="https://good.example/">g</a>
            <a rel="me" href="https://bad.example/">b</a>
            <link rel="pgpkey" href="/key">"#;

        let found = auth_links(html, &base());
        assert_eq!(found.links, vec!["https://good.example/".to_owned()]);
        assert_eq!(found.pgpkey, None);
    }

    #[test]
    fn test_authn_pgpkey() {
        let html = r#"<a rel="authn me" href="https://good.example/">g</a>
            <a rel="authn pgpkey" href="http://example.com/key">k</a>"#;

        let found = auth_links(html, &base());
        assert_eq!(found.pgpkey.as_deref(), Some("http://example.com/key"));
    }

    #[test]
    fn test_fallback_to_all_me_links_with_relative_pgpkey() {
        let html = r#"<a rel="me" href="https://good.example/">g</a>
            <a rel="me" href="http://localhost/unknown">u</a>
            <link rel="pgpkey" href="my-key">"#;

        let found = auth_links(html, &Url::parse("https://me.example/dir/").unwrap());
        assert_eq!(found.links.len(), 2);
        assert_eq!(found.pgpkey.as_deref(), Some("https://me.example/dir/my-key"));
    }

    #[test]
    fn test_parse_app_name_and_redirects() {
        let html = r#"<link rel="redirect_uri" href="/callback">
            <div class="h-app"><a class="u-url p-name" href="/">Example  App</a></div>"#;
        let app = parse_app(html, &Url::parse("https://app.example/").unwrap()).unwrap();

        assert_eq!(app.name, "Example App");
        assert_eq!(app.url, "https://app.example/");
        assert_eq!(app.redirect_uris, vec!["https://app.example/callback".to_owned()]);
    }

    #[test]
    fn test_parse_app_missing() {
        assert!(parse_app("<p>hi</p>", &base()).is_none());
    }

    #[test]
    fn test_link_header_targets() {
        let base = Url::parse("https://app.example/").unwrap();
        let headers = [r#"<https://app.example/cb>; rel="redirect_uri", </other>; rel="me""#];

        assert_eq!(
            link_header_targets(headers, "redirect_uri", &base),
            vec!["https://app.example/cb".to_owned()]
        );
        assert_eq!(
            link_header_targets(headers, "me", &base),
            vec!["https://app.example/other".to_owned()]
        );
    }
}
