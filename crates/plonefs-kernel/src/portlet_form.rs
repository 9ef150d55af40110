//! Portlet HTML scraping.
//!
//! The CMS has no data endpoint for portlets, only the management and edit
//! pages. Everything the engine needs from that markup comes through the
//! functions here, so no other module depends on page structure.

use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{FsError, FsResult};

static EDIT_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<form\b[^>]*kssattr-formname-edit[^>]*>(.*?)</form>"#).expect("valid regex")
});
static TEXTAREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<textarea\b[^>]*>(.*?)</textarea>").expect("valid regex")
});
static INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<input\b([^>]*?)/?>").expect("valid regex"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-\w.:]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'))?"#).expect("valid regex")
});
static HEADER_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a\s+href="([^"]+?)/edit(?:\?[^"]*)?"\s*>(.*?)</a>"#).expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Text portlet edit form: body text plus every other field to round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortletForm {
    pub content: String,
    pub fields: IndexMap<String, String>,
}

/// Portlet listed on the management page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortletLink {
    pub name: String,
    pub title: String,
}

/// Scrape a portlet's edit page.
///
/// Keeps every named input except the header (sent separately), submit
/// buttons, and unchecked checkboxes. Fails for portlets without a text area.
pub fn parse_edit_form(html: &str) -> FsResult<PortletForm> {
    let form = EDIT_FORM
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FsError::unavailable("portlet edit form not found"))?
        .as_str();

    let content = TEXTAREA
        .captures(form)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FsError::unavailable("not a text portlet"))?
        .as_str();

    let mut fields = IndexMap::new();
    for input in INPUT.captures_iter(form) {
        let attributes = parse_attributes(input.get(1).map_or("", |m| m.as_str()));
        let Some(name) = attributes.get("name").and_then(|v| v.clone()) else {
            continue;
        };
        let kind = attributes
            .get("type")
            .and_then(|v| v.as_deref())
            .unwrap_or("text")
            .to_ascii_lowercase();
        if name == "form.header" || kind == "submit" {
            continue;
        }
        if kind == "checkbox" && !attributes.contains_key("checked") {
            continue;
        }
        let value = attributes
            .get("value")
            .and_then(|v| v.as_deref())
            .map(unescape_html)
            .unwrap_or_default();
        fields.insert(name, value);
    }

    Ok(PortletForm {
        content: unescape_html(content),
        fields,
    })
}

/// Portlets of one manager on the `@@manage-portlets` page.
///
/// `dom_id` is the manager's element id suffix, e.g. `plone-rightcolumn`.
pub fn parse_manager_listing(html: &str, dom_id: &str) -> Vec<PortletLink> {
    let marker = format!("id=\"portletmanager-{dom_id}\"");
    let Some(start) = html.find(&marker) else {
        return Vec::new();
    };
    let block = &html[start + marker.len()..];
    let block = block
        .find("id=\"portletmanager-")
        .map_or(block, |end| &block[..end]);

    HEADER_LINK
        .captures_iter(block)
        .filter_map(|captures| {
            let href = captures.get(1)?.as_str();
            let name = href.rsplit('/').next()?.to_string();
            if name.is_empty() {
                return None;
            }
            let title = captures.get(2).map_or("", |m| m.as_str());
            let title = unescape_html(TAG.replace_all(title, "").trim());
            Some(PortletLink { name, title })
        })
        .collect()
}

/// `_authenticator` CSRF token from any CMS form page.
pub fn authenticator_token(html: &str) -> Option<String> {
    for input in INPUT.captures_iter(html) {
        let attributes = parse_attributes(input.get(1).map_or("", |m| m.as_str()));
        if attributes.get("name").and_then(|v| v.as_deref()) == Some("_authenticator") {
            return attributes.get("value").and_then(|v| v.clone());
        }
    }
    None
}

fn parse_attributes(source: &str) -> HashMap<String, Option<String>> {
    ATTRIBUTE
        .captures_iter(source)
        .filter_map(|c| {
            let name = c.get(1)?.as_str().to_ascii_lowercase();
            let value = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str().to_string());
            Some((name, value))
        })
        .collect()
}

/// Decode the handful of entities the CMS emits in form markup.
pub fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDIT_PAGE: &str = r#"<html><body>
<form class="edit-form enableUnloadProtection kssattr-formname-edit" action="edit" method="post">
  <input type="hidden" name="_authenticator" value="tok123" />
  <input type="text" name="form.header" value="Contact" />
  <textarea name="form.text" rows="25">&lt;p&gt;Call us &amp; visit&lt;/p&gt;</textarea>
  <input type="checkbox" name="form.omit_border" value="on" />
  <input type="checkbox" name="form.hide" value="on" checked="checked" />
  <input type="text" name="form.footer" value="" />
  <input type="submit" name="form.actions.save" value="Save" />
</form>
</body></html>"#;

    #[test]
    fn test_parse_edit_form() {
        let form = parse_edit_form(EDIT_PAGE).unwrap();
        assert_eq!(form.content, "<p>Call us & visit</p>");
        let names: Vec<&str> = form.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["_authenticator", "form.hide", "form.footer"]);
        assert_eq!(form.fields["_authenticator"], "tok123");
        assert_eq!(form.fields["form.hide"], "on");
    }

    #[test]
    fn test_non_text_portlet_is_rejected() {
        let html = r#"<form class="kssattr-formname-edit"><input name="x" value="1"></form>"#;
        assert_eq!(
            parse_edit_form(html).unwrap_err(),
            FsError::unavailable("not a text portlet")
        );
    }

    #[test]
    fn test_parse_manager_listing() {
        let html = r#"
<div id="portletmanager-plone-leftcolumn">
  <div class="portletHeader"><div><a href="https://h/site/++contextportlets++plone.leftcolumn/nav/edit">Navigation</a></div></div>
</div>
<div id="portletmanager-plone-rightcolumn">
  <div class="portletHeader">
    <div><a class="up" href="https://h/site/++contextportlets++plone.rightcolumn/contact/edit">Up</a></div>
    <div><a href="https://h/site/++contextportlets++plone.rightcolumn/contact/edit">Contact <b>us</b></a></div>
  </div>
  <div class="portletHeader"><div><a href="https://h/site/++contextportlets++plone.rightcolumn/hours/edit?referer=x">Hours &amp; Map</a></div></div>
</div>"#;
        let links = parse_manager_listing(html, "plone-rightcolumn");
        assert_eq!(
            links,
            vec![
                PortletLink {
                    name: "contact".into(),
                    title: "Contact us".into()
                },
                PortletLink {
                    name: "hours".into(),
                    title: "Hours & Map".into()
                },
            ]
        );
        assert!(parse_manager_listing(html, "uofl-heromanager").is_empty());
    }

    #[test]
    fn test_authenticator_token() {
        assert_eq!(authenticator_token(EDIT_PAGE).as_deref(), Some("tok123"));
        assert_eq!(authenticator_token("<p>nothing</p>"), None);
    }
}
