//! Shared fixtures: one site at `h/site` over a scripted transport.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use plonefs_kernel::testing::MockTransport;
use plonefs_kernel::{
    Credentials, HttpResponse, PloneFs, RemoteUri, SiteFeatures, StaticCredentials,
};

pub const LISTING: &str = "tinymce-jsonlinkablefolderlisting";

/// Host URI of a site path.
pub fn uri(path: &str) -> String {
    format!("plone://h{path}")
}

pub fn remote(path: &str) -> RemoteUri {
    RemoteUri::new("h", path)
}

pub fn setup() -> (PloneFs, Arc<MockTransport>) {
    setup_with(SiteFeatures::default())
}

pub fn setup_with(features: SiteFeatures) -> (PloneFs, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::new());
    let fs = PloneFs::new(Duration::from_millis(5));
    fs.register(
        remote("/site"),
        features,
        mock.clone(),
        Arc::new(StaticCredentials(Credentials::new("editor", "secret"))),
    );
    (fs, mock)
}

/// `POST {folder}/tinymce-jsonlinkablefolderlisting` route key.
pub fn listing_key(folder: &str) -> String {
    format!("POST {folder}/{LISTING}")
}

/// Listing of `(id, normalized_type)` items, all in the `internal` state.
pub fn listing(items: &[(&str, &str)]) -> HttpResponse {
    let items: Vec<(&str, &str, &str)> = items.iter().map(|(id, t)| (*id, *t, "internal")).collect();
    listing_with_states(&items)
}

/// Listing of `(id, normalized_type, review_state)` items.
pub fn listing_with_states(items: &[(&str, &str, &str)]) -> HttpResponse {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|(id, normalized_type, state)| {
            serde_json::json!({
                "id": id,
                "title": format!("Title of {id}"),
                "description": "",
                "url": format!("https://h/site/{id}"),
                "review_state": state,
                "normalized_type": normalized_type,
                "uid": format!("uid-{id}"),
            })
        })
        .collect();
    let body = serde_json::json!({ "items": items, "path": [] });
    HttpResponse::ok(body.to_string())
}

/// External-edit payload of a page.
pub fn page_payload(title: &str, text: &str) -> Vec<u8> {
    let mut payload = b"url:https://h/site/page\nmeta_type:ATDocument\n\n".to_vec();
    payload.extend_from_slice(format!("title: {title}\r\n").as_bytes());
    payload.extend_from_slice(b"description: \r\n");
    payload.extend_from_slice(b"\r\n");
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// Field value of a URL-encoded request body.
pub fn field(fields: &[(String, String)], name: &str) -> Option<String> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}
