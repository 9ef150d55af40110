//! Saves, creation, rename and the change notifications they emit.

mod common;

use std::time::Duration;

use plonefs_kernel::{
    ChangeEvent, EntryKind, FsError, FsOps, HttpResponse, RenameOptions, WriteOptions,
};

use common::*;

const FACTORY_EDIT: &str = "https://h/site/portal_factory/Document/document.1/edit";

#[tokio::test]
async fn test_update_existing_page_uses_quick_save() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));
    mock.respond("POST /site/page/tinymce-save", HttpResponse::ok("saved"));
    let mut events = fs.subscribe();

    fs.write_file(&uri("/site/page"), b"<p>new</p>", WriteOptions::update())
        .await
        .unwrap();

    let requests = mock.requests_for("POST /site/page/tinymce-save");
    assert_eq!(requests.len(), 1);
    let fields = requests[0].form_fields();
    assert_eq!(field(&fields, "fieldname").as_deref(), Some("text"));
    assert_eq!(field(&fields, "text").as_deref(), Some("<p>new</p>"));
    assert_eq!(mock.count("POST /site/page/atct_edit"), 0);

    assert_eq!(fs.read_file(&uri("/site/page")).await.unwrap(), b"<p>new</p>");
    assert_eq!(
        events.recv().await.unwrap(),
        vec![ChangeEvent::changed(remote("/site/page"))]
    );
}

#[tokio::test]
async fn test_unconfirmed_quick_save_fails_and_keeps_state() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));
    mock.respond(
        "GET /site/externalEdit_/page",
        HttpResponse::ok(page_payload("Page", "old")),
    );
    mock.respond("POST /site/page/tinymce-save", HttpResponse::ok("<html>error</html>"));

    assert_eq!(fs.read_file(&uri("/site/page")).await.unwrap(), b"old");
    let err = fs
        .write_file(&uri("/site/page"), b"new", WriteOptions::update())
        .await
        .unwrap_err();
    assert_eq!(err, FsError::unavailable("save /site/page: not confirmed"));
    assert_eq!(fs.read_file(&uri("/site/page")).await.unwrap(), b"old");
}

#[tokio::test]
async fn test_create_page_without_extension() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[]));
    mock.respond(
        "GET /site/createObject?type_name=Document",
        HttpResponse::redirect(FACTORY_EDIT),
    );
    mock.respond(
        "POST /site/portal_factory/Document/document.1/atct_edit",
        HttpResponse::redirect("https://h/site/about"),
    );
    let mut events = fs.subscribe();

    fs.write_file(&uri("/site/about"), b"<p>About</p>", WriteOptions::create_new())
        .await
        .unwrap();

    let save = &mock.requests_for("POST /site/portal_factory/Document/document.1/atct_edit")[0];
    let fields = save.form_fields();
    assert_eq!(field(&fields, "id").as_deref(), Some("about"));
    assert_eq!(field(&fields, "title").as_deref(), Some("about"));
    assert_eq!(field(&fields, "form.submitted").as_deref(), Some("1"));
    assert_eq!(field(&fields, "text").as_deref(), Some("<p>About</p>"));

    let stat = fs.stat(&uri("/site/about")).await.unwrap();
    assert_eq!(stat.kind, EntryKind::Page);
    assert!(stat.exists);

    assert_eq!(
        events.recv().await.unwrap(),
        vec![
            ChangeEvent::created(remote("/site/about")),
            ChangeEvent::changed(remote("/site/about")),
        ]
    );
}

#[tokio::test]
async fn test_create_page_keeps_non_utf8_bytes() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[]));
    mock.respond(
        "GET /site/createObject?type_name=Document",
        HttpResponse::redirect(FACTORY_EDIT),
    );
    mock.respond(
        "POST /site/portal_factory/Document/document.1/atct_edit",
        HttpResponse::redirect("https://h/site/newpage"),
    );
    let content = b"<p>caf\xe9</p>";

    fs.write_file(&uri("/site/newpage"), content, WriteOptions::create_new())
        .await
        .unwrap();

    let save = &mock.requests_for("POST /site/portal_factory/Document/document.1/atct_edit")[0];
    assert!(save
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    let body = save.body.as_deref().unwrap();
    let sent = body.windows(content.len()).any(|w| w == content);
    assert!(sent, "raw bytes missing from the upload");
    assert!(!body.windows(3).any(|w| w == "\u{FFFD}".as_bytes()));
    assert_eq!(fs.read_file(&uri("/site/newpage")).await.unwrap(), content);
}

#[tokio::test]
async fn test_create_file_with_extension_uploads_multipart() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[]));
    mock.respond(
        "GET /site/createObject?type_name=File",
        HttpResponse::redirect("https://h/site/portal_factory/File/file.1/edit"),
    );
    mock.respond(
        "POST /site/portal_factory/File/file.1/atct_edit",
        HttpResponse::redirect("https://h/site/style.css"),
    );

    fs.write_file(&uri("/site/style.css"), b"body {}", WriteOptions::create_new())
        .await
        .unwrap();

    let save = &mock.requests_for("POST /site/portal_factory/File/file.1/atct_edit")[0];
    assert!(save
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    let body = String::from_utf8_lossy(save.body.as_deref().unwrap()).to_string();
    assert!(body.contains(r#"name="file_file"; filename="style.css""#));
    assert!(body.contains("body {}"));
    assert_eq!(fs.stat(&uri("/site/style.css")).await.unwrap().kind, EntryKind::File);
}

#[tokio::test]
async fn test_failed_create_leaves_tree_untouched() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[]));
    mock.respond(
        "GET /site/createObject?type_name=Document",
        HttpResponse::new(500),
    );

    let err = fs
        .write_file(&uri("/site/about"), b"x", WriteOptions::create_new())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Unavailable(_)));
    assert!(fs.find_entry(&uri("/site/about")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_flag_checks() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document"), ("docs", "folder")]));

    let err = fs
        .write_file(&uri("/site/missing"), b"x", WriteOptions::update())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));

    let err = fs
        .write_file(&uri("/site/page"), b"x", WriteOptions::create_new())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));

    let err = fs
        .write_file(&uri("/site/docs"), b"x", WriteOptions::create_or_replace())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::IsADirectory(_)));

    // Only the listing was fetched.
    assert_eq!(mock.total(), 1);
}

#[tokio::test]
async fn test_rename_and_edit_is_one_full_save() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));
    mock.respond(
        "POST /site/page/atct_edit",
        HttpResponse::redirect("https://h/site/renamed"),
    );

    let entry = fs.get_entry(&uri("/site/page")).await.unwrap();
    let renamed = entry
        .save(Some(b"<p>edited</p>".to_vec()), Some("renamed"))
        .await
        .unwrap();

    assert_eq!(mock.count("POST /site/page/atct_edit"), 1);
    assert_eq!(mock.count("POST /site/page/tinymce-save"), 0);
    let fields = mock.requests_for("POST /site/page/atct_edit")[0].form_fields();
    assert_eq!(field(&fields, "id").as_deref(), Some("renamed"));
    assert_eq!(field(&fields, "text").as_deref(), Some("<p>edited</p>"));

    assert_eq!(renamed.uri(), &remote("/site/renamed"));
    assert_eq!(renamed.name(), "renamed");
    assert_eq!(renamed.read().await.unwrap(), b"<p>edited</p>");
    // The old handle keeps its identity.
    assert_eq!(entry.uri(), &remote("/site/page"));
}

#[tokio::test]
async fn test_rename_within_folder() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("old-name", "folder")]));
    mock.respond(
        "POST /site/old-name/atct_edit",
        HttpResponse::redirect("https://h/site/new-name"),
    );
    let mut events = fs.subscribe();

    fs.rename(&uri("/site/old-name"), &uri("/site/new-name"), RenameOptions::default())
        .await
        .unwrap();

    let fields = mock.requests_for("POST /site/old-name/atct_edit")[0].form_fields();
    assert_eq!(field(&fields, "id").as_deref(), Some("new-name"));
    assert_eq!(field(&fields, "title").as_deref(), Some("Title of old-name"));

    assert!(fs.find_entry(&uri("/site/old-name")).await.unwrap().is_none());
    assert_eq!(
        fs.stat(&uri("/site/new-name")).await.unwrap().kind,
        EntryKind::Folder
    );
    assert_eq!(
        events.recv().await.unwrap(),
        vec![
            ChangeEvent::deleted(remote("/site/old-name")),
            ChangeEvent::created(remote("/site/new-name")),
        ]
    );
}

#[tokio::test]
async fn test_rename_onto_existing_name() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("a", "document"), ("b", "document")]));

    let err = fs
        .rename(&uri("/site/a"), &uri("/site/b"), RenameOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, FsError::already_exists("/site/b"));

    let err = fs
        .rename(&uri("/site/a"), &uri("/site/b"), RenameOptions { overwrite: true })
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Unavailable(_)));
    assert_eq!(mock.total(), 1);
}

#[tokio::test]
async fn test_create_directory() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[]));
    mock.respond(
        "GET /site/createObject?type_name=Folder",
        HttpResponse::redirect("https://h/site/portal_factory/Folder/folder.1/edit"),
    );
    mock.respond(
        "POST /site/portal_factory/Folder/folder.1/atct_edit",
        HttpResponse::redirect("https://h/site/reports"),
    );
    let mut events = fs.subscribe();

    fs.create_directory(&uri("/site/reports")).await.unwrap();
    assert!(fs.stat(&uri("/site/reports")).await.unwrap().exists);
    assert_eq!(
        events.recv().await.unwrap(),
        vec![
            ChangeEvent::changed(remote("/site")),
            ChangeEvent::created(remote("/site/reports")),
        ]
    );

    let err = fs.create_directory(&uri("/site/reports")).await.unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_delete_is_unsupported() {
    let (fs, mock) = setup();
    let err = fs.delete(&uri("/site/page")).await.unwrap_err();
    assert_eq!(err, FsError::unavailable("delete is not supported"));
    assert_eq!(mock.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_writes_is_one_notification() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("a", "document"), ("b", "document")]));
    mock.respond("POST /site/a/tinymce-save", HttpResponse::ok("saved"));
    mock.respond("POST /site/b/tinymce-save", HttpResponse::ok("saved"));
    let mut events = fs.subscribe();

    fs.write_file(&uri("/site/a"), b"1", WriteOptions::update()).await.unwrap();
    fs.write_file(&uri("/site/b"), b"2", WriteOptions::update()).await.unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        batch,
        vec![
            ChangeEvent::changed(remote("/site/a")),
            ChangeEvent::changed(remote("/site/b")),
        ]
    );
}
