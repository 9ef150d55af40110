//! Publish-state transitions and the checkout / checkin lifecycle.

mod common;

use plonefs_kernel::{
    ChangeEvent, EntryKind, FsError, FsOps, HttpResponse, WorkflowAction, WorkflowState,
};

use common::*;

const PUBLISH: &str = "GET /site/page/content_status_modify?workflow_action=publish_externally";

#[tokio::test]
async fn test_legal_transition_moves_state() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));
    mock.respond(PUBLISH, HttpResponse::redirect("https://h/site/page"));
    let mut events = fs.subscribe();

    let state = fs
        .change_state(&uri("/site/page"), WorkflowAction::PublishExternally)
        .await
        .unwrap();
    assert_eq!(state, WorkflowState::External);
    assert_eq!(mock.count(PUBLISH), 1);
    assert_eq!(
        fs.workflow_state(&uri("/site/page")).await.unwrap(),
        Some(WorkflowState::External)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        vec![ChangeEvent::changed(remote("/site/page"))]
    );
}

#[tokio::test]
async fn test_illegal_transition_sends_nothing() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));

    let err = fs
        .change_state(&uri("/site/page"), WorkflowAction::Retract)
        .await
        .unwrap_err();
    assert_eq!(err, FsError::unavailable("cannot retract from state internal"));
    assert_eq!(mock.total(), 1);
}

#[tokio::test]
async fn test_rejected_transition_keeps_state() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));
    mock.respond(PUBLISH, HttpResponse::ok("<html>not allowed</html>"));

    let err = fs
        .change_state(&uri("/site/page"), WorkflowAction::PublishExternally)
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Unavailable(_)));
    assert_eq!(
        fs.workflow_state(&uri("/site/page")).await.unwrap(),
        Some(WorkflowState::Internal)
    );
}

#[tokio::test]
async fn test_unknown_state_and_folders() {
    let (fs, mock) = setup();
    mock.respond(
        &listing_key("/site"),
        listing_with_states(&[("page", "document", "false"), ("docs", "folder", "internal")]),
    );

    let err = fs
        .change_state(&uri("/site/page"), WorkflowAction::Show)
        .await
        .unwrap_err();
    assert_eq!(err, FsError::unavailable("cannot show: workflow state is unknown"));

    let err = fs
        .change_state(&uri("/site/docs"), WorkflowAction::Hide)
        .await
        .unwrap_err();
    assert_eq!(err, FsError::unavailable("/site/docs has no workflow state"));
    assert_eq!(fs.workflow_state(&uri("/site/docs")).await.unwrap(), None);
}

#[tokio::test]
async fn test_check_out_creates_working_copy() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("page", "document")]));
    mock.respond(
        "GET /site/page/@@content-checkout",
        HttpResponse::redirect("https://h/site/copy_of_page"),
    );
    let mut events = fs.subscribe();

    let working = fs.check_out(&uri("/site/page")).await.unwrap();
    assert_eq!(working.uri(), &remote("/site/copy_of_page"));
    assert_eq!(working.kind(), EntryKind::Page);

    let stat = fs.stat(&uri("/site/copy_of_page")).await.unwrap();
    assert_eq!(stat.title, "Title of page");
    assert!(stat.exists);
    assert_eq!(fs.workflow_state(&uri("/site/copy_of_page")).await.unwrap(), None);
    assert_eq!(
        events.recv().await.unwrap(),
        vec![ChangeEvent::created(remote("/site/copy_of_page"))]
    );
}

#[tokio::test]
async fn test_check_out_needs_a_page() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("news", "news-item"), ("docs", "folder")]));

    let err = fs.check_out(&uri("/site/news")).await.unwrap_err();
    assert!(matches!(err, FsError::Unavailable(_)));
    assert!(!fs.can_check_out(&uri("/site/news")).await.unwrap());
    assert!(!fs.can_check_out(&uri("/site/docs")).await.unwrap());
    assert_eq!(mock.total(), 1);
}

#[tokio::test]
async fn test_can_check_in_only_working_copies() {
    let (fs, mock) = setup();
    mock.respond(
        &listing_key("/site"),
        listing(&[("page", "document"), ("copy_of_page", "document")]),
    );
    mock.respond(
        "GET /site/copy_of_page/@@iterate_control/checkin_allowed",
        HttpResponse::ok("True"),
    );
    mock.respond(
        "GET /site/page/@@iterate_control/checkout_allowed",
        HttpResponse::ok("False"),
    );

    assert!(fs.can_check_in(&uri("/site/copy_of_page")).await.unwrap());
    assert!(!fs.can_check_in(&uri("/site/page")).await.unwrap());
    assert!(!fs.can_check_out(&uri("/site/page")).await.unwrap());
    assert_eq!(
        mock.count("GET /site/page/@@iterate_control/checkin_allowed"),
        0
    );
}

#[tokio::test]
async fn test_check_in_reloads_original_and_drops_working_copy() {
    let (fs, mock) = setup();
    mock.respond(
        &listing_key("/site"),
        listing(&[("page", "document"), ("copy_of_page", "document")]),
    );
    mock.respond(
        "POST /site/copy_of_page/@@content-checkin",
        HttpResponse::redirect("https://h/site/page"),
    );
    mock.respond_seq(
        "GET /site/externalEdit_/page",
        vec![
            HttpResponse::ok(page_payload("Page", "before")),
            HttpResponse::ok(page_payload("Page", "after")),
        ],
    );

    assert_eq!(fs.read_file(&uri("/site/page")).await.unwrap(), b"before");
    let mut events = fs.subscribe();

    let original = fs
        .check_in(&uri("/site/copy_of_page"), "fixed typos")
        .await
        .unwrap();
    assert_eq!(original, remote("/site/page"));

    let fields = mock.requests_for("POST /site/copy_of_page/@@content-checkin")[0].form_fields();
    assert_eq!(field(&fields, "checkin_message").as_deref(), Some("fixed typos"));

    assert!(fs.find_entry(&uri("/site/copy_of_page")).await.unwrap().is_none());
    assert_eq!(fs.read_file(&uri("/site/page")).await.unwrap(), b"after");
    assert_eq!(
        events.recv().await.unwrap(),
        vec![
            ChangeEvent::deleted(remote("/site/copy_of_page")),
            ChangeEvent::changed(remote("/site/page")),
        ]
    );
}

#[tokio::test]
async fn test_check_in_succeeds_when_reload_fails() {
    let (fs, mock) = setup();
    mock.respond(
        &listing_key("/site"),
        listing(&[("page", "document"), ("copy_of_page", "document")]),
    );
    mock.respond(
        "POST /site/copy_of_page/@@content-checkin",
        HttpResponse::redirect("https://h/site/page"),
    );
    mock.respond_seq(
        "GET /site/externalEdit_/page",
        vec![
            HttpResponse::ok(page_payload("Page", "before")),
            HttpResponse::new(500),
        ],
    );

    assert_eq!(fs.read_file(&uri("/site/page")).await.unwrap(), b"before");
    let mut events = fs.subscribe();

    let original = fs
        .check_in(&uri("/site/copy_of_page"), "")
        .await
        .unwrap();
    assert_eq!(original, remote("/site/page"));
    assert_eq!(mock.count("POST /site/copy_of_page/@@content-checkin"), 1);
    assert_eq!(mock.count("GET /site/externalEdit_/page"), 2);
    assert!(fs.find_entry(&uri("/site/copy_of_page")).await.unwrap().is_none());
    assert_eq!(
        events.recv().await.unwrap(),
        vec![
            ChangeEvent::deleted(remote("/site/copy_of_page")),
            ChangeEvent::changed(remote("/site/page")),
        ]
    );
}

#[tokio::test]
async fn test_cancel_check_out() {
    let (fs, mock) = setup();
    mock.respond(
        &listing_key("/site"),
        listing(&[("page", "document"), ("copy_of_page", "document")]),
    );
    mock.respond(
        "POST /site/copy_of_page/@@content-cancel-checkout",
        HttpResponse::redirect("https://h/site/page"),
    );
    let mut events = fs.subscribe();

    fs.cancel_check_out(&uri("/site/copy_of_page")).await.unwrap();
    assert!(fs.find_entry(&uri("/site/copy_of_page")).await.unwrap().is_none());
    assert!(fs.find_entry(&uri("/site/page")).await.unwrap().is_some());
    assert_eq!(
        events.recv().await.unwrap(),
        vec![ChangeEvent::deleted(remote("/site/copy_of_page"))]
    );
}

#[tokio::test]
async fn test_failed_cancel_keeps_working_copy() {
    let (fs, mock) = setup();
    mock.respond(&listing_key("/site"), listing(&[("copy_of_page", "document")]));
    mock.respond(
        "POST /site/copy_of_page/@@content-cancel-checkout",
        HttpResponse::new(500),
    );

    assert!(fs.cancel_check_out(&uri("/site/copy_of_page")).await.is_err());
    assert!(fs.find_entry(&uri("/site/copy_of_page")).await.unwrap().is_some());
}
