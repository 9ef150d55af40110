//! # plonefs-kernel
//!
//! Remote virtual filesystem engine for Plone sites.
//!
//! A Plone site is only reachable through endpoints built for its web UI.
//! This crate presents it as a filesystem anyway:
//! - Each registered site owns a session (cookie jar, re-login on expiry)
//!   and a lazily loaded tree of entries
//! - Paths resolve through that tree, including virtual segments for
//!   portlet managers and the `?localCss` stylesheet marker
//! - Filesystem verbs become sequences of form posts, clipboard transfers
//!   and workflow calls
//! - Confirmed mutations are published as debounced change batches

pub mod config;
pub mod entry;
pub mod error;
pub mod external_edit;
pub mod fs;
pub mod naming;
pub mod notify;
pub mod ops;
pub mod portlet_form;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod single_flight;
pub mod types;
pub mod workflow;

#[cfg(any(test, feature = "test-mock"))]
pub mod testing;

pub use config::{Config, ConfigError, SiteConfig};
pub use entry::{
    Document, Download, Entry, File, Folder, HasLocalCss, HasPortlets, HasWorkflowState,
    LocalCss, Portlet, PortletManager, PortletSide, SiteFeatures,
};
pub use error::{FsError, FsResult};
pub use external_edit::{ExternalEdit, ParseError, Settings};
pub use fs::PloneFs;
pub use notify::ChangeNotifier;
pub use ops::FsOps;
pub use registry::{Site, SiteRegistry};
pub use session::{
    Authenticator, CookieJar, Credentials, HttpResponse, HttpTransport, Session,
    StaticCredentials, Transport,
};
pub use types::{
    ChangeEvent, ChangeKind, DirEntry, EntryKind, FileStat, FileType, RemoteUri, RenameOptions,
    WriteOptions,
};
pub use workflow::{WorkflowAction, WorkflowState};
