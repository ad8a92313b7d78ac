//! Services layer - Business logic
//!
//! This module contains the admin workflow and the public-facing services:
//! - Session guard, record synchronizers, asset manager and form controllers
//! - Admin workspaces that tie those together per session
//! - Public content reads and the contact notification flow

pub mod assets;
pub mod contact;
pub mod content;
pub mod email;
pub mod form;
pub mod session_guard;
pub mod synchronizer;
pub mod workspace;

pub use assets::{AssetError, AssetManager, ImageUpload};
pub use contact::{ContactError, ContactService};
pub use content::ContentService;
pub use email::{contact_notification, MailError, Mailer, MemoryMailer, OutgoingMail, SmtpMailer};
pub use form::{FormController, FormError, FormSnapshot, FormState};
pub use session_guard::{GuardState, Navigator, RedirectSlot, SessionGuard};
pub use synchronizer::{ImageChange, MountFlag, RecordSynchronizer, SyncError};
pub use workspace::{AdminWorkspace, Editable, WorkspaceRegistry};
