//! Data models
//!
//! Typed records for everything the site keeps in the hosted data store:
//! - Blog posts, projects and contact requests
//! - Form drafts used to create and edit them
//! - Sessions and admin users issued by the store

mod blog_post;
mod contact_request;
mod project;
mod record;
mod session;

pub use blog_post::{generate_slug, BlogDraft, BlogPost};
pub use contact_request::{ContactRequest, ContactStatus, NewContactRequest};
pub use project::{Project, ProjectDraft};
pub use record::{
    sort_newest_first, AssetPolicy, Draft, Record, RecordError, RecordId, ValidationError,
};
pub use session::{AdminUser, Session};

#[cfg(test)]
pub(crate) use session::encode_test_token;
