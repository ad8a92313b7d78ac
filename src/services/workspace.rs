//! Admin workspaces
//!
//! A workspace is what a signed-in admin works in: one synchronizer per table
//! and one form per editable entity. It is mounted when the session first
//! reaches the admin area and unmounted on sign-out or when it has been idle
//! long enough for the registry to evict it. Results that arrive after unmount
//! are discarded.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::assets::AssetManager;
use super::form::FormController;
use super::synchronizer::{MountFlag, RecordSynchronizer};
use crate::config::Config;
use crate::models::{
    AdminUser, BlogDraft, BlogPost, ContactRequest, Draft, Project, ProjectDraft, Record,
};
use crate::remote::RemoteStore;

/// One admin's mounted view of the content tables
pub struct AdminWorkspace {
    user: AdminUser,
    mount: MountFlag,
    pub blogs: RecordSynchronizer<BlogPost>,
    pub projects: RecordSynchronizer<Project>,
    pub contacts: RecordSynchronizer<ContactRequest>,
    pub blog_form: Mutex<FormController<BlogDraft>>,
    pub project_form: Mutex<FormController<ProjectDraft>>,
}

impl AdminWorkspace {
    pub fn new(store: Arc<dyn RemoteStore>, user: AdminUser, assets: Arc<AssetManager>) -> Self {
        let mount = MountFlag::new();
        Self {
            user,
            blogs: RecordSynchronizer::new(store.clone(), assets.clone(), mount.clone()),
            projects: RecordSynchronizer::new(store.clone(), assets.clone(), mount.clone()),
            contacts: RecordSynchronizer::new(store, assets, mount.clone()),
            blog_form: Mutex::new(FormController::new()),
            project_form: Mutex::new(FormController::new()),
            mount,
        }
    }

    pub fn user(&self) -> &AdminUser {
        &self.user
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_mounted()
    }

    /// Load every table; each failure is kept on its own synchronizer
    pub async fn mount(&self) {
        let (blogs, projects, contacts) = futures::join!(
            self.blogs.load_all(),
            self.projects.load_all(),
            self.contacts.load_all()
        );
        tracing::info!(
            user = %self.user.id,
            blogs = blogs.is_ok(),
            projects = projects.is_ok(),
            contacts = contacts.is_ok(),
            "Workspace mounted"
        );
    }

    pub fn unmount(&self) {
        if self.is_mounted() {
            self.mount.unmount();
            tracing::info!(user = %self.user.id, "Workspace unmounted");
        }
    }
}

/// An entity the admin can create and edit through a form
pub trait Editable: Record {
    type Draft: Draft<Target = Self>;

    fn synchronizer(workspace: &AdminWorkspace) -> &RecordSynchronizer<Self>;

    fn form(workspace: &AdminWorkspace) -> &Mutex<FormController<Self::Draft>>;
}

impl Editable for BlogPost {
    type Draft = BlogDraft;

    fn synchronizer(workspace: &AdminWorkspace) -> &RecordSynchronizer<Self> {
        &workspace.blogs
    }

    fn form(workspace: &AdminWorkspace) -> &Mutex<FormController<BlogDraft>> {
        &workspace.blog_form
    }
}

impl Editable for Project {
    type Draft = ProjectDraft;

    fn synchronizer(workspace: &AdminWorkspace) -> &RecordSynchronizer<Self> {
        &workspace.projects
    }

    fn form(workspace: &AdminWorkspace) -> &Mutex<FormController<ProjectDraft>> {
        &workspace.project_form
    }
}

/// Mounted workspaces keyed by access token
pub struct WorkspaceRegistry {
    store: Arc<dyn RemoteStore>,
    bucket: String,
    upload: crate::config::UploadConfig,
    workspaces: Cache<String, Arc<AdminWorkspace>>,
}

impl WorkspaceRegistry {
    pub fn new(store: Arc<dyn RemoteStore>, config: &Config) -> Self {
        let workspaces = Cache::builder()
            .max_capacity(config.workspace.max_workspaces)
            .time_to_idle(Duration::from_secs(config.workspace.idle_timeout_seconds))
            .eviction_listener(|_token, workspace: Arc<AdminWorkspace>, cause| {
                tracing::debug!(user = %workspace.user().id, ?cause, "Workspace evicted");
                workspace.unmount();
            })
            .build();

        Self {
            store,
            bucket: config.remote.storage_bucket.clone(),
            upload: config.upload.clone(),
            workspaces,
        }
    }

    /// The session's workspace, mounting a fresh one on first use
    pub async fn open(&self, access_token: &str, user: AdminUser) -> Arc<AdminWorkspace> {
        self.workspaces
            .get_with(access_token.to_string(), async {
                let store = self.store.authorized(access_token);
                let assets = Arc::new(AssetManager::new(
                    store.clone(),
                    self.bucket.clone(),
                    self.upload.clone(),
                ));
                let workspace = Arc::new(AdminWorkspace::new(store, user, assets));
                workspace.mount().await;
                workspace
            })
            .await
    }

    /// The session's workspace if one is mounted
    pub async fn get(&self, access_token: &str) -> Option<Arc<AdminWorkspace>> {
        self.workspaces.get(access_token).await
    }

    /// Unmount and forget the session's workspace
    pub async fn close(&self, access_token: &str) {
        if let Some(workspace) = self.workspaces.remove(access_token).await {
            workspace.unmount();
        }
    }
}
