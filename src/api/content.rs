//! Public content API endpoints
//!
//! Handles:
//! - GET /api/v1/health
//! - GET /api/v1/blogs - List blog posts, newest first
//! - GET /api/v1/blogs/{slug} - Get one blog post
//! - GET /api/v1/projects - List projects, newest first

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::middleware::{ApiError, AppState};
use crate::models::{BlogPost, Project};

#[derive(Debug, Serialize)]
pub struct BlogListResponse {
    pub posts: Vec<BlogPost>,
}

#[derive(Debug, Serialize)]
pub struct BlogResponse {
    pub post: BlogPost,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<Project>,
}

/// GET /api/v1/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/v1/blogs
pub async fn list_blogs(State(state): State<AppState>) -> Result<Json<BlogListResponse>, ApiError> {
    let posts = state.content.list_blogs().await?;
    Ok(Json(BlogListResponse {
        posts: posts.as_ref().clone(),
    }))
}

/// GET /api/v1/blogs/{slug}
pub async fn get_blog(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogResponse>, ApiError> {
    let post = state
        .content
        .blog_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Blog post '{}' not found", slug)))?;
    Ok(Json(BlogResponse { post }))
}

/// GET /api/v1/projects
pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<ProjectListResponse>, ApiError> {
    let projects = state.content.list_projects().await?;
    Ok(Json(ProjectListResponse {
        projects: projects.as_ref().clone(),
    }))
}
