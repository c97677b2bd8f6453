use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::{ApiRequest, Query, Transport};
use crate::endpoints;
use crate::error::Error;
use crate::pipeline::AuthPipeline;
use crate::types::{Page, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
    Spam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Comment {
    pub id: u64,
    pub article: u64,
    pub user: UserId,
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    #[serde(default)]
    pub parent: Option<u64>,
    pub content: String,
    pub status: CommentStatus,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub dislikes_count: u64,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub article: u64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
}

impl NewComment {
    #[must_use]
    pub fn new(article: u64, content: impl Into<String>) -> Self {
        Self {
            article,
            content: content.into(),
            parent: None,
        }
    }

    /// Post as a reply to `parent`.
    #[must_use]
    pub fn reply_to(mut self, parent: u64) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[derive(Serialize)]
struct CommentEdit<'a> {
    content: &'a str,
}

/// Comments and their moderation actions.
pub struct Comments<'a, T> {
    pipeline: &'a AuthPipeline<T>,
}

impl<'a, T: Transport> Comments<'a, T> {
    #[must_use]
    pub fn new(pipeline: &'a AuthPipeline<T>) -> Self {
        Self { pipeline }
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn for_article(&self, article: u64, page: Option<u32>) -> Result<Page<Comment>, Error> {
        let request = ApiRequest::get(endpoints::comments::BASE)
            .with_query(Query::new().set("article", article).set_opt("page", page));
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 404 for an unknown id.
    pub async fn get(&self, id: u64) -> Result<Comment, Error> {
        self.pipeline
            .send_json(ApiRequest::get(endpoints::comments::detail(id)))
            .await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 400 for validation failures.
    pub async fn create(&self, comment: &NewComment) -> Result<Comment, Error> {
        let request = ApiRequest::post(endpoints::comments::BASE).with_json(comment)?;
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 403 when editing someone else's comment.
    pub async fn update(&self, id: u64, content: &str) -> Result<Comment, Error> {
        let request =
            ApiRequest::put(endpoints::comments::detail(id)).with_json(&CommentEdit { content })?;
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn delete(&self, id: u64) -> Result<(), Error> {
        self.pipeline
            .send_empty(ApiRequest::delete(endpoints::comments::detail(id)))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn like(&self, id: u64) -> Result<(), Error> {
        self.action(endpoints::comments::like(id)).await
    }

    /// # Errors
    ///
    /// Any pipeline error; 403 without moderation rights.
    pub async fn approve(&self, id: u64) -> Result<(), Error> {
        self.action(endpoints::comments::approve(id)).await
    }

    /// # Errors
    ///
    /// Any pipeline error; 403 without moderation rights.
    pub async fn reject(&self, id: u64) -> Result<(), Error> {
        self.action(endpoints::comments::reject(id)).await
    }

    /// # Errors
    ///
    /// Any pipeline error; 403 without moderation rights.
    pub async fn spam(&self, id: u64) -> Result<(), Error> {
        self.action(endpoints::comments::spam(id)).await
    }

    async fn action(&self, path: String) -> Result<(), Error> {
        let request = ApiRequest::post(path).with_json(&serde_json::json!({}))?;
        self.pipeline.send_empty(request).await
    }
}
