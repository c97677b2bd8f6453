use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::{ApiRequest, Query, Transport};
use crate::endpoints;
use crate::error::Error;
use crate::pipeline::AuthPipeline;
use crate::types::Page;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BookmarkFolder {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub bookmark_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Bookmark {
    pub id: u64,
    pub article: u64,
    #[serde(default)]
    pub article_title: Option<String>,
    #[serde(default)]
    pub article_slug: Option<String>,
    #[serde(default)]
    pub folder: Option<u64>,
    #[serde(default)]
    pub folder_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub reminder_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_favorite: bool,
}

/// Reading progress on one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ReadingHistory {
    pub id: u64,
    pub article: u64,
    #[serde(default)]
    pub article_title: Option<String>,
    #[serde(default)]
    pub article_slug: Option<String>,
    /// Percentage read, 0 to 100.
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub completed: bool,
    /// Seconds spent reading.
    #[serde(default)]
    pub time_spent: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewFolder {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewBookmark {
    pub article: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub reminder_date: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

/// Saved articles, folders and reading history of the signed-in user.
pub struct Bookmarks<'a, T> {
    pipeline: &'a AuthPipeline<T>,
}

impl<'a, T: Transport> Bookmarks<'a, T> {
    #[must_use]
    pub fn new(pipeline: &'a AuthPipeline<T>) -> Self {
        Self { pipeline }
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn folders(&self) -> Result<Page<BookmarkFolder>, Error> {
        self.pipeline
            .send_json(ApiRequest::get(endpoints::bookmarks::FOLDERS))
            .await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 400 for validation failures.
    pub async fn create_folder(&self, folder: &NewFolder) -> Result<BookmarkFolder, Error> {
        let request = ApiRequest::post(endpoints::bookmarks::FOLDERS).with_json(folder)?;
        self.pipeline.send_json(request).await
    }

    /// Bookmarks, optionally limited to one folder.
    ///
    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn bookmarks(&self, folder: Option<u64>, page: Option<u32>) -> Result<Page<Bookmark>, Error> {
        let request = ApiRequest::get(endpoints::bookmarks::BOOKMARKS)
            .with_query(Query::new().set_opt("folder", folder).set_opt("page", page));
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 400 when the article is already saved.
    pub async fn add(&self, bookmark: &NewBookmark) -> Result<Bookmark, Error> {
        let request = ApiRequest::post(endpoints::bookmarks::BOOKMARKS).with_json(bookmark)?;
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn remove(&self, id: u64) -> Result<(), Error> {
        self.pipeline
            .send_empty(ApiRequest::delete(endpoints::bookmarks::bookmark(id)))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn history(&self, page: Option<u32>) -> Result<Page<ReadingHistory>, Error> {
        let request = ApiRequest::get(endpoints::bookmarks::HISTORY)
            .with_query(Query::new().set_opt("page", page));
        self.pipeline.send_json(request).await
    }
}
