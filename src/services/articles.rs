use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::{ApiRequest, Form, Query, Transport};
use crate::endpoints;
use crate::error::Error;
use crate::pipeline::AuthPipeline;
use crate::services::taxonomy::{Category, Tag};
use crate::services::{Upload, attach};
use crate::types::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Pending,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Premium,
    SubscriberOnly,
}

/// Author profile as embedded in articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Author {
    pub id: u64,
    pub display_name: String,
    pub slug: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Image {
    pub id: u64,
    pub file: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Article as returned in list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ArticleListItem {
    pub id: u64,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub summary: String,
    pub author: Author,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub featured_image: Option<Image>,
    pub status: ArticleStatus,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_breaking: bool,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub views_count: u64,
    #[serde(default)]
    pub read_time: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

/// Full article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub summary: String,
    pub content: String,
    pub author: Author,
    #[serde(default)]
    pub co_authors: Vec<Author>,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub featured_image: Option<Image>,
    #[serde(default)]
    pub gallery: Vec<Image>,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    pub status: ArticleStatus,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_breaking: bool,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub views_count: u64,
    #[serde(default)]
    pub read_time: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

/// List filters. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticleFilters {
    pub status: Option<ArticleStatus>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub is_featured: Option<bool>,
    pub is_breaking: Option<bool>,
    pub is_trending: Option<bool>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Fields for creating or editing an article.
///
/// On create the backend requires `title`, `summary`, `content`, `author`
/// and `category`; on update every field is optional.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticleDraft {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<u64>,
    pub co_authors: Vec<u64>,
    pub category: Option<u64>,
    pub tags: Vec<u64>,
    pub featured_image: Option<u64>,
    pub gallery: Vec<u64>,
    pub has_video: Option<bool>,
    pub video_url: Option<String>,
    pub status: Option<ArticleStatus>,
    pub visibility: Option<Visibility>,
    pub is_featured: Option<bool>,
    pub is_breaking: Option<bool>,
    pub is_trending: Option<bool>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    #[serde(skip)]
    pub video_file: Option<Upload>,
    #[serde(skip)]
    pub og_image: Option<Upload>,
}

impl ArticleDraft {
    fn to_form(&self) -> Result<Form, Error> {
        let form = Form::from_serializable(self)?;
        let form = attach(form, "video_file", self.video_file.as_ref());
        Ok(attach(form, "og_image", self.og_image.as_ref()))
    }
}

pub struct Articles<'a, T> {
    pipeline: &'a AuthPipeline<T>,
}

impl<'a, T: Transport> Articles<'a, T> {
    #[must_use]
    pub fn new(pipeline: &'a AuthPipeline<T>) -> Self {
        Self { pipeline }
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn list(&self, filters: &ArticleFilters) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::from_serializable(filters)?).await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 404 for an unknown slug.
    pub async fn by_slug(&self, slug: &str) -> Result<Article, Error> {
        self.pipeline
            .send_json(ApiRequest::get(endpoints::articles::detail(slug)))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn featured(&self) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::new().set("is_featured", true)).await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn breaking(&self) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::new().set("is_breaking", true)).await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn trending(&self) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::new().set("is_trending", true)).await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn by_category(&self, slug: &str, page: Option<u32>) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::new().set("category", slug).set_opt("page", page))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn by_tag(&self, slug: &str, page: Option<u32>) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::new().set("tags", slug).set_opt("page", page))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn by_author(&self, slug: &str, page: Option<u32>) -> Result<Page<ArticleListItem>, Error> {
        self.fetch_page(Query::new().set("author", slug).set_opt("page", page))
            .await
    }

    /// Full-text search. Searches are also recorded in recent searches.
    ///
    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn search(&self, query: &str, page: Option<u32>) -> Result<Page<ArticleListItem>, Error> {
        self.pipeline.session().storage().add_recent_search(query);
        self.fetch_page(Query::new().set("search", query).set_opt("page", page))
            .await
    }

    /// Create an article as multipart form data.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] with status 400 for validation failures.
    pub async fn create(&self, draft: &ArticleDraft) -> Result<Article, Error> {
        let request = ApiRequest::post(endpoints::articles::BASE).with_form(draft.to_form()?);
        self.pipeline.send_json(request).await
    }

    /// Replace an article's fields as multipart form data.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] with status 400 for validation failures.
    pub async fn update(&self, id: u64, draft: &ArticleDraft) -> Result<Article, Error> {
        let request = ApiRequest::put(endpoints::articles::by_id(id)).with_form(draft.to_form()?);
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn delete(&self, id: u64) -> Result<(), Error> {
        self.pipeline
            .send_empty(ApiRequest::delete(endpoints::articles::by_id(id)))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn increment_views(&self, slug: &str) -> Result<(), Error> {
        let request = ApiRequest::post(endpoints::articles::increment_views(slug))
            .with_json(&serde_json::json!({}))?;
        self.pipeline.send_empty(request).await
    }

    async fn fetch_page(&self, query: Query) -> Result<Page<ArticleListItem>, Error> {
        let request = ApiRequest::get(endpoints::articles::BASE).with_query(query);
        self.pipeline.send_json(request).await
    }
}
