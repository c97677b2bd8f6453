use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::{ApiRequest, Query, Transport};
use crate::endpoints;
use crate::error::Error;
use crate::pipeline::AuthPipeline;
use crate::types::Page;

/// Article category. Nested summaries only carry `id`, `name` and `slug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub article_count: Option<u64>,
    #[serde(default)]
    pub children: Vec<Category>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage_count: u64,
}

/// Categories and tags.
pub struct Taxonomy<'a, T> {
    pipeline: &'a AuthPipeline<T>,
}

impl<'a, T: Transport> Taxonomy<'a, T> {
    #[must_use]
    pub fn new(pipeline: &'a AuthPipeline<T>) -> Self {
        Self { pipeline }
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn categories(&self) -> Result<Page<Category>, Error> {
        self.pipeline
            .send_json(ApiRequest::get(endpoints::categories::BASE))
            .await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 404 for an unknown slug.
    pub async fn category(&self, slug: &str) -> Result<Category, Error> {
        self.pipeline
            .send_json(ApiRequest::get(endpoints::categories::detail(slug)))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn tags(&self, page: Option<u32>) -> Result<Page<Tag>, Error> {
        let request = ApiRequest::get(endpoints::tags::BASE).with_query(Query::new().set_opt("page", page));
        self.pipeline.send_json(request).await
    }

    /// Tags ordered by usage, most used first.
    ///
    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn popular_tags(&self) -> Result<Page<Tag>, Error> {
        let request = ApiRequest::get(endpoints::tags::BASE)
            .with_query(Query::new().set("ordering", "-usage_count"));
        self.pipeline.send_json(request).await
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 404 for an unknown slug.
    pub async fn tag(&self, slug: &str) -> Result<Tag, Error> {
        self.pipeline
            .send_json(ApiRequest::get(endpoints::tags::detail(slug)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::Method;
    use crate::services::testing::signed_in;

    #[tokio::test]
    async fn categories_parse_nested_children() {
        let (backend, pipeline) = signed_in();
        backend.respond(
            200,
            json!({
                "count": 1, "next": null, "previous": null,
                "results": [{
                    "id": 1, "name": "Gündem", "slug": "gundem", "order": 0, "is_active": true,
                    "created_at": "2024-01-01T00:00:00Z",
                    "children": [{"id": 2, "name": "Politika", "slug": "politika", "parent": 1}]
                }]
            }),
        );

        let page = Taxonomy::new(&pipeline).categories().await.unwrap();

        assert_eq!(page.results[0].children[0].parent, Some(1));
        assert!(page.results[0].created_at.is_some());
        assert_eq!(backend.last().path, "/categories/");
    }

    #[tokio::test]
    async fn popular_tags_orders_by_usage() {
        let (backend, pipeline) = signed_in();
        backend.respond(
            200,
            json!({"count": 1, "results": [{"id": 7, "name": "Seçim", "slug": "secim", "usage_count": 42}]}),
        );

        let page = Taxonomy::new(&pipeline).popular_tags().await.unwrap();

        assert_eq!(page.results[0].usage_count, 42);
        let request = backend.last();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query.get("ordering"), Some("-usage_count"));
    }

    #[tokio::test]
    async fn unknown_tag_is_not_found() {
        let (backend, pipeline) = signed_in();
        backend.respond(404, json!({"detail": "Not found."}));

        let err = Taxonomy::new(&pipeline).tag("nope").await.unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(backend.last().path, "/tags/nope/");
    }
}
