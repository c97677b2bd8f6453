//! Typed wrappers over the content endpoints.
//!
//! Each service borrows an [`AuthPipeline`](crate::pipeline::AuthPipeline),
//! so every call is authorized and refreshed the same way.

pub mod account;
pub mod articles;
pub mod bookmarks;
pub mod comments;
pub mod taxonomy;

pub use account::Account;
pub use articles::Articles;
pub use bookmarks::Bookmarks;
pub use comments::Comments;
pub use taxonomy::Taxonomy;

use crate::api::Form;

/// File sent as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: None,
            bytes,
        }
    }

    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Append `upload` as a file part, if present.
pub(crate) fn attach(form: Form, field: &str, upload: Option<&Upload>) -> Form {
    match upload {
        Some(upload) => form.file(
            field,
            upload.file_name.clone(),
            upload.mime.as_deref(),
            upload.bytes.clone(),
        ),
        None => form,
    }
}
