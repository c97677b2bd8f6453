//! Backend endpoint paths, relative to the API base URL.

pub mod auth {
    pub const REGISTER: &str = "/auth/register/";
    pub const LOGIN: &str = "/auth/login/";
    pub const TOKEN_REFRESH: &str = "/auth/token/refresh/";
    pub const PROFILE: &str = "/auth/profile/";
    pub const CHANGE_PASSWORD: &str = "/auth/change-password/";
    pub const PREFERENCES: &str = "/auth/preferences/";
}

pub mod articles {
    pub const BASE: &str = "/articles/";

    #[must_use]
    pub fn detail(slug: &str) -> String {
        format!("/articles/{slug}/")
    }

    #[must_use]
    pub fn by_id(id: u64) -> String {
        format!("/articles/{id}/")
    }

    #[must_use]
    pub fn increment_views(slug: &str) -> String {
        format!("/articles/{slug}/increment_views/")
    }
}

pub mod categories {
    pub const BASE: &str = "/categories/";

    #[must_use]
    pub fn detail(slug: &str) -> String {
        format!("/categories/{slug}/")
    }
}

pub mod tags {
    pub const BASE: &str = "/tags/";

    #[must_use]
    pub fn detail(slug: &str) -> String {
        format!("/tags/{slug}/")
    }
}

pub mod comments {
    pub const BASE: &str = "/comments/";

    #[must_use]
    pub fn detail(id: u64) -> String {
        format!("/comments/{id}/")
    }

    #[must_use]
    pub fn like(id: u64) -> String {
        format!("/comments/{id}/like/")
    }

    #[must_use]
    pub fn approve(id: u64) -> String {
        format!("/comments/{id}/approve/")
    }

    #[must_use]
    pub fn reject(id: u64) -> String {
        format!("/comments/{id}/reject/")
    }

    #[must_use]
    pub fn spam(id: u64) -> String {
        format!("/comments/{id}/spam/")
    }
}

pub mod bookmarks {
    pub const FOLDERS: &str = "/bookmarks/folders/";
    pub const BOOKMARKS: &str = "/bookmarks/bookmarks/";
    pub const HISTORY: &str = "/bookmarks/history/";

    #[must_use]
    pub fn bookmark(id: u64) -> String {
        format!("/bookmarks/bookmarks/{id}/")
    }
}
