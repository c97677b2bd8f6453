use crate::api::{ApiRequest, Transport};
use crate::endpoints;
use crate::error::Error;
use crate::pipeline::AuthPipeline;
use crate::user::{ChangePasswordRequest, PreferenceUpdate, ProfileUpdate, User, UserPreference};

/// Profile, password and preferences of the signed-in user.
pub struct Account<'a, T> {
    pipeline: &'a AuthPipeline<T>,
}

impl<'a, T: Transport> Account<'a, T> {
    #[must_use]
    pub fn new(pipeline: &'a AuthPipeline<T>) -> Self {
        Self { pipeline }
    }

    /// Fetch the profile and make it the session's current user.
    ///
    /// # Errors
    ///
    /// Any pipeline or decoding error. The session is left as it was.
    pub async fn profile(&self) -> Result<User, Error> {
        let user: User = self
            .pipeline
            .send_json(ApiRequest::get(endpoints::auth::PROFILE))
            .await?;
        self.pipeline.session().apply_profile(user.clone());
        Ok(user)
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 400 for validation failures.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, Error> {
        let request = ApiRequest::patch(endpoints::auth::PROFILE).with_json(update)?;
        let user: User = self.pipeline.send_json(request).await?;
        self.pipeline.session().apply_profile(user.clone());
        Ok(user)
    }

    /// # Errors
    ///
    /// [`Error::Api`] with status 400 when the old password is wrong.
    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<(), Error> {
        let request = ApiRequest::post(endpoints::auth::CHANGE_PASSWORD).with_json(request)?;
        self.pipeline.send_empty(request).await
    }

    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn preferences(&self) -> Result<UserPreference, Error> {
        let preferences: UserPreference = self
            .pipeline
            .send_json(ApiRequest::get(endpoints::auth::PREFERENCES))
            .await?;
        self.remember(&preferences);
        Ok(preferences)
    }

    /// Update preferences; theme and language are also kept locally.
    ///
    /// # Errors
    ///
    /// Any pipeline or decoding error.
    pub async fn update_preferences(&self, update: &PreferenceUpdate) -> Result<UserPreference, Error> {
        let request = ApiRequest::patch(endpoints::auth::PREFERENCES).with_json(update)?;
        let preferences: UserPreference = self.pipeline.send_json(request).await?;
        self.remember(&preferences);
        Ok(preferences)
    }

    fn remember(&self, preferences: &UserPreference) {
        let storage = self.pipeline.session().storage();
        storage.set_theme(preferences.theme);
        storage.set_language(preferences.language);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::{Body, Method};
    use crate::services::testing::signed_in;
    use crate::types::Role;
    use crate::user::{Language, Theme};

    fn preferences(theme: &str) -> serde_json::Value {
        json!({
            "id": 1, "user": 1,
            "email_notifications": true, "push_notifications": false,
            "newsletter_subscribed": false,
            "language": "en", "theme": theme, "font_size": "medium"
        })
    }

    #[tokio::test]
    async fn profile_refreshes_current_user() {
        let (backend, pipeline) = signed_in();
        backend.respond(
            200,
            json!({"id": 1, "username": "editor", "user_type": "admin", "first_name": "Ayşe"}),
        );

        let user = Account::new(&pipeline).profile().await.unwrap();

        assert_eq!(user.user_type, Role::Admin);
        assert!(pipeline.session().is_admin());
        assert_eq!(
            pipeline.session().storage().current_user().map(|u| u.first_name),
            Some("Ayşe".into())
        );
        assert_eq!(backend.last().path, "/auth/profile/");
    }

    #[tokio::test]
    async fn failed_profile_fetch_keeps_session() {
        let (backend, pipeline) = signed_in();
        backend.respond(500, json!({"detail": "boom"}));

        assert!(Account::new(&pipeline).profile().await.is_err());
        assert!(pipeline.session().is_authenticated());
        assert!(pipeline.session().is_editor());
    }

    #[tokio::test]
    async fn update_profile_patches_only_set_fields() {
        let (backend, pipeline) = signed_in();
        backend.respond(200, json!({"id": 1, "username": "editor", "user_type": "editor", "bio": "Hi"}));

        let update = ProfileUpdate {
            bio: Some("Hi".into()),
            ..ProfileUpdate::default()
        };
        Account::new(&pipeline).update_profile(&update).await.unwrap();

        let request = backend.last();
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.body, Body::Json(json!({"bio": "Hi"})));
        assert_eq!(pipeline.session().current_user().and_then(|u| u.bio), Some("Hi".into()));
    }

    #[tokio::test]
    async fn preferences_are_remembered_locally() {
        let (backend, pipeline) = signed_in();
        let account = Account::new(&pipeline);

        backend.respond(200, preferences("dark"));
        account
            .update_preferences(&PreferenceUpdate {
                theme: Some(Theme::Dark),
                ..PreferenceUpdate::default()
            })
            .await
            .unwrap();

        assert_eq!(backend.last().body, Body::Json(json!({"theme": "dark"})));
        let storage = pipeline.session().storage();
        assert_eq!(storage.theme(), Some(Theme::Dark));
        assert_eq!(storage.language(), Some(Language::En));

        backend.respond(200, preferences("light"));
        let current = account.preferences().await.unwrap();
        assert_eq!(current.theme, Theme::Light);
        assert_eq!(storage.theme(), Some(Theme::Light));
    }

    #[tokio::test]
    async fn change_password_posts_request() {
        let (backend, pipeline) = signed_in();
        backend.respond(400, json!({"errors": {"old_password": ["Wrong password."]}}));

        let err = Account::new(&pipeline)
            .change_password(&ChangePasswordRequest {
                old_password: "x".into(),
                new_password: "y".into(),
                new_password_confirm: "y".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(backend.last().path, "/auth/change-password/");
        assert_eq!(err.status(), Some(400));
    }
}
