//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use crate::web::{auth, chapters, dto, favorites, filters, health, progress, series, settings, subscription};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::me_handler,
        auth::refresh_handler,
        auth::debug_handler,
        series::list_series_handler,
        series::get_series_handler,
        series::create_series_handler,
        series::update_series_handler,
        series::delete_series_handler,
        chapters::list_chapters_handler,
        chapters::get_chapter_handler,
        chapters::create_chapter_handler,
        chapters::set_chapter_status_handler,
        chapters::delete_chapter_handler,
        filters::list_tags_handler,
        filters::list_languages_handler,
        filters::all_filters_handler,
        filters::trending_tags_handler,
        filters::create_tag_handler,
        filters::create_language_handler,
        favorites::list_favorites_handler,
        favorites::add_favorite_handler,
        favorites::remove_favorite_handler,
        progress::series_progress_handler,
        progress::chapter_progress_handler,
        progress::record_progress_handler,
        settings::get_settings_handler,
        settings::save_settings_handler,
        subscription::my_subscription_handler,
        subscription::list_plans_handler,
        subscription::assign_subscription_handler,
        health::health_handler,
    ),
    components(
        schemas(
            dto::RegisterRequest,
            dto::LoginRequest,
            dto::UserDto,
            dto::AuthResponse,
            dto::DebugAuthResponse,
            dto::SeriesDto,
            dto::SeriesDetailDto,
            dto::CreateSeriesRequest,
            dto::UpdateSeriesRequest,
            dto::ChapterDto,
            dto::ChapterDetailDto,
            dto::ChapterListItemDto,
            dto::PageDto,
            dto::CreateChapterRequest,
            dto::NewPageRequest,
            dto::UpdateChapterStatusRequest,
            dto::TagDto,
            dto::LanguageDto,
            dto::TagWithCountDto,
            dto::FiltersDto,
            dto::CreateNameRequest,
            dto::FavoriteRequest,
            dto::ChapterProgressDto,
            dto::UpdateProgressRequest,
            dto::ViewerSettingsDto,
            dto::PlanDto,
            dto::SubscriptionDto,
            dto::AssignSubscriptionRequest,
            dto::HealthResponse,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Registration, login and bearer tokens."),
        (name = "series", description = "The manga series catalogue."),
        (name = "chapters", description = "Chapters, uploads and moderation."),
        (name = "filters", description = "Tags and languages."),
        (name = "favorites", description = "Favorite series of the caller."),
        (name = "progress", description = "Reading progress of the caller."),
        (name = "settings", description = "Viewer display settings."),
        (name = "subscription", description = "Plans and monthly upload quota."),
        (name = "health", description = "Liveness of the service and its database.")
    )
)]
pub struct ApiDoc;

/// Declares the `bearer_auth` scheme referenced by protected paths.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_protected_paths_with_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/manga/{mangaId}/chapter"));
        assert!(doc.paths.paths.contains_key("/api/auth/refresh"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
