use crate::api;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::health::database_health,
        api::health::database_details,
        api::books::list_books,
        api::books::create_book,
        api::books::get_book,
        api::books::update_book,
        api::books::delete_book,
        api::copy::create_copy,
        api::copy::get_copy,
        api::student::create_student,
        api::student::get_student,
        api::borrowing::create_borrowing,
        api::borrowing::get_borrowing,
        api::borrowing::return_borrowing,
        api::borrowing::extend_borrowing,
        api::statistics::kpi,
        api::statistics::daily,
    ),
    components(
        schemas(
            crate::domain::BookDetail,
            crate::domain::CreateBookInput,
            crate::domain::BookAvailability,
            crate::domain::Copy,
            crate::domain::CopyStatusCounts,
            crate::domain::BulkStatusResult,
            crate::domain::FailedCopyUpdate,
            crate::domain::Student,
            crate::domain::Author,
            crate::domain::Publisher,
            crate::domain::Category,
            crate::domain::Language,
            crate::services::borrowing_service::BorrowDetail,
            crate::services::borrowing_service::ActiveBorrowings,
            crate::domain::statistics::KpiMetrics,
            crate::domain::statistics::DailyStat,
            crate::domain::statistics::CategoryStat,
            crate::domain::statistics::OverdueBook,
            crate::domain::statistics::StudentStat,
            crate::domain::statistics::PopularBook,
            crate::domain::statistics::StudentActivity,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "reading-room", description = "Library circulation API")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_borrowing_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/borrowings"));
        assert!(doc.paths.paths.contains_key("/api/borrowings/{id}/extend"));
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|c| c.security_schemes.contains_key("bearer_auth"))
        );
    }
}
