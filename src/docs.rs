// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

use crate::models::{
    recipe::{CreateRecipeRequest, IngredientLineRequest, MealType},
    units::Unit,
    user::{LoginRequest, RegisterRequest, Role, TokenResponse},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fithub API",
        version = "0.1.0",
        description = "Recipes, nutrition, ratings and community boards"
    ),
    paths(
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::recipe::get_recipe,
        crate::handlers::recipe::create_recipe,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        TokenResponse,
        Role,
        CreateRecipeRequest,
        IngredientLineRequest,
        MealType,
        Unit
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "BearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

/// GET /api-docs/openapi.json
pub async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_auth_and_recipe_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/auth/register"));
        assert!(doc.paths.paths.contains_key("/api/recipes/{id}"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("BearerAuth"));
    }
}
