//! Recipe photos from a hosted image model: one call to create a photo from a
//! recipe, one to edit an existing photo.

mod engine;
mod error;
mod parse;
pub mod prompt;

pub use error::ImageError;

use bakebox_core::{photo, ImageSettings, Recipe};

use engine::Part;

/// Generate a photo for a recipe. Returns the image as a data URL.
pub async fn generate_photo(
    settings: &ImageSettings,
    recipe: &Recipe,
    extra: Option<&str>,
) -> Result<String, ImageError> {
    let prompt = prompt::photo_prompt(recipe, extra);
    tracing::info!(model = %settings.model, recipe = %recipe.title, "generating photo");
    let result = engine::generate(settings, vec![Part::Text(prompt)]).await;
    log_outcome("generate", &result);
    result
}

/// Edit an existing photo (a data URL) according to `instruction`.
pub async fn edit_photo(
    settings: &ImageSettings,
    image: &str,
    instruction: &str,
) -> Result<String, ImageError> {
    let (mime_type, data) =
        photo::split_data_url(image).map_err(|e| ImageError::InvalidDataUrl(e.to_string()))?;
    let parts = vec![
        Part::Text(prompt::edit_prompt(instruction)),
        Part::InlineData {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        },
    ];
    tracing::info!(model = %settings.model, "editing photo");
    let result = engine::generate(settings, parts).await;
    log_outcome("edit", &result);
    result
}

fn log_outcome(call: &str, result: &Result<String, ImageError>) {
    match result {
        Ok(url) => tracing::info!(call, bytes = url.len(), "image received"),
        Err(e) => tracing::warn!(call, error = %e, "image call failed"),
    }
}
