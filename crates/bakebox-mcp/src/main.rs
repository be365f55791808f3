use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bakebox_core::print::{render_knowledge, render_recipe};
use bakebox_core::scaling::{scale_recipe, ScaleMode};
use bakebox_core::{
    photo, Bakebox, ImageSettings, ImportMode, Knowledge, Mold, MoveDirection, Recipe,
    RecipeFilter, Store,
};
use chrono::NaiveDate;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const INSTRUCTIONS: &str = "\
Bakebox is a personal recipe box for bakers.

- Recipes have five ingredient sections: main, liquidStarter, filling, decoration, custom.
  Main and liquidStarter scale with the yield or mold; filling, decoration and custom stay fixed.
- Mark flours with isFlour: true. Each section's percentages are relative to its total flour,
  or to its heaviest ingredient when it has none.
- Amounts are numbers, or text such as \"to taste\", \"a pinch\", \"適量\", \"少々\" which never scale.
- Use scale_recipe to see scaled amounts and print_recipe for a printable sheet.
- Photos are stored as data URLs; use save_photo to write one to disk instead of reading it inline.";

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListRecipesRequest {
    /// Case-insensitive text matched against title, master, tags and ingredient names
    query: Option<String>,
    /// Only recipes carrying this tag
    tag: Option<String>,
    /// Only recipes in this category
    category_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RecipeIdRequest {
    /// Recipe id
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RecipeDataRequest {
    /// The complete recipe as a JSON string, in the shape returned by get_recipe. `id` may be omitted when creating.
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ScaleRecipeRequest {
    /// Recipe id
    id: String,
    /// Desired yield, in the recipe's yield unit
    target_yield: Option<f64>,
    /// Mold the recipe was written for. Defaults to the recipe's own moldSize.
    source_mold: Option<Mold>,
    /// Mold to scale to. Takes precedence over target_yield.
    target_mold: Option<Mold>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddLogRequest {
    /// Recipe id
    recipe_id: String,
    /// Bake date as YYYY-MM-DD. Default: today.
    date: Option<String>,
    /// Rating from 1 to 5
    rating: u8,
    /// What happened on this bake
    text: Option<String>,
    /// Image file to attach to the entry
    photo_path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteLogRequest {
    recipe_id: String,
    log_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddCategoryRequest {
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenameCategoryRequest {
    /// Category id
    id: String,
    /// New name
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CategoryIdRequest {
    /// Category id
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MoveCategoryRequest {
    /// Category id
    id: String,
    /// "up" or "down"
    direction: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListKnowledgeRequest {
    /// Case-insensitive text matched against title, content and tags
    query: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct KnowledgeIdRequest {
    /// Note id
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddKnowledgeRequest {
    title: String,
    content: String,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateKnowledgeRequest {
    /// Note id
    id: String,
    title: Option<String>,
    content: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct BackupPathRequest {
    /// Path of the backup JSON file
    path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ImportBackupRequest {
    /// Path of the backup JSON file
    path: String,
    /// "merge" (default) adds records with new ids; "replace" discards current data
    mode: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GeneratePhotoRequest {
    recipe_id: String,
    /// Extra directions appended to the photo prompt, e.g. "overhead shot on slate"
    prompt: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EditPhotoRequest {
    recipe_id: String,
    /// How to change the current photo
    instruction: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PhotoPathRequest {
    recipe_id: String,
    /// Image file path
    path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SaveImageSettingsRequest {
    /// API key. Omit or pass an empty string to keep the stored key.
    api_key: Option<String>,
    /// Image model name
    model: Option<String>,
    /// API base URL
    endpoint: Option<String>,
}

// --- Helpers ---

fn ok_text(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

fn err_text(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(text.into())]))
}

fn ok_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => ok_text(json),
        Err(e) => err_text(format!("Serialization error: {e}")),
    }
}

/// Turn a controller result into a tool result, formatting the success case with `f`.
fn respond<T>(
    result: bakebox_core::Result<T>,
    f: impl FnOnce(T) -> String,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => ok_text(f(value)),
        Err(e) => err_text(e.to_string()),
    }
}

fn parse_direction(s: &str) -> Option<MoveDirection> {
    match s.trim().to_ascii_lowercase().as_str() {
        "up" => Some(MoveDirection::Up),
        "down" => Some(MoveDirection::Down),
        _ => None,
    }
}

fn parse_import_mode(s: Option<&str>) -> Option<ImportMode> {
    match s.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("merge") => Some(ImportMode::Merge),
        Some("replace") => Some(ImportMode::Replace),
        _ => None,
    }
}

fn parse_date(s: Option<&str>) -> Result<NaiveDate, String> {
    match s.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| format!("Invalid date '{d}' (expected YYYY-MM-DD): {e}")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

/// Pick the scaling mode: a target mold wins over a target yield; no target means identity.
fn resolve_scale_mode(
    recipe: &Recipe,
    target_yield: Option<f64>,
    source_mold: Option<Mold>,
    target_mold: Option<Mold>,
) -> Result<ScaleMode, String> {
    if let Some(target) = target_mold {
        let source = source_mold.or(recipe.mold_size).ok_or_else(|| {
            format!(
                "Recipe '{}' has no mold size; pass source_mold to scale by mold",
                recipe.title
            )
        })?;
        return Ok(ScaleMode::Mold { source, target });
    }
    Ok(match target_yield {
        Some(target) => ScaleMode::Yield { target },
        None => ScaleMode::Identity,
    })
}

const PHOTO_MARKER: &str = "[photo, ";

/// Whether a photo field holds the marker `get_recipe` puts in place of the image.
fn is_photo_marker(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.starts_with(PHOTO_MARKER))
}

/// Replace inline photos with a size marker so recipe JSON stays readable.
fn strip_photos(val: &mut serde_json::Value) {
    fn mark(slot: &mut serde_json::Value) {
        if let Some(url) = slot.as_str() {
            *slot = serde_json::Value::String(format!("{PHOTO_MARKER}{} bytes]", url.len()));
        }
    }
    if let Some(image) = val.get_mut("image") {
        mark(image);
    }
    if let Some(logs) = val.get_mut("logs").and_then(|l| l.as_array_mut()) {
        for log in logs {
            if let Some(photo) = log.get_mut("photo") {
                mark(photo);
            }
        }
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

fn recipe_line(recipe: &Recipe, category: Option<&str>) -> String {
    let mut line = format!("{}  {}", recipe.id, recipe.title);
    if let Some(cat) = category {
        line.push_str(&format!(" [{cat}]"));
    }
    if !recipe.tags.is_empty() {
        line.push_str(&format!(" #{}", recipe.tags.join(" #")));
    }
    if recipe.image.is_some() {
        line.push_str(" (photo)");
    }
    line
}

// --- Server ---

#[derive(Clone)]
pub struct BakeboxServer {
    bakebox: Arc<Mutex<Bakebox>>,
    tool_router: ToolRouter<Self>,
}

impl BakeboxServer {
    fn lock(&self) -> Result<MutexGuard<'_, Bakebox>, McpError> {
        self.bakebox
            .lock()
            .map_err(|_| McpError::internal_error("recipe box lock poisoned", None))
    }

    fn image_settings(&self) -> Result<ImageSettings, McpError> {
        Ok(self.lock()?.store().read_settings().with_env_overrides())
    }
}

#[tool_router]
impl BakeboxServer {
    pub fn new(bakebox: Bakebox) -> Self {
        Self {
            bakebox: Arc::new(Mutex::new(bakebox)),
            tool_router: Self::tool_router(),
        }
    }

    // --- Recipes ---

    #[tool(
        description = "List recipes, newest first, one per line as `id  title [category] #tags`. Filter by free text, tag or category."
    )]
    fn list_recipes(
        &self,
        Parameters(req): Parameters<ListRecipesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let filter = RecipeFilter {
            query: req.query,
            tag: req.tag,
            category_id: req.category_id,
        };
        let lines: Vec<String> = bakebox
            .search_recipes(&filter)
            .into_iter()
            .map(|r| {
                let category = r
                    .category_id
                    .as_deref()
                    .and_then(|id| bakebox.category(id))
                    .map(|c| c.name.as_str());
                recipe_line(r, category)
            })
            .collect();
        if lines.is_empty() {
            ok_text("No recipes found. Use create_recipe to add one.")
        } else {
            ok_text(lines.join("\n"))
        }
    }

    #[tool(
        description = "Get the full JSON of a recipe. Inline photos are replaced by a size marker; use save_photo to get the image."
    )]
    fn get_recipe(
        &self,
        Parameters(req): Parameters<RecipeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let recipe = match bakebox.recipe(&req.id) {
            Ok(r) => r,
            Err(e) => return err_text(e.to_string()),
        };
        match serde_json::to_value(recipe) {
            Ok(mut val) => {
                strip_photos(&mut val);
                ok_json(&val)
            }
            Err(e) => err_text(format!("Serialization error: {e}")),
        }
    }

    #[tool(
        description = "Create a recipe from JSON. Required: title. Sections are arrays of {name, amount, unit, isFlour}; amount is a number or text. Optional: master, categoryId, yieldQuantity, yieldUnit, mold, moldSize ({shape: \"circular\", diameter, height?} or {shape: \"rectangular\", length, width, height?}), fermentation, baking, instructions, notes, tags, customSectionName, sectionsOrder. Returns the new id."
    )]
    fn create_recipe(
        &self,
        Parameters(req): Parameters<RecipeDataRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut recipe: Recipe = match serde_json::from_str(&req.data) {
            Ok(r) => r,
            Err(e) => return err_text(format!("Invalid recipe JSON: {e}")),
        };
        if is_photo_marker(recipe.image.as_deref()) {
            recipe.image = None;
        }
        for log in &mut recipe.logs {
            if is_photo_marker(log.photo.as_deref()) {
                log.photo = None;
            }
        }
        let mut bakebox = self.lock()?;
        respond(bakebox.create_recipe(recipe), |r| {
            format!("Created recipe '{}' with id {}", r.title, r.id)
        })
    }

    #[tool(
        description = "Replace a recipe with the given JSON (must include id). The journal and creation time are kept. The photo is kept when image is omitted or still holds the marker from get_recipe; use remove_photo to clear it."
    )]
    fn update_recipe(
        &self,
        Parameters(req): Parameters<RecipeDataRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut recipe: Recipe = match serde_json::from_str(&req.data) {
            Ok(r) => r,
            Err(e) => return err_text(format!("Invalid recipe JSON: {e}")),
        };
        let mut bakebox = self.lock()?;
        if recipe.image.is_none() || is_photo_marker(recipe.image.as_deref()) {
            if let Ok(existing) = bakebox.recipe(&recipe.id) {
                recipe.image = existing.image.clone();
            }
        }
        respond(bakebox.update_recipe(recipe), |r| {
            format!("Updated recipe '{}'", r.title)
        })
    }

    #[tool(description = "Delete a recipe and its journal")]
    fn delete_recipe(
        &self,
        Parameters(req): Parameters<RecipeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.delete_recipe(&req.id), |r| {
            format!("Deleted recipe '{}'", r.title)
        })
    }

    #[tool(description = "Copy a recipe under the title \"<title> (copy)\" with an empty journal")]
    fn duplicate_recipe(
        &self,
        Parameters(req): Parameters<RecipeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.duplicate_recipe(&req.id), |r| {
            format!("Created '{}' with id {}", r.title, r.id)
        })
    }

    #[tool(
        description = "Scale a recipe to a target yield or a target mold and return JSON {factor, sourceYield, targetYield, sections: [{key, title, fixed, base, lines: [{name, displayAmount, unit, percentText?}]}]}. Filling, decoration and custom sections are never scaled."
    )]
    fn scale_recipe(
        &self,
        Parameters(req): Parameters<ScaleRecipeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let recipe = match bakebox.recipe(&req.id) {
            Ok(r) => r,
            Err(e) => return err_text(e.to_string()),
        };
        match resolve_scale_mode(recipe, req.target_yield, req.source_mold, req.target_mold) {
            Ok(mode) => ok_json(&scale_recipe(recipe, &mode)),
            Err(e) => err_text(e),
        }
    }

    #[tool(
        description = "Render a recipe as a printable plain-text sheet, optionally scaled (same parameters as scale_recipe)"
    )]
    fn print_recipe(
        &self,
        Parameters(req): Parameters<ScaleRecipeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let recipe = match bakebox.recipe(&req.id) {
            Ok(r) => r,
            Err(e) => return err_text(e.to_string()),
        };
        let mode =
            match resolve_scale_mode(recipe, req.target_yield, req.source_mold, req.target_mold) {
                Ok(m) => m,
                Err(e) => return err_text(e),
            };
        let category = recipe
            .category_id
            .as_deref()
            .and_then(|id| bakebox.category(id))
            .map(|c| c.name.as_str());
        ok_text(render_recipe(recipe, &scale_recipe(recipe, &mode), category))
    }

    // --- Journal ---

    #[tool(description = "Record a bake in a recipe's journal (newest first)")]
    fn add_log(&self, Parameters(req): Parameters<AddLogRequest>) -> Result<CallToolResult, McpError> {
        let date = match parse_date(req.date.as_deref()) {
            Ok(d) => d,
            Err(e) => return err_text(e),
        };
        let photo_url = match req.photo_path.as_deref() {
            Some(path) => match photo::read_photo(Path::new(path)) {
                Ok(url) => Some(url),
                Err(e) => return err_text(e.to_string()),
            },
            None => None,
        };
        let mut bakebox = self.lock()?;
        respond(
            bakebox.add_log(
                &req.recipe_id,
                date,
                req.rating,
                req.text.as_deref().unwrap_or_default(),
                photo_url,
            ),
            |log| format!("Logged bake on {} with id {}", log.date, log.id),
        )
    }

    #[tool(description = "Remove an entry from a recipe's journal")]
    fn delete_log(
        &self,
        Parameters(req): Parameters<DeleteLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.delete_log(&req.recipe_id, &req.log_id), |_| {
            "Journal entry deleted".to_string()
        })
    }

    // --- Categories ---

    #[tool(description = "List categories in display order as `id  name`")]
    fn list_categories(&self) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let lines: Vec<String> = bakebox
            .categories()
            .into_iter()
            .map(|c| format!("{}  {}", c.id, c.name))
            .collect();
        if lines.is_empty() {
            ok_text("No categories yet. Use add_category to create one.")
        } else {
            ok_text(lines.join("\n"))
        }
    }

    #[tool(description = "Add a category at the end of the list")]
    fn add_category(
        &self,
        Parameters(req): Parameters<AddCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.add_category(&req.name), |c| {
            format!("Added category '{}' with id {}", c.name, c.id)
        })
    }

    #[tool(description = "Rename a category")]
    fn rename_category(
        &self,
        Parameters(req): Parameters<RenameCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.rename_category(&req.id, &req.name), |_| {
            format!("Renamed category to '{}'", req.name.trim())
        })
    }

    #[tool(description = "Delete a category. Its recipes become uncategorized.")]
    fn delete_category(
        &self,
        Parameters(req): Parameters<CategoryIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.delete_category(&req.id), |_| {
            "Category deleted".to_string()
        })
    }

    #[tool(description = "Move a category one place up or down in the display order")]
    fn move_category(
        &self,
        Parameters(req): Parameters<MoveCategoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(direction) = parse_direction(&req.direction) else {
            return err_text(format!(
                "Invalid direction '{}': expected \"up\" or \"down\"",
                req.direction
            ));
        };
        let mut bakebox = self.lock()?;
        respond(bakebox.move_category(&req.id, direction), |_| {
            "Category moved".to_string()
        })
    }

    #[tool(
        description = "Step a recipe to the next category: none, then each category in order, then back to none"
    )]
    fn cycle_recipe_category(
        &self,
        Parameters(req): Parameters<RecipeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        let next = match bakebox.cycle_recipe_category(&req.id) {
            Ok(next) => next,
            Err(e) => return err_text(e.to_string()),
        };
        let name = next
            .as_deref()
            .and_then(|id| bakebox.category(id))
            .map(|c| c.name.clone());
        match name {
            Some(name) => ok_text(format!("Recipe is now in '{name}'")),
            None => ok_text("Recipe is now uncategorized"),
        }
    }

    // --- Knowledge ---

    #[tool(description = "List knowledge notes, most recently updated first, as `id  title`")]
    fn list_knowledge(
        &self,
        Parameters(req): Parameters<ListKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let notes = match req.query.as_deref() {
            Some(q) => bakebox.search_knowledge(q),
            None => bakebox.knowledge(),
        };
        if notes.is_empty() {
            return ok_text("No knowledge notes found.");
        }
        let lines: Vec<String> = notes
            .into_iter()
            .map(|n| format!("{}  {}", n.id, n.title))
            .collect();
        ok_text(lines.join("\n"))
    }

    #[tool(description = "Read one knowledge note as text")]
    fn get_knowledge(
        &self,
        Parameters(req): Parameters<KnowledgeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        respond(bakebox.knowledge_note(&req.id), render_knowledge)
    }

    #[tool(description = "Add a knowledge note (technique, ingredient notes, troubleshooting)")]
    fn add_knowledge(
        &self,
        Parameters(req): Parameters<AddKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut note = Knowledge::new(&req.title, &req.content);
        note.tags = req.tags.unwrap_or_default();
        let mut bakebox = self.lock()?;
        respond(bakebox.add_knowledge(note), |n| {
            format!("Added note '{}' with id {}", n.title, n.id)
        })
    }

    #[tool(description = "Update a knowledge note. Only the fields given are changed.")]
    fn update_knowledge(
        &self,
        Parameters(req): Parameters<UpdateKnowledgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        let mut note = match bakebox.knowledge_note(&req.id) {
            Ok(n) => n.clone(),
            Err(e) => return err_text(e.to_string()),
        };
        if let Some(title) = req.title {
            note.title = title;
        }
        if let Some(content) = req.content {
            note.content = content;
        }
        if let Some(tags) = req.tags {
            note.tags = tags;
        }
        respond(bakebox.update_knowledge(note), |n| {
            format!("Updated note '{}'", n.title)
        })
    }

    #[tool(description = "Delete a knowledge note")]
    fn delete_knowledge(
        &self,
        Parameters(req): Parameters<KnowledgeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.delete_knowledge(&req.id), |n| {
            format!("Deleted note '{}'", n.title)
        })
    }

    // --- Backup ---

    #[tool(description = "Write all recipes, categories and notes to a JSON backup file")]
    fn export_backup(
        &self,
        Parameters(req): Parameters<BackupPathRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        respond(bakebox.export_backup(Path::new(&req.path)), |_| {
            format!("Backup written to {}", req.path)
        })
    }

    #[tool(
        description = "Load a JSON backup. mode \"merge\" (default) adds records whose ids are new; \"replace\" discards the current data."
    )]
    fn import_backup(
        &self,
        Parameters(req): Parameters<ImportBackupRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Some(mode) = parse_import_mode(req.mode.as_deref()) else {
            return err_text(format!(
                "Invalid mode '{}': expected \"merge\" or \"replace\"",
                req.mode.unwrap_or_default()
            ));
        };
        let mut bakebox = self.lock()?;
        respond(bakebox.import_backup(Path::new(&req.path), mode), |s| {
            format!(
                "Imported {} recipes, {} categories, {} notes",
                s.recipes, s.categories, s.knowledge
            )
        })
    }

    // --- Photos ---

    #[tool(
        description = "Generate a photo for a recipe with the configured image model and store it as the recipe image. Replaces any existing photo."
    )]
    async fn generate_photo(
        &self,
        Parameters(req): Parameters<GeneratePhotoRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.image_settings()?;
        let recipe = {
            let bakebox = self.lock()?;
            match bakebox.recipe(&req.recipe_id) {
                Ok(r) => r.clone(),
                Err(e) => return err_text(e.to_string()),
            }
        };
        match bakebox_imagegen::generate_photo(&settings, &recipe, req.prompt.as_deref()).await {
            Ok(url) => {
                let mut bakebox = self.lock()?;
                respond(bakebox.set_recipe_image(&recipe.id, Some(url)), |_| {
                    format!("Generated a photo for '{}'", recipe.title)
                })
            }
            Err(e) => err_text(format!("Image generation failed: {e}")),
        }
    }

    #[tool(description = "Edit a recipe's current photo following an instruction and store the result")]
    async fn edit_photo(
        &self,
        Parameters(req): Parameters<EditPhotoRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.image_settings()?;
        let image = {
            let bakebox = self.lock()?;
            match bakebox.recipe(&req.recipe_id) {
                Ok(r) => r.image.clone(),
                Err(e) => return err_text(e.to_string()),
            }
        };
        let Some(image) = image else {
            return err_text("Recipe has no photo to edit. Use generate_photo or attach_photo first.");
        };
        match bakebox_imagegen::edit_photo(&settings, &image, &req.instruction).await {
            Ok(url) => {
                let mut bakebox = self.lock()?;
                respond(bakebox.set_recipe_image(&req.recipe_id, Some(url)), |_| {
                    "Photo updated".to_string()
                })
            }
            Err(e) => err_text(format!("Image edit failed: {e}")),
        }
    }

    #[tool(description = "Write a recipe's photo to an image file")]
    fn save_photo(
        &self,
        Parameters(req): Parameters<PhotoPathRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let image = match bakebox.recipe(&req.recipe_id) {
            Ok(r) => r.image.as_deref(),
            Err(e) => return err_text(e.to_string()),
        };
        let Some(image) = image else {
            return err_text("Recipe has no photo");
        };
        respond(photo::write_photo(image, Path::new(&req.path)), |_| {
            format!("Photo written to {}", req.path)
        })
    }

    #[tool(description = "Set a recipe's photo from an image file (png, jpg, gif or webp)")]
    fn attach_photo(
        &self,
        Parameters(req): Parameters<PhotoPathRequest>,
    ) -> Result<CallToolResult, McpError> {
        let url = match photo::read_photo(Path::new(&req.path)) {
            Ok(url) => url,
            Err(e) => return err_text(e.to_string()),
        };
        let mut bakebox = self.lock()?;
        respond(bakebox.set_recipe_image(&req.recipe_id, Some(url)), |_| {
            "Photo attached".to_string()
        })
    }

    #[tool(description = "Remove a recipe's photo")]
    fn remove_photo(
        &self,
        Parameters(req): Parameters<RecipeIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut bakebox = self.lock()?;
        respond(bakebox.set_recipe_image(&req.id, None), |_| {
            "Photo removed".to_string()
        })
    }

    // --- Settings ---

    #[tool(description = "Show the image API settings. The key is masked.")]
    fn get_image_settings(&self) -> Result<CallToolResult, McpError> {
        let mut settings = self.image_settings()?;
        let configured = settings.is_configured();
        settings.api_key = mask_key(&settings.api_key);
        ok_json(&serde_json::json!({
            "configured": configured,
            "settings": settings,
        }))
    }

    #[tool(description = "Save the image API settings. Fields left out keep their stored value.")]
    fn save_image_settings(
        &self,
        Parameters(req): Parameters<SaveImageSettingsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bakebox = self.lock()?;
        let store = bakebox.store();
        let mut settings = store.read_settings();
        if let Some(key) = req.api_key.filter(|k| !k.trim().is_empty()) {
            settings.api_key = key.trim().to_string();
        }
        if let Some(model) = req.model.filter(|m| !m.trim().is_empty()) {
            settings.model = model.trim().to_string();
        }
        if let Some(endpoint) = req.endpoint.filter(|e| !e.trim().is_empty()) {
            settings.endpoint = endpoint.trim().trim_end_matches('/').to_string();
        }
        respond(store.write_settings(&settings), |_| {
            format!("Image settings saved (model {})", settings.model)
        })
    }
}

#[tool_handler]
impl ServerHandler for BakeboxServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "bakebox=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = Store::open_default();
    tracing::info!(root = %store.root().display(), "opening recipe box");
    let bakebox = Bakebox::open(store)?;

    let service = BakeboxServer::new(bakebox)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {e}"))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakebox_core::MoldShape;
    use pretty_assertions::assert_eq;

    #[test]
    fn directions_and_modes() {
        assert_eq!(parse_direction(" Up "), Some(MoveDirection::Up));
        assert_eq!(parse_direction("down"), Some(MoveDirection::Down));
        assert_eq!(parse_direction("left"), None);
        assert_eq!(parse_import_mode(None), Some(ImportMode::Merge));
        assert_eq!(parse_import_mode(Some("REPLACE")), Some(ImportMode::Replace));
        assert_eq!(parse_import_mode(Some("append")), None);
    }

    #[test]
    fn dates_default_to_today() {
        assert_eq!(
            parse_date(Some("2024-03-09")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert_eq!(parse_date(None).unwrap(), chrono::Local::now().date_naive());
        assert!(parse_date(Some("09/03/2024")).is_err());
    }

    #[test]
    fn target_mold_uses_recipe_mold_size() {
        let mut recipe = Recipe::new("Sponge");
        let target = Mold::circular(20.0, None);
        assert!(resolve_scale_mode(&recipe, None, None, Some(target)).is_err());

        recipe.mold_size = Some(Mold::circular(15.0, None));
        match resolve_scale_mode(&recipe, Some(3.0), None, Some(target)).unwrap() {
            ScaleMode::Mold { source, .. } => {
                assert_eq!(source.shape, MoldShape::Circular { diameter: 15.0 })
            }
            other => panic!("expected mold mode, got {other:?}"),
        }
        assert_eq!(
            resolve_scale_mode(&recipe, Some(3.0), None, None).unwrap(),
            ScaleMode::Yield { target: 3.0 }
        );
        assert_eq!(
            resolve_scale_mode(&recipe, None, None, None).unwrap(),
            ScaleMode::Identity
        );
    }

    #[test]
    fn photos_are_stripped_from_recipe_json() {
        let mut val = serde_json::json!({
            "title": "Loaf",
            "image": "data:image/png;base64,AAAA",
            "logs": [{"id": "a", "photo": "data:image/png;base64,BB"}, {"id": "b", "photo": null}],
        });
        strip_photos(&mut val);
        assert_eq!(val["image"], "[photo, 26 bytes]");
        assert_eq!(val["logs"][0]["photo"], "[photo, 24 bytes]");
        assert!(val["logs"][1]["photo"].is_null());
    }

    fn server() -> (tempfile::TempDir, BakeboxServer) {
        let dir = tempfile::tempdir().unwrap();
        let bakebox = Bakebox::open(Store::new(dir.path())).unwrap();
        (dir, BakeboxServer::new(bakebox))
    }

    fn failed(result: Result<CallToolResult, McpError>) -> bool {
        match result {
            Ok(r) => r.is_error == Some(true),
            Err(_) => true,
        }
    }

    fn add_recipe(server: &BakeboxServer, title: &str) -> String {
        let mut bakebox = server.lock().unwrap();
        bakebox.create_recipe(Recipe::new(title)).unwrap().id.clone()
    }

    #[test]
    fn update_with_get_recipe_json_keeps_the_photo() {
        let (_dir, server) = server();
        let id = add_recipe(&server, "Focaccia");
        let url = "data:image/png;base64,iVBORw0K".to_string();
        server
            .lock()
            .unwrap()
            .set_recipe_image(&id, Some(url.clone()))
            .unwrap();

        let mut json = serde_json::to_value(server.lock().unwrap().recipe(&id).unwrap()).unwrap();
        strip_photos(&mut json);
        assert!(is_photo_marker(json["image"].as_str()));
        json["title"] = "Focaccia genovese".into();

        let result = server.update_recipe(Parameters(RecipeDataRequest {
            data: json.to_string(),
        }));
        assert!(!failed(result));
        let bakebox = server.lock().unwrap();
        let stored = bakebox.recipe(&id).unwrap();
        assert_eq!(stored.title, "Focaccia genovese");
        assert_eq!(stored.image, Some(url));
    }

    #[test]
    fn create_drops_photo_markers() {
        let (_dir, server) = server();
        let result = server.create_recipe(Parameters(RecipeDataRequest {
            data: r#"{"title": "Ciabatta", "image": "[photo, 10 bytes]"}"#.to_string(),
        }));
        assert!(!failed(result));
        let bakebox = server.lock().unwrap();
        assert_eq!(bakebox.recipes().len(), 1);
        assert_eq!(bakebox.recipes()[0].image, None);
    }

    #[test]
    fn bad_recipe_json_is_a_tool_error() {
        let (_dir, server) = server();
        let result = server.create_recipe(Parameters(RecipeDataRequest {
            data: "{ not json".to_string(),
        }));
        assert!(failed(result));
        let result = server.update_recipe(Parameters(RecipeDataRequest {
            data: r#"{"id": "missing", "title": "Ghost"}"#.to_string(),
        }));
        assert!(failed(result));
    }

    #[test]
    fn scale_tool_needs_a_source_mold() {
        let (_dir, server) = server();
        let id = add_recipe(&server, "Sponge");
        let request = |target_yield, target_mold| {
            Parameters(ScaleRecipeRequest {
                id: id.clone(),
                target_yield,
                source_mold: None,
                target_mold,
            })
        };

        assert!(failed(
            server.scale_recipe(request(None, Some(Mold::circular(20.0, None))))
        ));
        assert!(!failed(server.scale_recipe(request(Some(2.0), None))));
        assert!(!failed(server.print_recipe(request(None, None))));
        assert!(failed(server.scale_recipe(Parameters(ScaleRecipeRequest {
            id: "nope".to_string(),
            target_yield: None,
            source_mold: None,
            target_mold: None,
        }))));
    }

    #[test]
    fn import_tool_checks_the_mode() {
        let (dir, server) = server();
        add_recipe(&server, "Baguette");
        let path = dir.path().join("backup.json").display().to_string();
        assert!(!failed(server.export_backup(Parameters(BackupPathRequest {
            path: path.clone(),
        }))));

        assert!(failed(server.import_backup(Parameters(ImportBackupRequest {
            path: path.clone(),
            mode: Some("append".to_string()),
        }))));

        add_recipe(&server, "Brioche");
        assert!(!failed(server.import_backup(Parameters(ImportBackupRequest {
            path: path.clone(),
            mode: Some("Replace".to_string()),
        }))));
        assert_eq!(server.lock().unwrap().recipes().len(), 1);

        assert!(!failed(server.import_backup(Parameters(ImportBackupRequest {
            path,
            mode: None,
        }))));
        assert_eq!(server.lock().unwrap().recipes().len(), 1);
    }

    #[test]
    fn keys_are_masked() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key("AIzaSyExample1234"), "*************1234");
    }
}
