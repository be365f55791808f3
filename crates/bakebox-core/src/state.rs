//! The application controller: owns the state and persists it after every
//! committed mutation.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{self, Store};
use crate::{
    new_id, now, photo, renumber_categories, AppState, Category, Error, ExecutionLog, Knowledge,
    Recipe, Result,
};

/// Photos must be data URLs.
fn check_photo(url: Option<&str>) -> Result<()> {
    match url {
        Some(url) => photo::split_data_url(url).map(|_| ()),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    /// Case-insensitive text matched against title, master, tags and ingredient names.
    pub query: Option<String>,
    pub tag: Option<String>,
    pub category_id: Option<String>,
}

impl RecipeFilter {
    pub fn matches(&self, recipe: &Recipe) -> bool {
        if let Some(cat) = &self.category_id {
            if recipe.category_id.as_deref() != Some(cat.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !recipe.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                let hit = |s: &str| s.to_lowercase().contains(&q);
                hit(recipe.title.as_str())
                    || recipe.master.as_deref().is_some_and(hit)
                    || recipe.tags.iter().any(|t| hit(t.as_str()))
                    || recipe.ingredients().any(|i| hit(i.name.as_str()))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// Discard current data and take the backup wholesale.
    Replace,
    /// Keep current data; add backup records whose ids are new.
    Merge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub recipes: usize,
    pub categories: usize,
    pub knowledge: usize,
}

pub struct Bakebox {
    state: AppState,
    store: Store,
}

impl Bakebox {
    /// Load state from the store (empty if it has never been written).
    pub fn open(store: Store) -> Result<Self> {
        let state = store.load_state()?;
        tracing::info!(
            root = %store.root().display(),
            recipes = state.recipes.len(),
            "recipe box opened"
        );
        Ok(Self { state, store })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Persist the current state. If the write fails, the state rolls back
    /// to `snapshot` so memory never runs ahead of disk.
    fn commit(&mut self, snapshot: AppState) -> Result<()> {
        if let Err(e) = self.store.save_state(&self.state) {
            tracing::warn!(error = %e, "save failed, rolling back");
            self.state = snapshot;
            return Err(e);
        }
        Ok(())
    }

    fn recipe_index(&self, id: &str) -> Result<usize> {
        self.state
            .recipes
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::not_found("recipe", id))
    }

    // --- Recipes ---

    pub fn recipes(&self) -> &[Recipe] {
        &self.state.recipes
    }

    pub fn recipe(&self, id: &str) -> Result<&Recipe> {
        Ok(&self.state.recipes[self.recipe_index(id)?])
    }

    /// Matching recipes, newest first.
    pub fn search_recipes(&self, filter: &RecipeFilter) -> Vec<&Recipe> {
        let mut found: Vec<&Recipe> = self
            .state
            .recipes
            .iter()
            .filter(|r| filter.matches(r))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .state
            .recipes
            .iter()
            .flat_map(|r| r.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Add a new recipe. A missing or clashing id is replaced by a fresh one.
    pub fn create_recipe(&mut self, mut recipe: Recipe) -> Result<&Recipe> {
        recipe.title = recipe.title.trim().to_string();
        if recipe.title.is_empty() {
            return Err(Error::Empty("recipe title"));
        }
        if recipe.id.is_empty() || self.recipe_index(&recipe.id).is_ok() {
            recipe.id = new_id();
        }
        self.check_category(recipe.category_id.as_deref())?;
        check_photo(recipe.image.as_deref())?;
        for log in &recipe.logs {
            check_photo(log.photo.as_deref())?;
        }
        recipe.normalize_sections_order();
        let stamp = now();
        recipe.created_at = stamp;
        recipe.updated_at = stamp;

        tracing::info!(id = %recipe.id, title = %recipe.title, "recipe created");
        let snapshot = self.state.clone();
        self.state.recipes.push(recipe);
        self.commit(snapshot)?;
        Ok(&self.state.recipes[self.state.recipes.len() - 1])
    }

    /// Replace a recipe's editable content. The creation time and the
    /// execution journal are kept from the stored copy.
    pub fn update_recipe(&mut self, mut recipe: Recipe) -> Result<&Recipe> {
        let idx = self.recipe_index(&recipe.id)?;
        recipe.title = recipe.title.trim().to_string();
        if recipe.title.is_empty() {
            return Err(Error::Empty("recipe title"));
        }
        self.check_category(recipe.category_id.as_deref())?;
        check_photo(recipe.image.as_deref())?;
        recipe.normalize_sections_order();

        let snapshot = self.state.clone();
        let existing = &mut self.state.recipes[idx];
        recipe.created_at = existing.created_at;
        recipe.logs = std::mem::take(&mut existing.logs);
        recipe.updated_at = now();
        *existing = recipe;

        self.commit(snapshot)?;
        Ok(&self.state.recipes[idx])
    }

    pub fn delete_recipe(&mut self, id: &str) -> Result<Recipe> {
        let idx = self.recipe_index(id)?;
        let snapshot = self.state.clone();
        let removed = self.state.recipes.remove(idx);
        self.commit(snapshot)?;
        tracing::info!(id = %removed.id, title = %removed.title, "recipe deleted");
        Ok(removed)
    }

    /// Copy a recipe under a new id, without its journal.
    pub fn duplicate_recipe(&mut self, id: &str) -> Result<&Recipe> {
        let mut copy = self.recipe(id)?.clone();
        copy.id = new_id();
        copy.title = format!("{} (copy)", copy.title);
        copy.logs.clear();
        let stamp = now();
        copy.created_at = stamp;
        copy.updated_at = stamp;
        let snapshot = self.state.clone();
        self.state.recipes.push(copy);
        self.commit(snapshot)?;
        Ok(&self.state.recipes[self.state.recipes.len() - 1])
    }

    /// Set or clear the recipe photo. Photos must be data URLs.
    pub fn set_recipe_image(&mut self, id: &str, image: Option<String>) -> Result<()> {
        check_photo(image.as_deref())?;
        let idx = self.recipe_index(id)?;
        let snapshot = self.state.clone();
        let recipe = &mut self.state.recipes[idx];
        recipe.image = image;
        recipe.updated_at = now();
        self.commit(snapshot)
    }

    // --- Execution journal ---

    /// Prepend a journal entry (newest first).
    pub fn add_log(
        &mut self,
        recipe_id: &str,
        date: NaiveDate,
        rating: u8,
        text: &str,
        photo_url: Option<String>,
    ) -> Result<&ExecutionLog> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidRating(rating));
        }
        check_photo(photo_url.as_deref())?;
        let idx = self.recipe_index(recipe_id)?;
        let entry = ExecutionLog {
            id: new_id(),
            date,
            rating,
            text: text.trim().to_string(),
            photo: photo_url,
        };
        let snapshot = self.state.clone();
        self.state.recipes[idx].logs.insert(0, entry);
        self.commit(snapshot)?;
        Ok(&self.state.recipes[idx].logs[0])
    }

    pub fn delete_log(&mut self, recipe_id: &str, log_id: &str) -> Result<()> {
        let idx = self.recipe_index(recipe_id)?;
        let pos = self.state.recipes[idx]
            .logs
            .iter()
            .position(|l| l.id == log_id)
            .ok_or_else(|| Error::not_found("log", log_id))?;
        let snapshot = self.state.clone();
        self.state.recipes[idx].logs.remove(pos);
        self.commit(snapshot)
    }

    // --- Categories ---

    /// Categories in display order.
    pub fn categories(&self) -> Vec<&Category> {
        let mut cats: Vec<&Category> = self.state.categories.iter().collect();
        cats.sort_by_key(|c| c.order);
        cats
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.state.categories.iter().find(|c| c.id == id)
    }

    fn check_category(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) if self.category(id).is_none() => Err(Error::not_found("category", id)),
            _ => Ok(()),
        }
    }

    /// Sort by order and renumber densely from zero.
    fn sort_categories(&mut self) {
        self.state.categories.sort_by_key(|c| c.order);
        renumber_categories(&mut self.state.categories);
    }

    pub fn add_category(&mut self, name: &str) -> Result<&Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Empty("category name"));
        }
        let snapshot = self.state.clone();
        self.sort_categories();
        self.state.categories.push(Category {
            id: new_id(),
            name: name.to_string(),
            order: self.state.categories.len() as u32,
        });
        self.commit(snapshot)?;
        Ok(&self.state.categories[self.state.categories.len() - 1])
    }

    pub fn rename_category(&mut self, id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Empty("category name"));
        }
        let pos = self
            .state
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::not_found("category", id))?;
        let snapshot = self.state.clone();
        self.state.categories[pos].name = name.to_string();
        self.commit(snapshot)
    }

    /// Remove a category; its recipes become uncategorized.
    pub fn delete_category(&mut self, id: &str) -> Result<()> {
        let pos = self
            .state
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::not_found("category", id))?;
        let snapshot = self.state.clone();
        self.state.categories.remove(pos);
        for recipe in &mut self.state.recipes {
            if recipe.category_id.as_deref() == Some(id) {
                recipe.category_id = None;
            }
        }
        self.sort_categories();
        self.commit(snapshot)
    }

    /// Swap a category with its neighbour. Moving past either end is a no-op.
    pub fn move_category(&mut self, id: &str, direction: MoveDirection) -> Result<()> {
        let len = self.state.categories.len();
        let pos = self
            .categories()
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::not_found("category", id))?;
        let other = match direction {
            MoveDirection::Up if pos > 0 => pos - 1,
            MoveDirection::Down if pos + 1 < len => pos + 1,
            _ => return Ok(()),
        };
        let snapshot = self.state.clone();
        self.sort_categories();
        self.state.categories.swap(pos, other);
        renumber_categories(&mut self.state.categories);
        self.commit(snapshot)
    }

    /// Advance a recipe to the next category in display order. After the
    /// last category the recipe becomes uncategorized; from there it wraps
    /// to the first.
    pub fn cycle_recipe_category(&mut self, recipe_id: &str) -> Result<Option<String>> {
        let idx = self.recipe_index(recipe_id)?;
        let order: Vec<String> = self.categories().iter().map(|c| c.id.clone()).collect();
        let current = self.state.recipes[idx].category_id.as_deref();
        let next = match current.and_then(|id| order.iter().position(|c| c == id)) {
            Some(pos) => order.get(pos + 1).cloned(),
            None => order.first().cloned(),
        };
        let snapshot = self.state.clone();
        let recipe = &mut self.state.recipes[idx];
        recipe.category_id = next.clone();
        recipe.updated_at = now();
        self.commit(snapshot)?;
        Ok(next)
    }

    // --- Knowledge base ---

    /// Notes, most recently updated first.
    pub fn knowledge(&self) -> Vec<&Knowledge> {
        let mut notes: Vec<&Knowledge> = self.state.knowledge.iter().collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes
    }

    pub fn knowledge_note(&self, id: &str) -> Result<&Knowledge> {
        self.state
            .knowledge
            .iter()
            .find(|k| k.id == id)
            .ok_or_else(|| Error::not_found("note", id))
    }

    pub fn search_knowledge(&self, query: &str) -> Vec<&Knowledge> {
        let q = query.trim().to_lowercase();
        self.knowledge()
            .into_iter()
            .filter(|k| {
                q.is_empty()
                    || k.title.to_lowercase().contains(&q)
                    || k.content.to_lowercase().contains(&q)
                    || k.tags.iter().any(|t| t.to_lowercase().contains(&q))
            })
            .collect()
    }

    pub fn add_knowledge(&mut self, mut note: Knowledge) -> Result<&Knowledge> {
        note.title = note.title.trim().to_string();
        if note.title.is_empty() {
            return Err(Error::Empty("note title"));
        }
        if note.id.is_empty() || self.knowledge_note(&note.id).is_ok() {
            note.id = new_id();
        }
        let stamp = now();
        note.created_at = stamp;
        note.updated_at = stamp;
        let snapshot = self.state.clone();
        self.state.knowledge.push(note);
        self.commit(snapshot)?;
        Ok(&self.state.knowledge[self.state.knowledge.len() - 1])
    }

    pub fn update_knowledge(&mut self, mut note: Knowledge) -> Result<&Knowledge> {
        note.title = note.title.trim().to_string();
        if note.title.is_empty() {
            return Err(Error::Empty("note title"));
        }
        let idx = self
            .state
            .knowledge
            .iter()
            .position(|k| k.id == note.id)
            .ok_or_else(|| Error::not_found("note", &note.id))?;
        note.created_at = self.state.knowledge[idx].created_at;
        note.updated_at = now();
        let snapshot = self.state.clone();
        self.state.knowledge[idx] = note;
        self.commit(snapshot)?;
        Ok(&self.state.knowledge[idx])
    }

    pub fn delete_knowledge(&mut self, id: &str) -> Result<Knowledge> {
        let idx = self
            .state
            .knowledge
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| Error::not_found("note", id))?;
        let snapshot = self.state.clone();
        let removed = self.state.knowledge.remove(idx);
        self.commit(snapshot)?;
        Ok(removed)
    }

    // --- Backups ---

    pub fn export_backup(&self, path: &Path) -> Result<()> {
        store::write_backup(path, &self.state)?;
        tracing::info!(path = %path.display(), "backup exported");
        Ok(())
    }

    pub fn import_backup(&mut self, path: &Path, mode: ImportMode) -> Result<ImportSummary> {
        let incoming = store::read_backup(path)?;
        let snapshot = self.state.clone();
        let summary = match mode {
            ImportMode::Replace => {
                let summary = ImportSummary {
                    recipes: incoming.recipes.len(),
                    categories: incoming.categories.len(),
                    knowledge: incoming.knowledge.len(),
                };
                self.state = incoming;
                summary
            }
            ImportMode::Merge => self.merge(incoming),
        };
        self.commit(snapshot)?;
        tracing::info!(
            path = %path.display(),
            ?mode,
            recipes = summary.recipes,
            categories = summary.categories,
            knowledge = summary.knowledge,
            "backup imported"
        );
        Ok(summary)
    }

    fn merge(&mut self, incoming: AppState) -> ImportSummary {
        let mut summary = ImportSummary::default();

        let mut known: HashSet<String> =
            self.state.categories.iter().map(|c| c.id.clone()).collect();
        let offset = self.state.categories.len() as u32;
        for mut cat in incoming.categories {
            if cat.id.is_empty() {
                cat.id = new_id();
            }
            if !known.insert(cat.id.clone()) {
                continue;
            }
            cat.order += offset;
            self.state.categories.push(cat);
            summary.categories += 1;
        }
        self.sort_categories();

        let mut known: HashSet<String> = self.state.recipes.iter().map(|r| r.id.clone()).collect();
        for mut recipe in incoming.recipes {
            if recipe.id.is_empty() {
                recipe.id = new_id();
            }
            if !known.insert(recipe.id.clone()) {
                continue;
            }
            if let Some(cat) = recipe.category_id.as_deref() {
                if self.category(cat).is_none() {
                    recipe.category_id = None;
                }
            }
            self.state.recipes.push(recipe);
            summary.recipes += 1;
        }

        let mut known: HashSet<String> =
            self.state.knowledge.iter().map(|k| k.id.clone()).collect();
        for mut note in incoming.knowledge {
            if note.id.is_empty() {
                note.id = new_id();
            }
            if !known.insert(note.id.clone()) {
                continue;
            }
            self.state.knowledge.push(note);
            summary.knowledge += 1;
        }

        summary
    }
}
