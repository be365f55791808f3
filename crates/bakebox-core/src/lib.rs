pub mod error;
pub mod photo;
pub mod print;
pub mod scaling;
pub mod state;
pub mod store;

pub use error::{Error, Result};
pub use scaling::{Mold, MoldShape, ScaleMode, ScaledRecipe};
pub use state::{Bakebox, ImportMode, MoveDirection, RecipeFilter};
pub use store::{ImageSettings, Store};

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// --- Types (backup JSON is camelCase, timestamps in epoch millis) ---

/// Amounts that mean "use judgement" rather than a weighable quantity.
pub const AMOUNT_SENTINELS: &[&str] = &["to taste", "a pinch", "適量", "少々"];

/// An ingredient amount: a number, or free text such as "to taste".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Text(String::new())
    }
}

impl Amount {
    /// Numeric value, if any. Text that parses fully as a number counts.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Amount::Number(n) => *n,
            Amount::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    pub fn is_sentinel(&self) -> bool {
        match self {
            Amount::Number(_) => false,
            Amount::Text(s) => {
                let s = s.trim().to_lowercase();
                AMOUNT_SENTINELS.iter().any(|t| *t == s)
            }
        }
    }
}

impl From<f64> for Amount {
    fn from(n: f64) -> Self {
        Amount::Number(n)
    }
}

impl From<&str> for Amount {
    fn from(s: &str) -> Self {
        Amount::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    #[serde(default, deserialize_with = "nullable_amount")]
    pub amount: Amount,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub is_flour: bool,
}

/// `null` reads as an empty amount.
fn nullable_amount<'de, D>(deserializer: D) -> std::result::Result<Amount, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Amount>::deserialize(deserializer)?.unwrap_or_default())
}

impl Ingredient {
    pub fn new(name: &str, amount: impl Into<Amount>, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            amount: amount.into(),
            unit: unit.to_string(),
            is_flour: false,
        }
    }

    pub fn flour(name: &str, amount: impl Into<Amount>, unit: &str) -> Self {
        Self {
            is_flour: true,
            ..Self::new(name, amount, unit)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SectionKey {
    Main,
    LiquidStarter,
    Filling,
    Decoration,
    Custom,
}

impl SectionKey {
    /// Default display order.
    pub const ALL: [SectionKey; 5] = [
        SectionKey::Main,
        SectionKey::LiquidStarter,
        SectionKey::Filling,
        SectionKey::Decoration,
        SectionKey::Custom,
    ];

    pub fn from_key(key: &str) -> Option<SectionKey> {
        match key {
            "main" => Some(SectionKey::Main),
            "liquidStarter" => Some(SectionKey::LiquidStarter),
            "filling" => Some(SectionKey::Filling),
            "decoration" => Some(SectionKey::Decoration),
            "custom" => Some(SectionKey::Custom),
            _ => None,
        }
    }

    /// Fixed sections keep their quantities regardless of batch size.
    pub fn is_fixed(self) -> bool {
        matches!(
            self,
            SectionKey::Filling | SectionKey::Decoration | SectionKey::Custom
        )
    }

    pub fn title(self) -> &'static str {
        match self {
            SectionKey::Main => "Main dough",
            SectionKey::LiquidStarter => "Liquid starter",
            SectionKey::Filling => "Filling",
            SectionKey::Decoration => "Decoration",
            SectionKey::Custom => "Custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FermentationStage {
    pub name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub temperature: String,
    #[serde(default)]
    pub humidity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BakingStage {
    pub name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub temperature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    pub rating: u8,
    #[serde(default)]
    pub text: String,
    /// Photo as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    /// Empty until the recipe is first stored.
    #[serde(default)]
    pub id: String,
    pub title: String,
    /// Attribution: the baker or book the recipe came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub main: Vec<Ingredient>,
    #[serde(default)]
    pub liquid_starter: Vec<Ingredient>,
    #[serde(default)]
    pub filling: Vec<Ingredient>,
    #[serde(default)]
    pub decoration: Vec<Ingredient>,
    #[serde(default)]
    pub custom: Vec<Ingredient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_section_name: Option<String>,
    #[serde(default = "default_yield")]
    pub yield_quantity: f64,
    #[serde(default)]
    pub yield_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mold: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mold_size: Option<Mold>,
    #[serde(default)]
    pub fermentation: Vec<FermentationStage>,
    #[serde(default)]
    pub baking: Vec<BakingStage>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Recipe photo as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub logs: Vec<ExecutionLog>,
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default = "default_sections_order",
        deserialize_with = "lenient_sections_order"
    )]
    pub sections_order: Vec<SectionKey>,
}

fn default_yield() -> f64 {
    1.0
}

fn default_sections_order() -> Vec<SectionKey> {
    SectionKey::ALL.to_vec()
}

/// Unknown keys are skipped instead of failing the whole recipe.
fn lenient_sections_order<'de, D>(deserializer: D) -> std::result::Result<Vec<SectionKey>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    Ok(raw.iter().filter_map(|k| SectionKey::from_key(k)).collect())
}

impl Recipe {
    pub fn new(title: &str) -> Self {
        let stamp = now();
        Self {
            id: new_id(),
            title: title.to_string(),
            master: None,
            category_id: None,
            main: vec![],
            liquid_starter: vec![],
            filling: vec![],
            decoration: vec![],
            custom: vec![],
            custom_section_name: None,
            yield_quantity: default_yield(),
            yield_unit: String::new(),
            mold: None,
            mold_size: None,
            fermentation: vec![],
            baking: vec![],
            instructions: vec![],
            notes: String::new(),
            tags: vec![],
            image: None,
            logs: vec![],
            created_at: stamp,
            updated_at: stamp,
            sections_order: default_sections_order(),
        }
    }

    pub fn section(&self, key: SectionKey) -> &[Ingredient] {
        match key {
            SectionKey::Main => &self.main,
            SectionKey::LiquidStarter => &self.liquid_starter,
            SectionKey::Filling => &self.filling,
            SectionKey::Decoration => &self.decoration,
            SectionKey::Custom => &self.custom,
        }
    }

    pub fn section_mut(&mut self, key: SectionKey) -> &mut Vec<Ingredient> {
        match key {
            SectionKey::Main => &mut self.main,
            SectionKey::LiquidStarter => &mut self.liquid_starter,
            SectionKey::Filling => &mut self.filling,
            SectionKey::Decoration => &mut self.decoration,
            SectionKey::Custom => &mut self.custom,
        }
    }

    /// Display title of a section; the custom section may carry its own name.
    pub fn section_title(&self, key: SectionKey) -> &str {
        match (key, self.custom_section_name.as_deref()) {
            (SectionKey::Custom, Some(name)) if !name.trim().is_empty() => name,
            _ => key.title(),
        }
    }

    /// Make `sections_order` a permutation of every section key. Duplicates are
    /// dropped and missing keys appended in default order.
    pub fn normalize_sections_order(&mut self) {
        let mut order: Vec<SectionKey> = Vec::with_capacity(SectionKey::ALL.len());
        for key in self.sections_order.iter().chain(SectionKey::ALL.iter()) {
            if !order.contains(key) {
                order.push(*key);
            }
        }
        self.sections_order = order;
    }

    /// Every ingredient across all sections, in display order.
    pub fn ingredients(&self) -> impl Iterator<Item = &Ingredient> {
        self.sections_order
            .iter()
            .flat_map(move |key| self.section(*key).iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Knowledge {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Knowledge {
    pub fn new(title: &str, content: &str) -> Self {
        let stamp = now();
        Self {
            id: new_id(),
            title: title.to_string(),
            content: content.to_string(),
            tags: vec![],
            created_at: stamp,
            updated_at: stamp,
        }
    }
}

pub const STATE_VERSION: u32 = 1;

/// Everything the application owns. Serialized wholesale on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default = "state_version")]
    pub version: u32,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub knowledge: Vec<Knowledge>,
}

fn state_version() -> u32 {
    STATE_VERSION
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            recipes: vec![],
            categories: vec![],
            knowledge: vec![],
        }
    }
}

impl AppState {
    /// Repair invariants after loading data written by older or foreign tools.
    pub fn normalize(&mut self) {
        assign_unique_ids(&mut self.recipes, |r| &mut r.id);
        assign_unique_ids(&mut self.categories, |c| &mut c.id);
        assign_unique_ids(&mut self.knowledge, |k| &mut k.id);
        for recipe in &mut self.recipes {
            recipe.normalize_sections_order();
            assign_unique_ids(&mut recipe.logs, |l| &mut l.id);
        }
        self.categories.sort_by_key(|c| c.order);
        renumber_categories(&mut self.categories);
        self.version = STATE_VERSION;
    }
}

/// Give empty ids a fresh one and drop later records that repeat an id.
fn assign_unique_ids<T>(items: &mut Vec<T>, id_of: impl Fn(&mut T) -> &mut String) {
    let mut seen = HashSet::new();
    items.retain_mut(|item| {
        let id = id_of(item);
        if id.is_empty() {
            *id = new_id();
        }
        seen.insert(id.clone())
    });
}

/// Set each category's order to its position.
pub(crate) fn renumber_categories(categories: &mut [Category]) {
    for (i, c) in categories.iter_mut().enumerate() {
        c.order = i as u32;
    }
}

/// Current time at millisecond precision, matching the stored form.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parses_numbers_and_text() {
        let ing: Ingredient =
            serde_json::from_str(r#"{"name":"flour","amount":500,"unit":"g","isFlour":true}"#)
                .unwrap();
        assert_eq!(ing.amount, Amount::Number(500.0));
        assert!(ing.is_flour);

        let ing: Ingredient =
            serde_json::from_str(r#"{"name":"salt","amount":"to taste","unit":"g"}"#).unwrap();
        assert_eq!(ing.amount, Amount::Text("to taste".into()));
        assert!(ing.amount.is_sentinel());
        assert_eq!(ing.amount.as_number(), None);
    }

    #[test]
    fn numeric_text_counts_as_number() {
        assert_eq!(Amount::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(Amount::from("NaN").as_number(), None);
        assert_eq!(Amount::from("2 pieces").as_number(), None);
        assert!(!Amount::from("2 pieces").is_sentinel());
        assert!(Amount::from("適量").is_sentinel());
        assert!(Amount::from(" A Pinch ").is_sentinel());
    }

    #[test]
    fn sections_order_is_normalized_to_a_permutation() {
        let mut r = Recipe::new("Brioche");
        r.sections_order = vec![SectionKey::Filling, SectionKey::Main, SectionKey::Filling];
        r.normalize_sections_order();
        assert_eq!(r.sections_order.len(), SectionKey::ALL.len());
        assert_eq!(
            r.sections_order,
            vec![
                SectionKey::Filling,
                SectionKey::Main,
                SectionKey::LiquidStarter,
                SectionKey::Decoration,
                SectionKey::Custom,
            ]
        );
    }

    #[test]
    fn unknown_section_keys_are_skipped() {
        let r: Recipe = serde_json::from_str(
            r#"{"id":"r1","title":"Babka","sectionsOrder":["filling","topping","main"]}"#,
        )
        .unwrap();
        assert_eq!(r.sections_order, vec![SectionKey::Filling, SectionKey::Main]);
    }

    #[test]
    fn minimal_recipe_json_gets_defaults() {
        let r: Recipe = serde_json::from_str(r#"{"id":"r1","title":"Baguette"}"#).unwrap();
        assert_eq!(r.yield_quantity, 1.0);
        assert_eq!(r.sections_order, SectionKey::ALL.to_vec());
        assert!(r.logs.is_empty());
    }

    #[test]
    fn timestamps_serialize_as_millis() {
        let r: Recipe =
            serde_json::from_str(r#"{"id":"r1","title":"Baguette","createdAt":1700000000000}"#)
                .unwrap();
        assert_eq!(r.created_at.timestamp_millis(), 1_700_000_000_000);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["createdAt"], 1_700_000_000_000_i64);
        assert!(v.get("liquidStarter").is_some());
    }

    #[test]
    fn null_amount_reads_as_empty() {
        let ing: Ingredient =
            serde_json::from_str(r#"{"name":"water","amount":null,"unit":"g"}"#).unwrap();
        assert_eq!(ing.amount, Amount::Text(String::new()));
        assert_eq!(ing.amount.as_number(), None);
    }

    #[test]
    fn normalize_repairs_ids() {
        let mut state: AppState = serde_json::from_str(
            r#"{
                "recipes": [
                    {"id": "x", "title": "First"},
                    {"id": "x", "title": "Second"},
                    {"id": "", "title": "Third", "logs": [
                        {"id": "l", "date": "2024-01-01", "rating": 3},
                        {"id": "l", "date": "2024-01-02", "rating": 4}
                    ]}
                ],
                "categories": [
                    {"id": "c", "name": "Bread", "order": 4},
                    {"id": "c", "name": "Cake", "order": 9}
                ],
                "knowledge": [{"id": "", "title": "A"}, {"id": "", "title": "B"}]
            }"#,
        )
        .unwrap();
        state.normalize();

        let titles: Vec<&str> = state.recipes.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Third"]);
        assert!(!state.recipes[1].id.is_empty());
        assert_eq!(state.recipes[1].logs.len(), 1);
        assert_eq!(state.categories.len(), 1);
        assert_eq!(state.categories[0].order, 0);
        assert_eq!(state.knowledge.len(), 2);
        assert!(state.knowledge.iter().all(|k| !k.id.is_empty()));
        assert_ne!(state.knowledge[0].id, state.knowledge[1].id);
    }

    #[test]
    fn custom_section_title_uses_name() {
        let mut r = Recipe::new("Tart");
        assert_eq!(r.section_title(SectionKey::Custom), "Custom");
        r.custom_section_name = Some("Crumble".into());
        assert_eq!(r.section_title(SectionKey::Custom), "Crumble");
        assert_eq!(r.section_title(SectionKey::Filling), "Filling");
    }
}
