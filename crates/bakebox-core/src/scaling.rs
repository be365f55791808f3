//! Recipe scaling: yield and mold factors, per-section baker's percentages.
//!
//! Everything here is total. Degenerate input (zero yield, zero-volume molds,
//! missing amounts) falls back to an identity factor, a base of `1`, or a
//! skipped percentage; nothing returns an error.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{Amount, Ingredient, Recipe, SectionKey};

/// Label of a section base derived from flour-flagged ingredients.
pub const TOTAL_FLOUR_LABEL: &str = "total flour";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum MoldShape {
    Circular { diameter: f64 },
    Rectangular { length: f64, width: f64 },
}

/// Mold geometry. Units only need to agree between the two molds of a conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Mold {
    #[serde(flatten)]
    pub shape: MoldShape,
    /// Unset or non-positive heights count as `1`, so two area-only molds still compare.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl Mold {
    pub fn circular(diameter: f64, height: Option<f64>) -> Self {
        Self {
            shape: MoldShape::Circular { diameter },
            height,
        }
    }

    pub fn rectangular(length: f64, width: f64, height: Option<f64>) -> Self {
        Self {
            shape: MoldShape::Rectangular { length, width },
            height,
        }
    }

    pub fn volume(&self) -> f64 {
        mold_volume(self)
    }
}

/// `target / source`, or `1` when the source yield is not positive.
pub fn yield_factor(source: f64, target: f64) -> f64 {
    if !source.is_finite() || source <= 0.0 || !target.is_finite() {
        return 1.0;
    }
    target / source
}

pub fn mold_volume(mold: &Mold) -> f64 {
    let height = match mold.height {
        Some(h) if h.is_finite() && h > 0.0 => h,
        _ => 1.0,
    };
    let area = match mold.shape {
        MoldShape::Circular { diameter } if positive(diameter) => {
            let r = diameter / 2.0;
            PI * r * r
        }
        MoldShape::Rectangular { length, width } if positive(length) && positive(width) => {
            length * width
        }
        _ => return 0.0,
    };
    area * height
}

/// Ratio of target to source volume; `1` if either volume is degenerate.
pub fn mold_factor(source: &Mold, target: &Mold) -> f64 {
    let from = mold_volume(source);
    let to = mold_volume(target);
    if from <= 0.0 || to <= 0.0 {
        return 1.0;
    }
    to / from
}

fn positive(n: f64) -> bool {
    n.is_finite() && n > 0.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledAmount {
    pub display: String,
    pub unit: String,
    /// Unrounded scaled value, for numeric amounts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Scale one ingredient. Text amounts pass through; sentinels drop their unit.
pub fn scale_amount(ingredient: &Ingredient, factor: f64) -> ScaledAmount {
    if ingredient.amount.is_sentinel() {
        return ScaledAmount {
            display: amount_text(&ingredient.amount),
            unit: String::new(),
            value: None,
        };
    }
    match ingredient.amount.as_number() {
        Some(n) => {
            let value = n * factor;
            ScaledAmount {
                display: format_amount(value),
                unit: ingredient.unit.clone(),
                value: Some(value),
            }
        }
        None => ScaledAmount {
            display: amount_text(&ingredient.amount),
            unit: ingredient.unit.clone(),
            value: None,
        },
    }
}

fn amount_text(amount: &Amount) -> String {
    match amount {
        Amount::Number(n) => format_amount(*n),
        Amount::Text(s) => s.trim().to_string(),
    }
}

/// One decimal place, with a trailing `.0` stripped.
pub fn format_amount(value: f64) -> String {
    let mut rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 {
        rounded = 0.0; // no "-0"
    }
    let mut text = format!("{rounded:.1}");
    if text.ends_with(".0") {
        text.truncate(text.len() - 2);
    }
    text
}

/// Reference weight for the percentages of one ingredient section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionBase {
    pub value: f64,
    /// "total flour", the heaviest ingredient's name, or empty for the fallback.
    pub label: String,
}

impl SectionBase {
    pub fn is_fallback(&self) -> bool {
        self.label.is_empty()
    }
}

/// Flour sum when any flour is flagged, else the heaviest ingredient, else `1`.
///
/// The heaviest-ingredient fallback is a heuristic: a section without flour
/// (a filling, a custard) is expressed relative to its dominant ingredient.
pub fn section_base(ingredients: &[Ingredient]) -> SectionBase {
    let flour: f64 = ingredients
        .iter()
        .filter(|i| i.is_flour)
        .filter_map(|i| i.amount.as_number())
        .sum();
    if flour > 0.0 {
        return SectionBase {
            value: flour,
            label: TOTAL_FLOUR_LABEL.to_string(),
        };
    }

    let mut heaviest: Option<(&Ingredient, f64)> = None;
    for ingredient in ingredients {
        let Some(n) = ingredient.amount.as_number() else {
            continue;
        };
        if n > 0.0 && heaviest.map_or(true, |(_, max)| n > max) {
            heaviest = Some((ingredient, n));
        }
    }

    match heaviest {
        Some((ingredient, value)) => SectionBase {
            value,
            label: ingredient.name.clone(),
        },
        None => SectionBase {
            value: 1.0,
            label: String::new(),
        },
    }
}

/// `amount / base × 100`, skipped for text amounts or a non-positive base.
pub fn percentage(amount: &Amount, base: f64) -> Option<f64> {
    if !base.is_finite() || base <= 0.0 {
        return None;
    }
    amount.as_number().map(|n| n / base * 100.0)
}

pub fn format_percent(percent: f64) -> String {
    format!("{percent:.1}%")
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleMode {
    Identity,
    Yield { target: f64 },
    Mold { source: Mold, target: Mold },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledLine {
    pub name: String,
    pub display_amount: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_text: Option<String>,
    #[serde(default)]
    pub is_flour: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledSection {
    pub key: SectionKey,
    pub title: String,
    pub fixed: bool,
    pub base: SectionBase,
    pub lines: Vec<ScaledLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledRecipe {
    pub factor: f64,
    pub source_yield: f64,
    pub target_yield: f64,
    pub sections: Vec<ScaledSection>,
}

impl ScaledRecipe {
    pub fn section(&self, key: SectionKey) -> Option<&ScaledSection> {
        self.sections.iter().find(|s| s.key == key)
    }
}

/// Scale every section of a recipe. Fixed sections keep factor `1`, and each
/// section's base is recomputed from its own scaled contents.
pub fn scale_recipe(recipe: &Recipe, mode: &ScaleMode) -> ScaledRecipe {
    let source_yield = recipe.yield_quantity;
    let (factor, target_yield) = match mode {
        ScaleMode::Identity => (1.0, source_yield),
        ScaleMode::Yield { target } => {
            let factor = yield_factor(source_yield, *target);
            (factor, source_yield * factor)
        }
        ScaleMode::Mold { source, target } => {
            let factor = mold_factor(source, target);
            (factor, source_yield * factor)
        }
    };

    let sections = recipe
        .sections_order
        .iter()
        .filter(|key| !recipe.section(**key).is_empty())
        .map(|key| scale_section(recipe, *key, factor))
        .collect();

    ScaledRecipe {
        factor,
        source_yield,
        target_yield,
        sections,
    }
}

fn scale_section(recipe: &Recipe, key: SectionKey, factor: f64) -> ScaledSection {
    let factor = if key.is_fixed() { 1.0 } else { factor };

    let scaled: Vec<Ingredient> = recipe
        .section(key)
        .iter()
        .map(|ingredient| {
            let amount = match scale_amount(ingredient, factor).value {
                Some(v) => Amount::Number(v),
                None => ingredient.amount.clone(),
            };
            Ingredient {
                amount,
                ..ingredient.clone()
            }
        })
        .collect();

    let base = section_base(&scaled);
    let lines = scaled
        .iter()
        .map(|ingredient| {
            let shown = scale_amount(ingredient, 1.0);
            ScaledLine {
                name: ingredient.name.clone(),
                display_amount: shown.display,
                unit: shown.unit,
                percent_text: percentage(&ingredient.amount, base.value).map(format_percent),
                is_flour: ingredient.is_flour,
            }
        })
        .collect();

    ScaledSection {
        key,
        title: recipe.section_title(key).to_string(),
        fixed: key.is_fixed(),
        base,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_round_to_one_decimal() {
        assert_eq!(format_amount(600.0), "600");
        assert_eq!(format_amount(12.345), "12.3");
        assert_eq!(format_amount(2.96), "3");
        assert_eq!(format_amount(0.05), "0.1");
        assert_eq!(format_amount(-0.01), "0");
    }

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(format_percent(100.0), "100.0%");
        assert_eq!(format_percent(66.6666), "66.7%");
    }

    #[test]
    fn zero_source_yield_is_identity() {
        assert_eq!(yield_factor(0.0, 6.0), 1.0);
        assert_eq!(yield_factor(-2.0, 6.0), 1.0);
        assert_eq!(yield_factor(f64::NAN, 6.0), 1.0);
        assert_eq!(yield_factor(4.0, 6.0), 1.5);
    }

    #[test]
    fn degenerate_molds_have_no_volume() {
        assert_eq!(mold_volume(&Mold::circular(0.0, Some(5.0))), 0.0);
        assert_eq!(mold_volume(&Mold::rectangular(20.0, -1.0, None)), 0.0);
        assert_eq!(mold_volume(&Mold::rectangular(20.0, 10.0, None)), 200.0);
        assert_eq!(
            mold_factor(&Mold::circular(0.0, None), &Mold::circular(18.0, None)),
            1.0
        );
    }

    #[test]
    fn text_amount_keeps_unit_unless_sentinel() {
        let eggs = Ingredient::new("egg", "2 large", "pcs");
        let scaled = scale_amount(&eggs, 3.0);
        assert_eq!(scaled.display, "2 large");
        assert_eq!(scaled.unit, "pcs");
        assert_eq!(scaled.value, None);

        let salt = Ingredient::new("salt", "a pinch", "g");
        let scaled = scale_amount(&salt, 3.0);
        assert_eq!(scaled.display, "a pinch");
        assert_eq!(scaled.unit, "");
    }

    #[test]
    fn fallback_base_is_one() {
        let base = section_base(&[Ingredient::new("sesame", "to taste", "")]);
        assert_eq!(base.value, 1.0);
        assert!(base.is_fallback());
        assert_eq!(section_base(&[]).value, 1.0);
    }

    #[test]
    fn heaviest_tie_keeps_first() {
        let base = section_base(&[
            Ingredient::new("butter", 100.0, "g"),
            Ingredient::new("sugar", 100.0, "g"),
        ]);
        assert_eq!(base.label, "butter");
    }

    #[test]
    fn percentage_skips_text_and_bad_base() {
        assert_eq!(percentage(&Amount::Number(350.0), 500.0), Some(70.0));
        assert_eq!(percentage(&Amount::Number(350.0), 0.0), None);
        assert_eq!(percentage(&Amount::from("to taste"), 500.0), None);
    }

    #[test]
    fn mold_json_shape() {
        let mold: Mold =
            serde_json::from_str(r#"{"shape":"circular","diameter":15,"height":7.5}"#).unwrap();
        assert_eq!(mold, Mold::circular(15.0, Some(7.5)));
        let mold: Mold =
            serde_json::from_str(r#"{"shape":"rectangular","length":20,"width":10}"#).unwrap();
        assert_eq!(mold.height, None);
    }
}
