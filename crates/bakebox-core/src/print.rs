use crate::scaling::{format_amount, ScaledRecipe, ScaledSection};
use crate::{Knowledge, MoldShape, Recipe};

/// Render a recipe as a plain-text sheet suitable for printing.
pub fn render_recipe(recipe: &Recipe, scaled: &ScaledRecipe, category: Option<&str>) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(&recipe.title);
    out.push('\n');
    out.push_str(&"=".repeat(recipe.title.chars().count().max(3)));
    out.push('\n');
    if let Some(master) = recipe.master.as_deref().filter(|m| !m.is_empty()) {
        out.push_str("By: ");
        out.push_str(master);
        out.push('\n');
    }
    if let Some(cat) = category {
        out.push_str("Category: ");
        out.push_str(cat);
        out.push('\n');
    }

    out.push_str("Yield: ");
    out.push_str(&format_amount(scaled.target_yield));
    if !recipe.yield_unit.is_empty() {
        out.push(' ');
        out.push_str(&recipe.yield_unit);
    }
    if scaled.factor != 1.0 {
        out.push_str(&format!(
            " (scaled x{} from {})",
            trim_factor(scaled.factor),
            format_amount(scaled.source_yield)
        ));
    }
    out.push('\n');
    if let Some(mold) = mold_line(recipe) {
        out.push_str("Mold: ");
        out.push_str(&mold);
        out.push('\n');
    }

    for section in &scaled.sections {
        out.push('\n');
        render_section(&mut out, section);
    }

    if !recipe.fermentation.is_empty() {
        out.push_str("\nFermentation\n");
        for stage in &recipe.fermentation {
            out.push_str("  - ");
            out.push_str(&stage.name);
            push_field(&mut out, &stage.time);
            push_field(&mut out, &stage.temperature);
            if !stage.humidity.is_empty() {
                out.push_str(", ");
                out.push_str(&stage.humidity);
                out.push_str(" RH");
            }
            push_note(&mut out, &stage.note);
            out.push('\n');
        }
    }

    if !recipe.baking.is_empty() {
        out.push_str("\nBaking\n");
        for stage in &recipe.baking {
            out.push_str("  - ");
            out.push_str(&stage.name);
            push_field(&mut out, &stage.time);
            push_field(&mut out, &stage.temperature);
            push_note(&mut out, &stage.note);
            out.push('\n');
        }
    }

    let steps: Vec<&str> = recipe
        .instructions
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !steps.is_empty() {
        out.push_str("\nMethod\n");
        for (i, step) in steps.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, step));
        }
    }

    if !recipe.notes.trim().is_empty() {
        out.push_str("\nNotes\n");
        for line in recipe.notes.trim().lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }

    if !recipe.tags.is_empty() {
        out.push_str("\nTags: ");
        out.push_str(&recipe.tags.join(", "));
        out.push('\n');
    }

    out
}

fn render_section(out: &mut String, section: &ScaledSection) {
    out.push_str(&section.title);
    if section.fixed {
        out.push_str(" (fixed)");
    }
    if !section.base.is_fallback() {
        out.push_str(" [100% = ");
        out.push_str(&section.base.label);
        out.push_str(", ");
        out.push_str(&format_amount(section.base.value));
        out.push(']');
    }
    out.push('\n');

    let width = section
        .lines
        .iter()
        .map(|l| l.name.chars().count())
        .max()
        .unwrap_or(0);
    for line in &section.lines {
        let mut amount = line.display_amount.clone();
        if !line.unit.is_empty() {
            amount.push(' ');
            amount.push_str(&line.unit);
        }
        out.push_str(&format!("  {:<width$}  {:>10}", line.name, amount, width = width));
        if let Some(pct) = &line.percent_text {
            out.push_str(&format!("  {pct:>7}"));
        }
        out.push('\n');
    }
}

fn mold_line(recipe: &Recipe) -> Option<String> {
    let name = recipe.mold.as_deref().filter(|m| !m.is_empty());
    let size = recipe.mold_size.map(|m| {
        let plan = match m.shape {
            MoldShape::Circular { diameter } => format!("ø{}", format_amount(diameter)),
            MoldShape::Rectangular { length, width } => {
                format!("{}x{}", format_amount(length), format_amount(width))
            }
        };
        match m.height {
            Some(h) if h > 0.0 => format!("{plan}, h{}", format_amount(h)),
            _ => plan,
        }
    });
    match (name, size) {
        (Some(n), Some(s)) => Some(format!("{n} ({s})")),
        (Some(n), None) => Some(n.to_string()),
        (None, Some(s)) => Some(s),
        (None, None) => None,
    }
}

fn trim_factor(factor: f64) -> String {
    let text = format!("{factor:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn push_field(out: &mut String, value: &str) {
    if !value.is_empty() {
        out.push_str(", ");
        out.push_str(value);
    }
}

fn push_note(out: &mut String, note: &str) {
    if !note.is_empty() {
        out.push_str(" (");
        out.push_str(note);
        out.push(')');
    }
}

pub fn render_knowledge(note: &Knowledge) -> String {
    let mut out = String::new();
    out.push_str(&note.title);
    out.push('\n');
    out.push_str(&"-".repeat(note.title.chars().count().max(3)));
    out.push('\n');
    out.push_str(note.content.trim());
    out.push('\n');
    if !note.tags.is_empty() {
        out.push_str("\nTags: ");
        out.push_str(&note.tags.join(", "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::{scale_recipe, ScaleMode};
    use crate::{BakingStage, Ingredient, Mold};

    fn focaccia() -> Recipe {
        let mut r = Recipe::new("Focaccia");
        r.master = Some("Nonna".into());
        r.yield_quantity = 1.0;
        r.yield_unit = "tray".into();
        r.mold = Some("Sheet pan".into());
        r.mold_size = Some(Mold::rectangular(30.0, 20.0, Some(4.0)));
        r.main = vec![
            Ingredient::flour("bread flour", 500.0, "g"),
            Ingredient::new("water", 400.0, "g"),
            Ingredient::new("salt", "to taste", "g"),
        ];
        r.decoration = vec![Ingredient::new("rosemary", 5.0, "g")];
        r.baking = vec![BakingStage {
            name: "Bake".into(),
            time: "25 min".into(),
            temperature: "230°C".into(),
            note: String::new(),
        }];
        r.instructions = vec!["Mix".into(), "  ".into(), "Dimple and bake".into()];
        r.tags = vec!["bread".into()];
        r
    }

    #[test]
    fn renders_scaled_sheet() {
        let recipe = focaccia();
        let scaled = scale_recipe(&recipe, &ScaleMode::Yield { target: 2.0 });
        let text = render_recipe(&recipe, &scaled, Some("Bread"));

        assert!(text.starts_with("Focaccia\n========\n"));
        assert!(text.contains("By: Nonna\n"));
        assert!(text.contains("Category: Bread\n"));
        assert!(text.contains("Yield: 2 tray (scaled x2 from 1)\n"));
        assert!(text.contains("Mold: Sheet pan (30x20, h4)\n"));
        assert!(text.contains("Main dough [100% = total flour, 1000]\n"));
        assert!(text.contains("1000 g"));
        assert!(text.contains("80.0%"));
        assert!(text.contains("Decoration (fixed) [100% = rosemary, 5]\n"));
        assert!(text.contains("  - Bake, 25 min, 230°C\n"));
        assert!(text.contains("  1. Mix\n  2. Dimple and bake\n"));
        assert!(text.contains("Tags: bread\n"));
    }

    #[test]
    fn unscaled_sheet_has_no_factor() {
        let recipe = focaccia();
        let scaled = scale_recipe(&recipe, &ScaleMode::Identity);
        let text = render_recipe(&recipe, &scaled, None);
        assert!(text.contains("Yield: 1 tray\n"));
        assert!(!text.contains("Category:"));
        let salt = text.lines().find(|l| l.contains("salt")).unwrap();
        assert!(salt.trim_end().ends_with("to taste"));
    }

    #[test]
    fn factor_is_trimmed() {
        assert_eq!(trim_factor(1.5), "1.5");
        assert_eq!(trim_factor(2.0), "2");
        assert_eq!(trim_factor(1.44), "1.44");
    }

    #[test]
    fn knowledge_sheet() {
        let mut note = Knowledge::new("Autolyse", "Rest flour and water 30 min.\n");
        note.tags = vec!["technique".into()];
        let text = render_knowledge(&note);
        assert_eq!(
            text,
            "Autolyse\n--------\nRest flour and water 30 min.\n\nTags: technique\n"
        );
    }
}
