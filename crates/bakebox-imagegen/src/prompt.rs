use bakebox_core::{Recipe, SectionKey};

/// Ingredients named in the prompt, per section.
const MAX_PROMPT_INGREDIENTS: usize = 8;

/// Describe a recipe as a food-photography prompt.
pub fn photo_prompt(recipe: &Recipe, extra: Option<&str>) -> String {
    let mut out = String::with_capacity(512);
    out.push_str("A professional, appetizing food photograph of \"");
    out.push_str(&recipe.title);
    out.push_str("\", a freshly baked item");
    if let Some(mold) = recipe.mold.as_deref().filter(|m| !m.is_empty()) {
        out.push_str(" baked in a ");
        out.push_str(mold);
    }
    out.push('.');

    let names: Vec<&str> = [SectionKey::Main, SectionKey::Filling, SectionKey::Decoration]
        .iter()
        .flat_map(|key| {
            recipe
                .section(*key)
                .iter()
                .take(MAX_PROMPT_INGREDIENTS)
                .map(|i| i.name.trim())
        })
        .filter(|n| !n.is_empty())
        .collect();
    if !names.is_empty() {
        out.push_str(" Made with ");
        out.push_str(&names.join(", "));
        out.push('.');
    }

    if !recipe.tags.is_empty() {
        out.push_str(" Style: ");
        out.push_str(&recipe.tags.join(", "));
        out.push('.');
    }

    out.push_str(
        " Natural window light, shallow depth of field, rustic wooden table, \
no text, no watermark, no people.",
    );

    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        out.push(' ');
        out.push_str(extra);
    }
    out
}

/// Wrap a user's edit instruction so the model keeps the photo realistic.
pub fn edit_prompt(instruction: &str) -> String {
    format!(
        "Edit this food photograph: {}. Keep it photorealistic and keep the baked item recognizable. \
Do not add text or watermarks.",
        instruction.trim().trim_end_matches('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakebox_core::Ingredient;

    #[test]
    fn prompt_names_the_bake() {
        let mut r = Recipe::new("Kouign-amann");
        r.mold = Some("muffin tin".into());
        r.main = vec![
            Ingredient::flour("flour", 500.0, "g"),
            Ingredient::new("  ", 1.0, "g"),
        ];
        r.decoration = vec![Ingredient::new("caramelized sugar", 50.0, "g")];
        r.liquid_starter = vec![Ingredient::new("levain", 100.0, "g")];
        r.tags = vec!["breton".into()];

        let p = photo_prompt(&r, Some("  overhead shot "));
        assert!(p.starts_with("A professional, appetizing food photograph of \"Kouign-amann\""));
        assert!(p.contains("baked in a muffin tin."));
        assert!(p.contains("Made with flour, caramelized sugar."));
        assert!(!p.contains("levain"));
        assert!(p.contains("Style: breton."));
        assert!(p.ends_with("no people. overhead shot"));
    }

    #[test]
    fn bare_recipe_prompt() {
        let p = photo_prompt(&Recipe::new("Scone"), None);
        assert!(!p.contains("Made with"));
        assert!(p.ends_with("no people."));
    }

    #[test]
    fn edit_prompt_wraps_instruction() {
        assert_eq!(
            edit_prompt(" add powdered sugar. "),
            "Edit this food photograph: add powdered sugar. Keep it photorealistic and keep \
the baked item recognizable. Do not add text or watermarks."
        );
    }
}
