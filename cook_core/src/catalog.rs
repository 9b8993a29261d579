//! Recipe catalog: the built-in recipes plus JSON-backed admin edits.
//!
//! The catalog is read by the browsing commands and by a cooking session
//! (which clones one recipe out of it). Admin commands mutate it and save it
//! back atomically.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// All recipes known to the app, in insertion order
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub recipes: Vec<Recipe>,
}

/// Cached built-in catalog
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached built-in catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds a fresh copy of the built-in catalog
///
/// Prefer `get_default_catalog()`, which builds it only once.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

fn ingredient(id: &str, name: &str, quantity: f64, unit: &str) -> Ingredient {
    Ingredient {
        id: id.into(),
        name: name.into(),
        quantity,
        unit: unit.into(),
        image_url: None,
    }
}

fn step(
    id: &str,
    step_number: u32,
    instruction: &str,
    timer_seconds: Option<i64>,
    temperature: Option<&str>,
    ingredient_ids: &[&str],
) -> Step {
    Step {
        id: id.into(),
        step_number,
        instruction: instruction.into(),
        image_url: None,
        timer_seconds,
        temperature: temperature.map(Into::into),
        ingredient_ids: ingredient_ids.iter().map(|s| s.to_string()).collect(),
    }
}

fn build_default_catalog_internal() -> Catalog {
    let mut recipes = Vec::new();

    // ========================================================================
    // Beverages
    // ========================================================================

    recipes.push(Recipe {
        id: "masala_chai".into(),
        name: "Masala Chai".into(),
        category: "Beverage".into(),
        description: Some("Milky spiced tea brewed with ginger and cardamom.".into()),
        image_url: None,
        visibility: true,
        prep_time: Some("5 mins".into()),
        cook_time: Some("10 mins".into()),
        total_time: Some("15 mins".into()),
        servings: Some(2),
        nutrition_per_serving: Some(NutritionalInfo {
            calories: Some(110.0),
            protein: Some(4.0),
            fat: Some(4.5),
            carbs: Some(14.0),
        }),
        ingredients: vec![
            ingredient("chai_water", "Water", 250.0, "ml"),
            ingredient("chai_ginger", "Ginger, crushed", 10.0, "g"),
            ingredient("chai_cardamom", "Green cardamom", 3.0, "pods"),
            ingredient("chai_tea", "Black tea leaves", 2.0, "tsp"),
            ingredient("chai_milk", "Milk", 250.0, "ml"),
            ingredient("chai_sugar", "Sugar", 2.0, "tsp"),
        ],
        steps: vec![
            step(
                "chai_s1",
                1,
                "Bring the water to a boil with the ginger and cardamom.",
                Some(180),
                Some("High heat"),
                &["chai_water", "chai_ginger", "chai_cardamom"],
            ),
            step(
                "chai_s2",
                2,
                "Add the tea leaves and simmer until the water turns deep amber.",
                Some(120),
                Some("Medium heat"),
                &["chai_tea"],
            ),
            step(
                "chai_s3",
                3,
                "Pour in the milk and sugar and bring back to a gentle boil.",
                Some(240),
                Some("Medium heat"),
                &["chai_milk", "chai_sugar"],
            ),
            step(
                "chai_s4",
                4,
                "Strain into cups and serve hot.",
                None,
                None,
                &[],
            ),
        ],
    });

    // ========================================================================
    // Mains
    // ========================================================================

    recipes.push(Recipe {
        id: "aglio_olio".into(),
        name: "Spaghetti Aglio e Olio".into(),
        category: "Main".into(),
        description: Some("Spaghetti tossed in garlic-infused olive oil with chilli.".into()),
        image_url: None,
        visibility: true,
        prep_time: Some("10 mins".into()),
        cook_time: Some("12 mins".into()),
        total_time: Some("22 mins".into()),
        servings: Some(2),
        nutrition_per_serving: Some(NutritionalInfo {
            calories: Some(520.0),
            protein: Some(14.0),
            fat: Some(20.0),
            carbs: Some(70.0),
        }),
        ingredients: vec![
            ingredient("ao_spaghetti", "Spaghetti", 200.0, "g"),
            ingredient("ao_garlic", "Garlic, thinly sliced", 4.0, "cloves"),
            ingredient("ao_oil", "Olive oil", 4.0, "tbsp"),
            ingredient("ao_chilli", "Chilli flakes", 0.5, "tsp"),
            ingredient("ao_parsley", "Parsley, chopped", 2.0, "tbsp"),
        ],
        steps: vec![
            step(
                "ao_s1",
                1,
                "Cook the spaghetti in well salted boiling water until al dente.",
                Some(600),
                Some("High heat"),
                &["ao_spaghetti"],
            ),
            step(
                "ao_s2",
                2,
                "Meanwhile, warm the oil and gently fry the garlic and chilli until golden.",
                Some(180),
                Some("Low heat"),
                &["ao_oil", "ao_garlic", "ao_chilli"],
            ),
            step(
                "ao_s3",
                3,
                "Toss the drained pasta in the pan with a splash of pasta water and the parsley.",
                None,
                None,
                &["ao_parsley"],
            ),
        ],
    });

    recipes.push(Recipe {
        id: "dal_tadka".into(),
        name: "Dal Tadka".into(),
        category: "Main".into(),
        description: Some("Yellow lentils finished with a sizzling cumin tempering.".into()),
        image_url: None,
        visibility: true,
        prep_time: Some("10 mins".into()),
        cook_time: Some("30 mins".into()),
        total_time: Some("40 mins".into()),
        servings: Some(4),
        nutrition_per_serving: Some(NutritionalInfo {
            calories: Some(230.0),
            protein: Some(12.0),
            fat: Some(7.0),
            carbs: Some(30.0),
        }),
        ingredients: vec![
            ingredient("dal_lentils", "Toor dal, rinsed", 200.0, "g"),
            ingredient("dal_water", "Water", 700.0, "ml"),
            ingredient("dal_turmeric", "Turmeric", 0.5, "tsp"),
            ingredient("dal_ghee", "Ghee", 2.0, "tbsp"),
            ingredient("dal_cumin", "Cumin seeds", 1.0, "tsp"),
            ingredient("dal_garlic", "Garlic, chopped", 3.0, "cloves"),
        ],
        steps: vec![
            step(
                "dal_s1",
                1,
                "Simmer the lentils with the water and turmeric until soft.",
                Some(1500),
                Some("Medium heat"),
                &["dal_lentils", "dal_water", "dal_turmeric"],
            ),
            step(
                "dal_s2",
                2,
                "Heat the ghee, then fry the cumin and garlic until fragrant.",
                Some(60),
                Some("Medium heat"),
                &["dal_ghee", "dal_cumin", "dal_garlic"],
            ),
            step(
                "dal_s3",
                3,
                "Pour the tempering over the dal, stir and season with salt.",
                None,
                None,
                &[],
            ),
        ],
    });

    // ========================================================================
    // Breakfast
    // ========================================================================

    recipes.push(Recipe {
        id: "poha".into(),
        name: "Kanda Poha".into(),
        category: "Breakfast".into(),
        description: Some("Flattened rice with onion, mustard seeds and peanuts.".into()),
        image_url: None,
        visibility: true,
        prep_time: Some("10 mins".into()),
        cook_time: Some("10 mins".into()),
        total_time: Some("20 mins".into()),
        servings: Some(2),
        nutrition_per_serving: None,
        ingredients: vec![
            ingredient("poha_rice", "Thick poha", 150.0, "g"),
            ingredient("poha_oil", "Oil", 1.5, "tbsp"),
            ingredient("poha_mustard", "Mustard seeds", 1.0, "tsp"),
            ingredient("poha_onion", "Onion, diced", 1.0, "whole"),
            ingredient("poha_peanuts", "Peanuts", 30.0, "g"),
        ],
        steps: vec![
            step(
                "poha_s1",
                1,
                "Rinse the poha in a sieve and let it soften.",
                Some(300),
                None,
                &["poha_rice"],
            ),
            step(
                "poha_s2",
                2,
                "Splutter the mustard seeds in hot oil, then fry the peanuts and onion.",
                Some(240),
                Some("Medium heat"),
                &["poha_oil", "poha_mustard", "poha_peanuts", "poha_onion"],
            ),
            step(
                "poha_s3",
                3,
                "Fold in the poha, cover and steam briefly before serving.",
                Some(120),
                Some("Low heat"),
                &[],
            ),
        ],
    });

    Catalog { recipes }
}

impl Catalog {
    /// Load a catalog from a JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&contents)?;
        tracing::info!("Loaded {} recipes from {:?}", catalog.recipes.len(), path);
        Ok(catalog)
    }

    /// Load the saved catalog, or the built-in one if nothing was saved yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::info!("No catalog at {:?}, using built-in recipes", path);
            Ok(get_default_catalog().clone())
        }
    }

    /// Save atomically (temp file, fsync, rename)
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        let contents = serde_json::to_string_pretty(self)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved {} recipes to {:?}", self.recipes.len(), path);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.id == id)
    }

    /// Recipe by id, as an error if missing
    pub fn require(&self, id: &str) -> Result<&Recipe> {
        self.get(id)
            .ok_or_else(|| Error::RecipeNotFound(id.to_string()))
    }

    /// Visible recipes sorted by name
    pub fn visible(&self) -> Vec<&Recipe> {
        let mut recipes: Vec<&Recipe> = self.recipes.iter().filter(|r| r.visibility).collect();
        recipes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        recipes
    }

    /// Distinct categories of visible recipes, sorted
    pub fn categories(&self) -> Vec<String> {
        self.recipes
            .iter()
            .filter(|r| r.visibility)
            .map(|r| r.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Visible recipes whose name, category or description contains `query`
    pub fn search(&self, query: &str) -> Vec<&Recipe> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.visible();
        }
        self.visible()
            .into_iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle)
                    || r.category.to_lowercase().contains(&needle)
                    || r
                        .description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .collect()
    }

    /// Insert a new recipe or replace the one with the same id
    ///
    /// Returns `true` if an existing recipe was replaced.
    pub fn upsert(&mut self, recipe: Recipe) -> bool {
        match self.recipes.iter_mut().find(|r| r.id == recipe.id) {
            Some(existing) => {
                *existing = recipe;
                true
            }
            None => {
                self.recipes.push(recipe);
                false
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<Recipe> {
        let pos = self
            .recipes
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::RecipeNotFound(id.to_string()))?;
        Ok(self.recipes.remove(pos))
    }

    /// Flip a recipe's visibility and return the new value
    pub fn toggle_visibility(&mut self, id: &str) -> Result<bool> {
        let recipe = self
            .recipes
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::RecipeNotFound(id.to_string()))?;
        recipe.visibility = !recipe.visibility;
        Ok(recipe.visibility)
    }

    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen_ids = HashSet::new();

        for recipe in &self.recipes {
            if recipe.id.trim().is_empty() {
                errors.push(format!("Recipe '{}' has empty ID", recipe.name));
            } else if !seen_ids.insert(recipe.id.as_str()) {
                errors.push(format!("Duplicate recipe ID '{}'", recipe.id));
            }
            errors.extend(validate_recipe(recipe));
        }

        errors
    }
}

/// Validation messages for a single recipe
pub fn validate_recipe(recipe: &Recipe) -> Vec<String> {
    let id = &recipe.id;
    let mut errors = Vec::new();

    if recipe.name.trim().chars().count() < 3 {
        errors.push(format!(
            "Recipe '{}': name must be at least 3 characters",
            id
        ));
    }
    if recipe.category.trim().is_empty() {
        errors.push(format!("Recipe '{}': category is required", id));
    }
    if recipe.servings == Some(0) {
        errors.push(format!("Recipe '{}': servings must be positive", id));
    }
    if recipe.ingredients.is_empty() {
        errors.push(format!("Recipe '{}': at least one ingredient is required", id));
    }
    if recipe.steps.is_empty() {
        errors.push(format!("Recipe '{}': at least one step is required", id));
    }

    for ing in &recipe.ingredients {
        if ing.name.trim().is_empty() {
            errors.push(format!("Recipe '{}': ingredient '{}' has empty name", id, ing.id));
        }
        if ing.unit.trim().is_empty() {
            errors.push(format!("Recipe '{}': ingredient '{}' has empty unit", id, ing.id));
        }
        if ing.quantity < 0.0 || ing.quantity.is_nan() {
            errors.push(format!(
                "Recipe '{}': ingredient '{}' quantity {} must not be negative",
                id, ing.id, ing.quantity
            ));
        }
    }

    for (index, step) in recipe.steps.iter().enumerate() {
        let expected = index as u32 + 1;
        if step.step_number != expected {
            errors.push(format!(
                "Recipe '{}': step {} found where step {} was expected",
                id, step.step_number, expected
            ));
        }
        if step.instruction.trim().is_empty() {
            errors.push(format!(
                "Recipe '{}': step {} has empty instruction",
                id, step.step_number
            ));
        }
        if matches!(step.timer_seconds, Some(secs) if secs < 0) {
            errors.push(format!(
                "Recipe '{}': step {} has negative timer",
                id, step.step_number
            ));
        }
        for ing_id in &step.ingredient_ids {
            if !recipe.ingredients.iter().any(|ing| &ing.id == ing_id) {
                errors.push(format!(
                    "Recipe '{}': step {} references non-existent ingredient '{}'",
                    id, step.step_number, ing_id
                ));
            }
        }
    }

    errors
}
