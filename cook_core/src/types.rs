//! Core domain types for Cookalong.
//!
//! This module defines the fundamental types used throughout the system:
//! - Recipes, their ingredients and ordered steps
//! - Voice languages offered for narration
//! - User preferences captured before a cooking session
//! - Post-cook feedback and preparation log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Recipe Types
// ============================================================================

/// A single ingredient of a recipe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Ingredient {
    /// Human readable "quantity unit name", e.g. `200 g Spaghetti`
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.quantity, self.unit, self.name)
    }
}

/// One instruction unit of a recipe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: String,
    /// 1-based ordinal, contiguous within a recipe
    pub step_number: u32,
    pub instruction: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Countdown in whole seconds; absent or <= 0 means no timer
    #[serde(default)]
    pub timer_seconds: Option<i64>,
    #[serde(default)]
    pub temperature: Option<String>,
    #[serde(default)]
    pub ingredient_ids: Vec<String>,
}

impl Step {
    /// Positive timer duration in seconds, if this step has a timer
    pub fn timer_duration(&self) -> Option<u32> {
        self.timer_seconds
            .filter(|secs| *secs > 0)
            .map(|secs| secs.min(u32::MAX as i64) as u32)
    }
}

/// Nutritional values per serving
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct NutritionalInfo {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
}

fn default_visibility() -> bool {
    true
}

/// A complete recipe as stored in the catalog
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub total_time: Option<String>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub nutrition_per_serving: Option<NutritionalInfo>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
}

impl Recipe {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Ingredients referenced by a step, in recipe order
    ///
    /// Unknown references are ignored here; the catalog validator reports them.
    pub fn linked_ingredients(&self, step: &Step) -> Vec<&Ingredient> {
        if step.ingredient_ids.is_empty() {
            return Vec::new();
        }
        self.ingredients
            .iter()
            .filter(|ing| step.ingredient_ids.iter().any(|id| id == &ing.id))
            .collect()
    }
}

// ============================================================================
// Voice Languages
// ============================================================================

/// Language chosen for spoken step instructions
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum VoiceLanguage {
    /// No narration at all
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "kn")]
    Kannada,
}

impl VoiceLanguage {
    pub const ALL: [VoiceLanguage; 4] = [
        VoiceLanguage::None,
        VoiceLanguage::English,
        VoiceLanguage::Hindi,
        VoiceLanguage::Kannada,
    ];

    /// Short code persisted in preferences and logs
    pub fn code(&self) -> &'static str {
        match self {
            VoiceLanguage::None => "none",
            VoiceLanguage::English => "en",
            VoiceLanguage::Hindi => "hi",
            VoiceLanguage::Kannada => "kn",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VoiceLanguage::None => "No sound",
            VoiceLanguage::English => "English",
            VoiceLanguage::Hindi => "हिंदी (Hindi)",
            VoiceLanguage::Kannada => "ಕನ್ನಡ (Kannada)",
        }
    }

    /// BCP-47 tag handed to the speech engine
    pub fn speech_tag(&self) -> Option<&'static str> {
        match self {
            VoiceLanguage::None => None,
            VoiceLanguage::English => Some("en-US"),
            VoiceLanguage::Hindi => Some("hi-IN"),
            VoiceLanguage::Kannada => Some("kn-IN"),
        }
    }

    /// Language name handed to the translation service
    pub fn translate_name(&self) -> Option<&'static str> {
        match self {
            VoiceLanguage::None => None,
            VoiceLanguage::English => Some("English"),
            VoiceLanguage::Hindi => Some("Hindi"),
            VoiceLanguage::Kannada => Some("Kannada"),
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, VoiceLanguage::None)
    }

    /// Whether narration text must go through translation before speech
    pub fn needs_translation(&self) -> bool {
        matches!(self.translate_name(), Some(name) if name != "English")
    }
}

impl fmt::Display for VoiceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for VoiceLanguage {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let wanted = s.trim().to_lowercase();
        VoiceLanguage::ALL
            .into_iter()
            .find(|lang| {
                lang.code() == wanted
                    || lang
                        .translate_name()
                        .map(|name| name.to_lowercase() == wanted)
                        .unwrap_or(false)
            })
            .ok_or_else(|| crate::Error::Config(format!("Unknown voice language: {}", s)))
    }
}

// ============================================================================
// User Preferences
// ============================================================================

/// Who is cooking and how they want to hear instructions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub user_name: String,
    #[serde(default)]
    pub voice_language: VoiceLanguage,
}

impl UserPreferences {
    /// Build preferences for a name-identified cook with a fresh user id
    pub fn new(user_name: &str, voice_language: VoiceLanguage) -> crate::Result<Self> {
        Self::with_user_id(Uuid::new_v4(), user_name, voice_language)
    }

    /// Preferences for a cook known only by name
    ///
    /// The user id is derived from the trimmed, lowercased name, so the same
    /// name always maps to the same id across sessions.
    pub fn for_name(user_name: &str, voice_language: VoiceLanguage) -> crate::Result<Self> {
        let key = format!("cookalong:{}", user_name.trim().to_lowercase());
        let user_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        Self::with_user_id(user_id, user_name, voice_language)
    }

    pub fn with_user_id(
        user_id: Uuid,
        user_name: &str,
        voice_language: VoiceLanguage,
    ) -> crate::Result<Self> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(crate::Error::Config("Please enter your name.".into()));
        }
        Ok(Self {
            user_id,
            user_name: user_name.to_string(),
            voice_language,
        })
    }
}

// ============================================================================
// Feedback and Preparation Logs
// ============================================================================

/// Post-cook feedback entered in the feedback phase
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Feedback {
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub product_weight: Option<String>,
    #[serde(default)]
    pub num_preps: Option<u32>,
    #[serde(default)]
    pub is_wasted: bool,
}

/// Opaque handle issued by the log store when a session starts
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct LogId(pub Uuid);

impl LogId {
    pub fn new() -> Self {
        LogId(Uuid::new_v4())
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One recipe preparation as seen by the admin log view
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrepLog {
    pub id: LogId,
    pub user_id: Uuid,
    pub user_name_snapshot: String,
    pub recipe_id: String,
    pub recipe_name_snapshot: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub language_used: String,
    pub completed_all_steps: bool,
    pub feedback: Option<Feedback>,
}

impl PrepLog {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}
