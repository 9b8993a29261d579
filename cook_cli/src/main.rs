use clap::{Parser, Subcommand};
use cook_core::adapters::{speaker_from_config, translator_from_config};
use cook_core::catalog::validate_recipe;
use cook_core::report::{export_csv, format_duration, summarize_preparations, wasted_label};
use cook_core::services::{SpeechEvent, SpeechNotifier, Utterance};
use cook_core::session::{Phase, TimerView};
use cook_core::*;
use crossbeam_channel::Sender;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "cookalong")]
#[command(about = "Browse recipes and cook along step by step", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the timer tick interval (milliseconds)
    #[arg(long, global = true, hide = true)]
    tick_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List visible recipes (default)
    List {
        /// Only recipes in this category
        #[arg(long)]
        category: Option<String>,

        /// Case-insensitive text search
        #[arg(long)]
        search: Option<String>,
    },

    /// Show a recipe with its ingredients and steps
    Show { recipe_id: String },

    /// Cook a recipe step by step
    Cook {
        recipe_id: String,

        /// Cook's name (defaults to saved preferences)
        #[arg(long)]
        name: Option<String>,

        /// Narration language: none, en, hi, kn
        #[arg(long)]
        lang: Option<String>,

        /// Auto-complete (for testing) - walk every step and submit feedback
        #[arg(long)]
        auto_complete: bool,

        /// With --auto-complete, mark the product as wasted
        #[arg(long, requires = "auto_complete")]
        wasted: bool,
    },

    /// Show or change saved preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Preparation logs
    Logs {
        /// Export all logs to this CSV file instead of printing them
        #[arg(long)]
        export: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<LogsAction>,
    },

    /// Catalog administration
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    Show,
    Set {
        #[arg(long)]
        name: String,

        #[arg(long)]
        lang: Option<String>,
    },
}

#[derive(Subcommand)]
enum LogsAction {
    /// How often a cook has finished a recipe
    Summary {
        #[arg(long)]
        user: String,

        #[arg(long)]
        recipe: String,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Check the catalog for errors
    Validate,
    /// Add or replace recipes from a JSON file (one recipe or a list)
    Import { file: PathBuf },
    /// Delete a recipe
    Remove { recipe_id: String },
    /// Show or hide a recipe
    Toggle { recipe_id: String },
}

fn main() -> Result<()> {
    // Initialize logging
    cook_core::logging::init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.session.tick_interval_ms = tick_ms.max(1);
    }

    match cli.command {
        Some(Commands::List { category, search }) => cmd_list(&config, category, search),
        Some(Commands::Show { recipe_id }) => cmd_show(&config, &recipe_id),
        Some(Commands::Cook {
            recipe_id,
            name,
            lang,
            auto_complete,
            wasted,
        }) => cmd_cook(&config, &recipe_id, name, lang, auto_complete, wasted),
        Some(Commands::Prefs { action }) => cmd_prefs(&config, action),
        Some(Commands::Logs { export, action }) => cmd_logs(&config, export, action),
        Some(Commands::Admin { action }) => cmd_admin(&config, action),
        None => cmd_list(&config, None, None),
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    Catalog::load_or_default(&config.data.catalog_path())
}

fn cmd_list(config: &Config, category: Option<String>, search: Option<String>) -> Result<()> {
    let catalog = load_catalog(config)?;
    let mut recipes = match &search {
        Some(query) => catalog.search(query),
        None => catalog.visible(),
    };
    if let Some(category) = &category {
        recipes.retain(|r| r.category.eq_ignore_ascii_case(category));
    }

    if recipes.is_empty() {
        println!("No recipes found.");
        return Ok(());
    }

    for recipe in recipes {
        println!(
            "{:<16} {:<28} {:<12} {}",
            recipe.id,
            recipe.name,
            recipe.category,
            recipe.total_time.as_deref().unwrap_or("")
        );
    }
    println!("\nCategories: {}", catalog.categories().join(", "));
    Ok(())
}

fn cmd_show(config: &Config, recipe_id: &str) -> Result<()> {
    let catalog = load_catalog(config)?;
    let recipe = catalog.require(recipe_id)?;

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", recipe.name);
    println!("╰─────────────────────────────────────────╯");
    println!("  Category: {}", recipe.category);
    if let Some(description) = &recipe.description {
        println!("  {}", description);
    }
    for (label, value) in [
        ("Prep", &recipe.prep_time),
        ("Cook", &recipe.cook_time),
        ("Total", &recipe.total_time),
    ] {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }
    if let Some(servings) = recipe.servings {
        println!("  Servings: {}", servings);
    }
    if let Some(n) = &recipe.nutrition_per_serving {
        let fmt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  Per serving: {} kcal, {} g protein, {} g fat, {} g carbs",
            fmt(n.calories),
            fmt(n.protein),
            fmt(n.fat),
            fmt(n.carbs)
        );
    }

    println!("\n  Ingredients:");
    for ing in &recipe.ingredients {
        println!("    • {}", ing.describe());
    }

    println!("\n  Steps:");
    for step in &recipe.steps {
        let mut extras = Vec::new();
        if let Some(duration) = step.timer_duration() {
            extras.push(format!("⏱ {}", format_clock(duration)));
        }
        if let Some(temperature) = &step.temperature {
            extras.push(temperature.clone());
        }
        if extras.is_empty() {
            println!("    {}. {}", step.step_number, step.instruction);
        } else {
            println!(
                "    {}. {} ({})",
                step.step_number,
                step.instruction,
                extras.join(", ")
            );
        }
    }
    println!();
    Ok(())
}

/// Work out who is cooking and in which language
fn resolve_cook(
    config: &Config,
    name: Option<String>,
    lang: Option<String>,
) -> Result<UserPreferences> {
    let saved = UserPreferences::load(&config.data.preferences_path())?;

    let language = match lang {
        Some(code) => VoiceLanguage::from_str(&code)?,
        None => saved
            .as_ref()
            .map(|p| p.voice_language)
            .unwrap_or(config.voice.default_language),
    };

    match (name, saved) {
        (Some(name), Some(saved)) if saved.user_name.eq_ignore_ascii_case(name.trim()) => {
            UserPreferences::with_user_id(saved.user_id, &name, language)
        }
        (Some(name), _) => UserPreferences::for_name(&name, language),
        (None, Some(saved)) => {
            UserPreferences::with_user_id(saved.user_id, &saved.user_name, language)
        }
        (None, None) => UserPreferences::new("", language),
    }
}

fn cmd_cook(
    config: &Config,
    recipe_id: &str,
    name: Option<String>,
    lang: Option<String>,
    auto_complete: bool,
    wasted: bool,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    let recipe = catalog.require(recipe_id)?.clone();
    if !recipe.visibility {
        return Err(Error::RecipeNotFound(recipe_id.to_string()));
    }
    let user = resolve_cook(config, name, lang)?;
    tracing::info!(
        "Cooking {} as {} ({})",
        recipe.id,
        user.user_name,
        user.voice_language
    );

    let (session, effects) = CookSession::start(recipe, user, chrono::Utc::now())?;

    let speaker: Box<dyn Speaker> = match speaker_from_config(&config.voice) {
        Some(speaker) => Box::new(speaker),
        None => Box::new(ConsoleSpeaker),
    };
    let services = RunnerServices {
        translator: translator_from_config(&config.voice),
        speaker,
        bell: Box::new(ConsoleBell),
        log_store: Box::new(JsonlLogStore::new(config.data.prep_log_path())),
        view: Box::new(ConsoleView::default()),
    };

    let step_count = session.step_count();
    let runner = CookRunner::new(
        session,
        effects,
        services,
        RunnerSettings::from(&config.session),
    );
    let events = runner.sender();

    if auto_complete {
        for _ in 0..step_count {
            let _ = events.send(RunnerEvent::Action(SessionAction::Advance));
        }
        let feedback = Feedback {
            is_wasted: wasted,
            ..Feedback::default()
        };
        let _ = events.send(RunnerEvent::SubmitFeedback(feedback));
        let _ = events.send(RunnerEvent::Shutdown);
    } else {
        print_keys();
        spawn_input_reader(events)?;
    }

    let summary = runner.run();
    if summary.completed {
        println!("\n✓ Session logged!");
    } else {
        println!("\nSession ended at step {} of {}.", summary.final_index + 1, step_count);
    }
    Ok(())
}

fn print_keys() {
    println!("─────────────────────────────────────────");
    println!("  Enter/n next   p back   t timer   r reset timer");
    println!("  m mute         a read aloud       q quit");
    println!("  f [weight=..] [preps=N] [wasted=yes] [photo=URL]  submit feedback");
    println!("─────────────────────────────────────────");
}

fn spawn_input_reader(events: Sender<RunnerEvent>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_input(&line) {
                    Ok(Some(RunnerEvent::Shutdown)) => break,
                    Ok(Some(event)) => {
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                }
            }
            let _ = events.send(RunnerEvent::Shutdown);
        })?;
    Ok(())
}

/// Map one line of keyboard input to an event
fn parse_input(line: &str) -> std::result::Result<Option<RunnerEvent>, String> {
    let line = line.trim();
    let (key, rest) = line.split_once(' ').unwrap_or((line, ""));
    let action = match key.to_lowercase().as_str() {
        "" | "n" => SessionAction::Advance,
        "p" => SessionAction::Retreat,
        "t" => SessionAction::ToggleTimer,
        "r" => SessionAction::ResetTimer,
        "m" => SessionAction::ToggleMute,
        "a" => SessionAction::ReadAloud,
        "q" => return Ok(Some(RunnerEvent::Shutdown)),
        "f" => return parse_feedback(rest).map(|f| Some(RunnerEvent::SubmitFeedback(f))),
        other => return Err(format!("Unknown key '{}'", other)),
    };
    Ok(Some(RunnerEvent::Action(action)))
}

/// Parse `key=value` pairs into feedback
fn parse_feedback(args: &str) -> std::result::Result<Feedback, String> {
    let mut feedback = Feedback::default();
    for pair in args.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got '{}'", pair))?;
        match key {
            "photo" => feedback.photo_url = Some(value.to_string()),
            "weight" => feedback.product_weight = Some(value.to_string()),
            "preps" => {
                let n = value
                    .parse::<u32>()
                    .map_err(|_| format!("preps must be a whole number, got '{}'", value))?;
                feedback.num_preps = Some(n);
            }
            "wasted" => {
                feedback.is_wasted = matches!(
                    value.to_lowercase().as_str(),
                    "yes" | "y" | "true" | "1"
                )
            }
            other => return Err(format!("Unknown feedback field '{}'", other)),
        }
    }
    Ok(feedback)
}

/// Prints narration instead of speaking it
struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&mut self, utterance: &Utterance, notifier: SpeechNotifier) {
        println!("  🔊 {}", utterance.text);
        notifier.notify(SpeechEvent::Started);
        notifier.notify(SpeechEvent::Ended);
    }

    fn cancel(&mut self) {}
}

struct ConsoleBell;

impl AlarmBell for ConsoleBell {
    fn ring(&mut self, label: &str) {
        println!("\x07  ⏰ {}", label);
    }
}

/// Redraws only what changed since the last snapshot
#[derive(Default)]
struct ConsoleView {
    last: Option<SessionSnapshot>,
}

impl ConsoleView {
    fn print_card(snapshot: &SessionSnapshot) {
        match snapshot.phase {
            Phase::Viewing(_) => {
                println!();
                println!(
                    "── {} ── Step {} of {} ({:.0}%)",
                    snapshot.recipe_name,
                    snapshot.step_number.unwrap_or(0),
                    snapshot.step_count,
                    snapshot.progress_percent
                );
                if let Some(instruction) = &snapshot.instruction {
                    println!("  {}", instruction);
                }
                if let Some(temperature) = &snapshot.temperature {
                    println!("  🌡 {}", temperature);
                }
                if !snapshot.ingredients.is_empty() {
                    println!("  You will need:");
                    for ing in &snapshot.ingredients {
                        println!("    • {}", ing);
                    }
                }
                if let Some(timer) = &snapshot.timer {
                    Self::print_timer(timer);
                }
            }
            Phase::Feedback => {
                println!();
                println!("── {} ── All steps done! (100%)", snapshot.recipe_name);
                if snapshot.feedback_available {
                    println!("  Submit feedback: f weight=.. preps=N wasted=yes|no photo=URL");
                } else {
                    println!("  Feedback cannot be saved for this session.");
                }
            }
        }
    }

    fn print_timer(timer: &TimerView) {
        println!("  ⏱ {}  [t: {}]", timer.clock, timer.button_label);
    }
}

impl SessionView for ConsoleView {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        let previous = self.last.replace(snapshot.clone());
        let Some(previous) = previous else {
            Self::print_card(snapshot);
            return;
        };

        if previous.phase != snapshot.phase {
            Self::print_card(snapshot);
            return;
        }
        if previous.muted != snapshot.muted {
            println!("  {}", if snapshot.muted { "🔇 Muted" } else { "🔈 Unmuted" });
        }
        if let Some(timer) = &snapshot.timer {
            let status_changed = previous.timer.as_ref().map(|t| t.status) != Some(timer.status);
            let clock_changed = previous.timer.as_ref().map(|t| t.remaining) != Some(timer.remaining);
            if status_changed {
                Self::print_timer(timer);
            } else if clock_changed {
                print!("\r  ⏱ {} ", timer.clock);
                let _ = io::stdout().flush();
            }
        }
    }

    fn notice(&mut self, notice: &Notice) {
        println!("  ℹ {}", notice);
    }
}

fn cmd_prefs(config: &Config, action: PrefsAction) -> Result<()> {
    let path = config.data.preferences_path();
    match action {
        PrefsAction::Show => match UserPreferences::load(&path)? {
            Some(prefs) => {
                println!("Name:     {}", prefs.user_name);
                println!("Language: {}", prefs.voice_language.label());
                println!("User ID:  {}", prefs.user_id);
            }
            None => println!("No preferences saved."),
        },
        PrefsAction::Set { name, lang } => {
            let saved = UserPreferences::load(&path)?;
            let language = match lang {
                Some(code) => VoiceLanguage::from_str(&code)?,
                None => saved
                    .as_ref()
                    .map(|p| p.voice_language)
                    .unwrap_or(config.voice.default_language),
            };
            let prefs = match saved {
                Some(saved) => UserPreferences::with_user_id(saved.user_id, &name, language)?,
                None => UserPreferences::new(&name, language)?,
            };
            prefs.save(&path)?;
            println!(
                "✓ Saved preferences for {} ({})",
                prefs.user_name,
                prefs.voice_language.label()
            );
        }
    }
    Ok(())
}

fn cmd_logs(config: &Config, export: Option<PathBuf>, action: Option<LogsAction>) -> Result<()> {
    let logs = read_logs(&config.data.prep_log_path())?;

    if let Some(LogsAction::Summary { user, recipe }) = action {
        println!("{}", summarize_preparations(&logs, &user, &recipe));
        return Ok(());
    }

    if let Some(csv_path) = export {
        let count = export_csv(&logs, &csv_path)?;
        println!("✓ Exported {} logs to {}", count, csv_path.display());
        return Ok(());
    }

    if logs.is_empty() {
        println!("No preparation logs yet.");
        return Ok(());
    }

    println!(
        "{:<24} {:<14} {:<6} {:<17} {:<12} {:<9} {}",
        "Recipe", "User", "Lang", "Started", "Duration", "Complete", "Wasted"
    );
    for log in &logs {
        println!(
            "{:<24} {:<14} {:<6} {:<17} {:<12} {:<9} {}",
            log.recipe_name_snapshot,
            log.user_name_snapshot,
            log.language_used,
            log.start_time.format("%Y-%m-%d %H:%M"),
            format_duration(log),
            if log.completed_all_steps { "Yes" } else { "No" },
            wasted_label(log)
        );
    }
    Ok(())
}

fn cmd_admin(config: &Config, action: AdminAction) -> Result<()> {
    let catalog_path = config.data.catalog_path();
    let mut catalog = load_catalog(config)?;

    match action {
        AdminAction::Validate => {
            let errors = catalog.validate();
            if !errors.is_empty() {
                eprintln!("Catalog validation errors:");
                for error in errors {
                    eprintln!("  - {}", error);
                }
                return Err(Error::CatalogValidation("Invalid catalog".into()));
            }
            println!("✓ Catalog is valid ({} recipes)", catalog.recipes.len());
        }
        AdminAction::Import { file } => {
            let recipes = read_import(&file)?;
            for recipe in &recipes {
                let errors = validate_recipe(recipe);
                if !errors.is_empty() {
                    eprintln!("Recipe '{}' is invalid:", recipe.id);
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    return Err(Error::CatalogValidation(format!(
                        "Invalid recipe '{}'",
                        recipe.id
                    )));
                }
            }
            for recipe in recipes {
                let id = recipe.id.clone();
                let replaced = catalog.upsert(recipe);
                println!("✓ {} {}", if replaced { "Updated" } else { "Added" }, id);
            }
            catalog.save_to(&catalog_path)?;
        }
        AdminAction::Remove { recipe_id } => {
            let removed = catalog.remove(&recipe_id)?;
            catalog.save_to(&catalog_path)?;
            println!("✓ Removed {}", removed.name);
        }
        AdminAction::Toggle { recipe_id } => {
            let visible = catalog.toggle_visibility(&recipe_id)?;
            catalog.save_to(&catalog_path)?;
            println!(
                "✓ {} is now {}",
                recipe_id,
                if visible { "visible" } else { "hidden" }
            );
        }
    }
    Ok(())
}

/// One recipe object or a list of them
fn read_import(path: &Path) -> Result<Vec<Recipe>> {
    let contents = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    let recipes = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(recipes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation_keys() {
        assert!(matches!(
            parse_input(""),
            Ok(Some(RunnerEvent::Action(SessionAction::Advance)))
        ));
        assert!(matches!(
            parse_input(" P "),
            Ok(Some(RunnerEvent::Action(SessionAction::Retreat)))
        ));
        assert!(matches!(parse_input("q"), Ok(Some(RunnerEvent::Shutdown))));
        assert!(parse_input("x").is_err());
    }

    #[test]
    fn test_parse_feedback_fields() {
        let feedback = parse_feedback("weight=1.2kg preps=4 wasted=yes photo=http://x/y.jpg").unwrap();
        assert_eq!(feedback.product_weight.as_deref(), Some("1.2kg"));
        assert_eq!(feedback.num_preps, Some(4));
        assert!(feedback.is_wasted);
        assert_eq!(feedback.photo_url.as_deref(), Some("http://x/y.jpg"));

        assert!(parse_feedback("preps=many").is_err());
        assert!(parse_feedback("colour=red").is_err());
        assert_eq!(parse_feedback("").unwrap(), Feedback::default());
    }
}
