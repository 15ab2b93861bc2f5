use std::collections::BTreeMap;

use anyhow::{Context, Result};
use learn_frontend_rs::{BackendConfig, HttpBackend, LearnCategory, LockReason, load_learn_overview};
use learn_types::LearningRecommendation;

/// Prints the module/lesson tree as the learn page would gate it for the
/// configured user. `--json` dumps the annotated categories instead.
#[tokio::main]
async fn main() -> Result<()> {
    learn_frontend_rs::init_logging();

    let as_json = std::env::args().skip(1).any(|arg| arg == "--json");

    let config = BackendConfig::from_env();
    log::info!("Checking catalog at {}", config.base_url);
    let backend = HttpBackend::new(config);

    let overview = load_learn_overview(&backend)
        .await
        .context("loading the learn overview")?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&overview.categories)?);
        return Ok(());
    }

    for category in &overview.categories {
        print_category(category);
    }
    print_recommendation(&overview.recommendation);
    print_summary(&overview.categories);
    println!(
        "Advanced topics unlock at {} XP or {} lessons",
        overview.advanced_unlock_xp_required, overview.advanced_unlock_lessons_required
    );

    Ok(())
}

fn lock_label(locked: bool, reason: Option<LockReason>) -> String {
    match (locked, reason) {
        (true, Some(reason)) => format!("[locked: {reason}]"),
        (true, None) => "[locked]".to_string(),
        (false, _) => "[open]".to_string(),
    }
}

fn print_category(category: &LearnCategory) {
    println!(
        "{} {} ({}/{} lessons, {}%){} {}",
        category.id,
        category.title,
        category.completed_lessons,
        category.chapters,
        category.progress_percent,
        if category.is_advanced { " advanced" } else { "" },
        lock_label(category.locked, category.lock_reason),
    );
    for chapter in &category.chapters_list {
        println!(
            "    {} {}{} {} xp {}",
            if chapter.completed { "✓" } else { " " },
            chapter.title,
            if chapter.is_advanced { " (advanced)" } else { "" },
            chapter.xp_reward,
            lock_label(chapter.locked, chapter.lock_reason),
        );
    }
}

fn print_recommendation(recommendation: &LearningRecommendation) {
    match &recommendation.lesson_title {
        Some(title) => println!("\nNext up: {title} ({})", recommendation.reason),
        None => println!("\nNo recommendation: {}", recommendation.reason),
    }
    if let Some(unlock_reason) = &recommendation.unlock_reason {
        println!("  {unlock_reason}");
    }
}

fn print_summary(categories: &[LearnCategory]) {
    let mut by_reason: BTreeMap<&str, usize> = BTreeMap::new();
    let mut lessons = 0;
    for chapter in categories.iter().flat_map(|c| &c.chapters_list) {
        lessons += 1;
        let label = chapter.lock_reason.map_or("Open", |reason| reason.as_str());
        *by_reason.entry(label).or_default() += 1;
    }

    println!("\n=== {} modules, {lessons} lessons ===", categories.len());
    for (label, count) in by_reason {
        println!("{label}: {count}");
    }
}
