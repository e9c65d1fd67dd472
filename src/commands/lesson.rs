use std::path::Path;

use super::{CommandResult, SelectionArgs, gemini_client};
use crate::config::AppConfig;
use crate::console;
use crate::types::lesson::LessonPlan;

pub async fn run(config: &AppConfig, args: &SelectionArgs, out: Option<&Path>) -> CommandResult {
    let plan = fetch(config, args).await?;
    console::print_lesson(&plan);

    if let Some(path) = out {
        let json = serde_json::to_string_pretty(&plan)?;
        std::fs::write(path, json)?;
        println!("\nSaved lesson to {}", path.display());
    }
    Ok(())
}

pub async fn fetch(config: &AppConfig, args: &SelectionArgs) -> Result<LessonPlan, Box<dyn std::error::Error + Send + Sync>> {
    let selection = args.selection()?;
    let client = gemini_client(config)?;

    tracing::info!(
        level = %selection.difficulty,
        week = selection.week,
        day = selection.day,
        "generating lesson"
    );
    let plan = client.generate_lesson(&selection).await?;
    Ok(plan)
}

pub fn load(path: &Path) -> Result<LessonPlan, Box<dyn std::error::Error + Send + Sync>> {
    let contents = std::fs::read_to_string(path)?;
    let plan = serde_json::from_str(&contents)?;
    Ok(plan)
}
