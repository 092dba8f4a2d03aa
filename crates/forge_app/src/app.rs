use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use forge_core::summary::DayBoardCell;
use forge_core::{Challenge, ContributionStats, DashboardSummary, Habit, NewChallenge};
use forge_service::{
    ConversionOutcome, EntityStore, ForgeConfig, ForgeService, InMemoryStore, JsonFileStore,
};

use crate::seed;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoReport {
    pub habit: Habit,
    pub grid_weeks: usize,
    pub statistics: ContributionStats,
    pub completion_percent: u32,
    pub challenge: Challenge,
    pub day_board: Vec<DayBoardCell>,
    pub dashboard: DashboardSummary,
    pub conversions: Vec<ConversionOutcome>,
}

fn open_store(config: &ForgeConfig) -> Result<Arc<dyn EntityStore>> {
    match &config.data_dir {
        Some(dir) => {
            let store = JsonFileStore::open(dir)
                .with_context(|| format!("failed to open store at `{}`", dir.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

pub async fn run(config: ForgeConfig) -> Result<DemoReport> {
    let store = open_store(&config)?;
    let (sink, mut outcomes) = mpsc::unbounded_channel();
    let service = ForgeService::builder()
        .with_config(config)
        .with_store(store)
        .with_conversion_sink(Arc::new(sink))
        .build()
        .context("failed to build forge service")?;

    let migrated = service.migrate_legacy().await?;
    let refreshed = service.refresh_derived().await?;
    info!(migrated, refreshed, "store ready");

    let now = chrono::Local::now();
    let habit = service
        .create_habit(seed::exercise_habit(&now))
        .await
        .context("failed to seed exercise habit")?;
    info!(habit = %habit.id, streak = habit.current_streak, "seeded habit");
    let habit = service.complete_habit(&habit.id).await?;

    let challenge = service
        .create_challenge(
            NewChallenge::new("💪 Exercise Blitz")
                .with_icon("💪")
                .with_category("Health & Fitness")
                .with_reward("New running shoes"),
        )
        .await?;
    let challenge = service.complete_challenge_day(&challenge.id).await?;

    let grid = service.contribution_grid(&habit.id).await?;
    let statistics = service.statistics(&habit.id).await?;
    let day_board = service.day_board(&challenge.id).await?;
    let dashboard = service.dashboard().await?;

    let mut conversions = Vec::new();
    while let Ok(outcome) = outcomes.try_recv() {
        if let ConversionOutcome::Failed { reason, .. } = &outcome {
            warn!(%reason, "background conversion failed");
        }
        conversions.push(outcome);
    }

    Ok(DemoReport {
        habit,
        grid_weeks: grid.weeks.len(),
        completion_percent: statistics.completion_percent(),
        statistics,
        challenge,
        day_board,
        dashboard,
        conversions,
    })
}
