//! Read-only board views in the terminal: `char3 week`, `char3 clients`,
//! `char3 milestones`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use char3_dashboard::board::cache::{BoardFetcher, SnapshotSource};
use char3_dashboard::board::client::{Credentials, TrelloClient};
use char3_dashboard::board::dates::{is_supported, local_today};
use char3_dashboard::board::milestones::{aggregate_milestones, merge_scheduled};
use char3_dashboard::board::types::BoardSnapshot;
use char3_dashboard::board::views::{EnhancedCard, group_clients};
use char3_dashboard::board::weekly::build_weekly;
use char3_dashboard::config::DashboardConfig;
use char3_dashboard::dashboard::db::DashboardDb;

async fn fetch_snapshot(config: &DashboardConfig) -> Result<BoardSnapshot> {
    let Some(api_key) = config.api_key() else {
        bail!(
            "No board API key configured. Set trello.api_key in {} or TRELLO_API_KEY.",
            config.config_path.display()
        );
    };
    if config.token().is_none() {
        bail!("No board API token configured. Pass --token or set TRELLO_TOKEN.");
    }
    let credentials = Credentials::new(config.token().map(str::to_string));
    let api = Arc::new(TrelloClient::new(config.base_url(), api_key, credentials));
    BoardFetcher::new(api, config.board_ids())
        .fetch()
        .await
        .context("Failed to fetch boards")
}

fn card_line(card: &EnhancedCard) -> String {
    let mut line = format!("{} {}", console::style(&card.board_tag).dim(), card.name);
    if !card.client.is_empty() {
        line.push_str(&format!(" · {}", card.client));
        if !card.project.is_empty() {
            line.push_str(&format!(" / {}", card.project));
        }
    }
    if card.assignee != char3_dashboard::board::views::UNASSIGNED {
        line.push_str(&format!(" ({})", card.assignee));
    }
    line
}

pub async fn cmd_week(config: &DashboardConfig, today: Option<NaiveDate>) -> Result<()> {
    if let Some(date) = today
        && !is_supported(date)
    {
        bail!("--today {} is outside the supported range", date);
    }
    let snapshot = fetch_snapshot(config).await?;
    let today = today.unwrap_or_else(|| local_today(config.utc_offset()));
    let plan = build_weekly(&snapshot, today, config.utc_offset());

    println!();
    println!(
        "{}",
        console::style(format!("Week of {} to {}", plan.week.start, plan.week.end))
            .bold()
            .cyan()
    );
    for bucket in &plan.buckets {
        println!();
        let header = match bucket.date {
            Some(date) if date == today => format!("{} {} (today)", bucket.day, date),
            Some(date) => format!("{} {}", bucket.day, date),
            None => bucket.day.clone(),
        };
        if bucket.date.is_none() {
            println!("{}", console::style(header).red().bold());
        } else {
            println!("{}", console::style(header).bold());
        }
        if bucket.cards.is_empty() {
            println!("  {}", console::style("nothing planned").dim());
        }
        for card in &bucket.cards {
            println!("  - {}", card_line(&card.card));
        }
    }
    println!();
    Ok(())
}

pub async fn cmd_clients(config: &DashboardConfig) -> Result<()> {
    let snapshot = fetch_snapshot(config).await?;
    let groups = group_clients(
        &snapshot.account_management,
        &config.list_roles(),
        config.utc_offset(),
    );

    println!();
    if groups.is_empty() {
        println!("No client cards found.");
    }
    for group in &groups {
        println!(
            "{} {}",
            console::style(&group.name).bold().cyan(),
            console::style(format!(
                "({} deliverables, {} admin tasks)",
                group.deliverables.len(),
                group.admin_tasks.len()
            ))
            .dim()
        );
        for card in &group.deliverables {
            let due = card
                .due_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "no due date".to_string());
            let mark = if card.is_completed() {
                console::style("✓").green()
            } else {
                console::style("•").dim()
            };
            println!("  {} {} [{}]", mark, card.name, due);
        }
        println!();
    }
    Ok(())
}

pub async fn cmd_milestones(config: &DashboardConfig, client: &str, project: &str) -> Result<()> {
    let snapshot = fetch_snapshot(config).await?;
    let mut milestones = aggregate_milestones(&snapshot, client, project);

    // Scheduled milestones are shown only when the database already exists.
    if config.db_path().exists() {
        let db = DashboardDb::new(config.db_path())?;
        let scheduled = db.milestone_names(client, project)?;
        milestones = merge_scheduled(milestones, scheduled.iter().map(String::as_str));
    }

    println!();
    println!(
        "{}",
        console::style(format!("{} / {}", client, project)).bold().cyan()
    );
    if milestones.is_empty() {
        println!("  {}", console::style("no milestones").dim());
    }
    for m in &milestones {
        let pct = console::style(format!("{:>3}%", m.percent_complete));
        let pct = if m.percent_complete == 100 {
            pct.green()
        } else {
            pct.yellow()
        };
        println!(
            "  {} {} ({}/{} tasks)",
            pct, m.name, m.completed_tasks, m.total_tasks
        );
    }
    println!();
    Ok(())
}
