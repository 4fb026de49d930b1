//! Milestone completion per client project.

use serde::Serialize;

use super::fields::{self, CLIENT, MILESTONE, PROJECT};
use super::types::BoardSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneAggregate {
    pub name: String,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub percent_complete: u32,
}

impl MilestoneAggregate {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_tasks: 0,
            completed_tasks: 0,
            percent_complete: 0,
        }
    }

    fn record(&mut self, completed: bool) {
        self.total_tasks += 1;
        if completed {
            self.completed_tasks += 1;
        }
        self.percent_complete = percent(self.completed_tasks, self.total_tasks);
    }
}

/// `round(100 * completed / total)`, or 0 with no tasks.
pub fn percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(completed) * 100.0 / f64::from(total)).round() as u32
}

/// Aggregate milestones over the design/UX and development boards for one
/// client project, in first-seen order.
pub fn aggregate_milestones(
    snapshot: &BoardSnapshot,
    client: &str,
    project: &str,
) -> Vec<MilestoneAggregate> {
    let mut milestones: Vec<MilestoneAggregate> = Vec::new();

    for board in snapshot.team_boards() {
        let defs = &board.custom_fields;
        for card in &board.cards {
            if fields::resolve(card, defs, CLIENT) != client
                || fields::resolve(card, defs, PROJECT) != project
            {
                continue;
            }
            let name = fields::resolve(card, defs, MILESTONE);
            if name.is_empty() {
                continue;
            }
            let index = match milestones.iter().position(|m| m.name == name) {
                Some(i) => i,
                None => {
                    milestones.push(MilestoneAggregate::new(&name));
                    milestones.len() - 1
                }
            };
            milestones[index].record(card.is_completed());
        }
    }

    milestones
}

/// Append scheduled milestones no card references yet.
pub fn merge_scheduled<'a>(
    mut milestones: Vec<MilestoneAggregate>,
    scheduled: impl IntoIterator<Item = &'a str>,
) -> Vec<MilestoneAggregate> {
    for name in scheduled {
        if !name.is_empty() && !milestones.iter().any(|m| m.name == name) {
            milestones.push(MilestoneAggregate::new(name));
        }
    }
    milestones
}

/// Projects that have at least one team board card for `client`.
pub fn projects_for_client(snapshot: &BoardSnapshot, client: &str) -> Vec<String> {
    let mut projects: Vec<String> = Vec::new();
    for board in snapshot.team_boards() {
        for card in &board.cards {
            if fields::resolve(card, &board.custom_fields, CLIENT) != client {
                continue;
            }
            let project = fields::resolve(card, &board.custom_fields, PROJECT);
            if !project.is_empty() && !projects.contains(&project) {
                projects.push(project);
            }
        }
    }
    projects
}
