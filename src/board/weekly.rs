//! Weekly planning buckets.
//!
//! Cards land in `Overdue` or in every day of the current week that their
//! planned range covers. The builder is pure: the caller supplies "today".

use chrono::{Duration, FixedOffset, NaiveDate};
use serde::Serialize;

use super::dates::{DAY_NAMES, OVERDUE, WeekWindow, day_name, planned_range};
use super::types::BoardSnapshot;
use super::views::EnhancedCard;

/// Where a card belongs in the weekly view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Overdue { display_date: NaiveDate },
    Week { days: Vec<NaiveDate> },
    /// Open but not scheduled into this week.
    Unplanned,
    Archived,
}

/// Overdue wins over the planned range: a card due before the week starts
/// that is still open goes to `Overdue` whatever its planned dates say.
pub fn classify(card: &EnhancedCard, window: &WeekWindow) -> Placement {
    if card.closed {
        return Placement::Archived;
    }

    if let Some(due) = card.due_date
        && due < window.start
        && !card.is_completed()
    {
        return Placement::Overdue {
            display_date: card.planned_start.unwrap_or(due),
        };
    }

    let Some(start) = card.planned_start else {
        return Placement::Unplanned;
    };
    if !window.contains(start) {
        return Placement::Unplanned;
    }

    let (start, end) = planned_range(start, card.planned_end);
    let last = end.min(window.end);
    let span = (last - start).num_days();
    Placement::Week {
        days: (0..=span).map(|i| start + Duration::days(i)).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyCard {
    #[serde(flatten)]
    pub card: EnhancedCard,
    pub display_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub day: String,
    /// `None` for the overdue bucket.
    pub date: Option<NaiveDate>,
    pub cards: Vec<WeeklyCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPlan {
    pub today: NaiveDate,
    pub week: WeekWindow,
    /// `Overdue` first, then Sunday through Saturday.
    pub buckets: Vec<DayBucket>,
}

impl WeeklyPlan {
    pub fn bucket(&self, day: &str) -> Option<&DayBucket> {
        self.buckets.iter().find(|b| b.day == day)
    }

    pub fn card_ids(&self, day: &str) -> Vec<&str> {
        self.bucket(day)
            .map(|b| b.cards.iter().map(|c| c.card.id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn total_placements(&self) -> usize {
        self.buckets.iter().map(|b| b.cards.len()).sum()
    }
}

/// Build the weekly buckets across every board in the snapshot.
pub fn build_weekly(snapshot: &BoardSnapshot, today: NaiveDate, offset: FixedOffset) -> WeeklyPlan {
    let week = WeekWindow::containing(today);

    let mut buckets = Vec::with_capacity(DAY_NAMES.len() + 1);
    buckets.push(DayBucket {
        day: OVERDUE.to_string(),
        date: None,
        cards: Vec::new(),
    });
    buckets.extend(week.days().map(|date| DayBucket {
        day: day_name(date).to_string(),
        date: Some(date),
        cards: Vec::new(),
    }));

    for board in snapshot.boards() {
        for card in &board.cards {
            let enhanced = EnhancedCard::from_card(board, card, offset);
            match classify(&enhanced, &week) {
                Placement::Overdue { display_date } => buckets[0].cards.push(WeeklyCard {
                    card: enhanced,
                    display_date,
                }),
                Placement::Week { days } => {
                    for date in days {
                        let index = 1 + (date - week.start).num_days() as usize;
                        buckets[index].cards.push(WeeklyCard {
                            card: enhanced.clone(),
                            display_date: date,
                        });
                    }
                }
                Placement::Unplanned | Placement::Archived => {}
            }
        }
    }

    WeeklyPlan {
        today,
        week,
        buckets,
    }
}
