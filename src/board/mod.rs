//! Board core: snapshot model, remote client, cache, view builders and
//! mutations over the three team boards.
//!
//! ## Module Map
//!
//! ```text
//!   BoardApi (client.rs) ──fetch──> BoardFetcher ──> SnapshotCache (cache.rs)
//!        ^                                                │ Arc<BoardSnapshot>
//!        │ writes                                         v
//!   MutationOrchestrator (mutations.rs)      views.rs / weekly.rs / milestones.rs
//!        └── invalidate() ─────────────> SnapshotCache ──> CacheEvent (broadcast)
//! ```
//!
//! | Module       | Responsibility                                             |
//! |--------------|------------------------------------------------------------|
//! | `types`      | `BoardSnapshot`, `SubBoard`, `Card`, `CustomFieldValue`    |
//! | `client`     | `BoardApi` trait, `TrelloClient`, `Credentials`            |
//! | `fields`     | Custom field resolution and write encoding                 |
//! | `dates`      | `WeekWindow`, planned-date parsing, local dates            |
//! | `cache`      | `SnapshotCache`: TTL, single-flight, invalidation events   |
//! | `views`      | `EnhancedCard`, client grouping, filters, task lists       |
//! | `weekly`     | Overdue + Sunday..Saturday buckets                         |
//! | `milestones` | Milestone completion aggregates                            |
//! | `mutations`  | `MutationOrchestrator`: multi-step writes                  |

pub mod cache;
pub mod client;
pub mod dates;
pub mod fields;
pub mod milestones;
pub mod mutations;
pub mod types;
pub mod views;
pub mod weekly;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
pub(crate) mod mock;
