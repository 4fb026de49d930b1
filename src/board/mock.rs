//! In-memory `BoardApi` for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::client::{BoardApi, BoardSummary, CardUpdate, Credentials, CurrentMember, NewCard};
use super::fields::CustomFieldWrite;
use super::types::{BoardData, Card, FieldOption, OptionValue};
use crate::errors::BoardApiError;

/// Records every call as a string such as `"set_custom_field:card-1:f-client"`
/// and fails any call whose string was registered with [`MockBoardApi::fail_on`].
#[derive(Default)]
pub struct MockBoardApi {
    pub boards: Mutex<HashMap<String, BoardData>>,
    pub calls: Mutex<Vec<String>>,
    pub field_writes: Mutex<Vec<(String, CustomFieldWrite)>>,
    pub bulk_writes: Mutex<Vec<(String, Vec<CustomFieldWrite>)>>,
    pub updates: Mutex<Vec<(String, CardUpdate)>>,
    pub member: Mutex<Option<CurrentMember>>,
    /// Shared credentials as observed during each token check.
    pub tokens_seen: Mutex<Vec<Option<String>>>,
    watched: Option<Credentials>,
    failures: Mutex<HashMap<String, BoardApiError>>,
    fetches: AtomicUsize,
    next_card: AtomicUsize,
    fetch_delay: Option<Duration>,
}

impl MockBoardApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(self, board_id: &str, data: BoardData) -> Self {
        self.boards
            .lock()
            .unwrap()
            .insert(board_id.to_string(), data);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn with_member(self, member: CurrentMember) -> Self {
        *self.member.lock().unwrap() = Some(member);
        self
    }

    pub fn watching(mut self, credentials: Credentials) -> Self {
        self.watched = Some(credentials);
        self
    }

    pub fn fail_on(&self, call: &str, err: BoardApiError) {
        self.failures.lock().unwrap().insert(call.to_string(), err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) -> Result<(), BoardApiError> {
        self.calls.lock().unwrap().push(call.clone());
        match self.failures.lock().unwrap().get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BoardApi for MockBoardApi {
    async fn fetch_board(&self, board_id: &str) -> Result<BoardData, BoardApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("fetch_board:{}", board_id))?;
        self.boards
            .lock()
            .unwrap()
            .get(board_id)
            .cloned()
            .ok_or_else(|| BoardApiError::NotFound(format!("board {}", board_id)))
    }

    async fn create_card(&self, list_id: &str, card: &NewCard) -> Result<Card, BoardApiError> {
        self.record(format!("create_card:{}:{}", list_id, card.name))?;
        let n = self.next_card.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Card {
            id: format!("new-{}", n),
            name: card.name.clone(),
            desc: card.desc.clone().unwrap_or_default(),
            id_list: list_id.to_string(),
            due: card.due,
            due_complete: false,
            closed: false,
            members: vec![],
            labels: vec![],
            custom_field_items: vec![],
        })
    }

    async fn set_custom_field(
        &self,
        card_id: &str,
        write: &CustomFieldWrite,
    ) -> Result<(), BoardApiError> {
        self.record(format!("set_custom_field:{}:{}", card_id, write.field_id))?;
        self.field_writes
            .lock()
            .unwrap()
            .push((card_id.to_string(), write.clone()));
        Ok(())
    }

    async fn set_custom_fields(
        &self,
        card_id: &str,
        writes: &[CustomFieldWrite],
    ) -> Result<(), BoardApiError> {
        self.record(format!("set_custom_fields:{}", card_id))?;
        self.bulk_writes
            .lock()
            .unwrap()
            .push((card_id.to_string(), writes.to_vec()));
        Ok(())
    }

    async fn add_label(&self, card_id: &str, label_id: &str) -> Result<(), BoardApiError> {
        self.record(format!("add_label:{}:{}", card_id, label_id))
    }

    async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), BoardApiError> {
        self.record(format!("remove_label:{}:{}", card_id, label_id))
    }

    async fn update_card(&self, card_id: &str, update: &CardUpdate) -> Result<Card, BoardApiError> {
        self.record(format!("update_card:{}", card_id))?;
        self.updates
            .lock()
            .unwrap()
            .push((card_id.to_string(), update.clone()));
        Ok(Card {
            id: card_id.to_string(),
            name: update.name.clone().unwrap_or_default(),
            desc: update.desc.clone().unwrap_or_default(),
            id_list: update.id_list.clone().unwrap_or_default(),
            due: update.due.flatten(),
            due_complete: update.due_complete.unwrap_or(false),
            closed: update.closed.unwrap_or(false),
            members: vec![],
            labels: vec![],
            custom_field_items: vec![],
        })
    }

    async fn add_member(&self, card_id: &str, member_id: &str) -> Result<(), BoardApiError> {
        self.record(format!("add_member:{}:{}", card_id, member_id))
    }

    async fn member_for_token(&self, token: &str) -> Result<CurrentMember, BoardApiError> {
        self.record(format!("member_for_token:{}", token))?;
        if let Some(credentials) = &self.watched {
            self.tokens_seen.lock().unwrap().push(credentials.token());
        }
        self.member
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BoardApiError::Unauthorized("invalid token".into()))
    }

    async fn check_board_access(&self, board_id: &str) -> Result<BoardSummary, BoardApiError> {
        self.record(format!("check_board_access:{}", board_id))?;
        if self.boards.lock().unwrap().contains_key(board_id) {
            Ok(BoardSummary {
                id: board_id.to_string(),
                name: format!("Board {}", board_id),
                closed: false,
            })
        } else {
            Err(BoardApiError::NotFound(format!("board {}", board_id)))
        }
    }

    async fn add_custom_field_option(
        &self,
        field_id: &str,
        text: &str,
    ) -> Result<FieldOption, BoardApiError> {
        self.record(format!("add_custom_field_option:{}:{}", field_id, text))?;
        let option = FieldOption {
            id: format!("o-{}", text.to_lowercase().replace(' ', "-")),
            value: OptionValue {
                text: text.to_string(),
            },
        };
        for board in self.boards.lock().unwrap().values_mut() {
            for field in board.custom_fields.iter_mut().filter(|f| f.id == field_id) {
                field.options.push(option.clone());
            }
        }
        Ok(option)
    }
}
