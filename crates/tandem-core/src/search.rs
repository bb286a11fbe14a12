use std::collections::BTreeMap;

use tandem_db::models::MessageRow;
use tandem_types::api::SearchHit;
use tandem_types::models::{ChatMessage, MessageType};
use tandem_types::room;

use crate::normalize::fold;
use crate::{ChatError, ChatService, view_row};

impl ChatService {
    /// Count text messages matching `keyword` in each of the user's rooms,
    /// keyed by partner. Matching ignores case and diacritics.
    ///
    /// Hidden messages and messages behind the user's clear watermark are
    /// not searched. Results are ordered by match count, then partner.
    pub fn search(&self, username: &str, keyword: &str) -> Result<Vec<SearchHit>, ChatError> {
        let needle = fold(keyword.trim());
        if needle.is_empty() {
            return Ok(vec![]);
        }

        let rows = self
            .db
            .member_messages(username, Some(MessageType::Chat.as_str()))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in &rows {
            let Some(partner) = room::partner(&row.room_id, username) else {
                continue;
            };
            if fold(&row.content).contains(&needle) {
                *counts.entry(partner.to_string()).or_default() += 1;
            }
        }

        let mut hits: Vec<SearchHit> = counts
            .into_iter()
            .map(|(partner, match_count)| SearchHit {
                partner,
                match_count,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| a.partner.cmp(&b.partner))
        });

        Ok(hits)
    }

    /// The newest visible message per conversation, keyed by partner.
    ///
    /// Equal timestamps go to the higher message id. Rows without a
    /// timestamp lose to any dated row.
    pub fn latest_summaries(
        &self,
        username: &str,
    ) -> Result<BTreeMap<String, ChatMessage>, ChatError> {
        let rows = self.db.member_messages(username, None)?;

        let mut latest: BTreeMap<String, MessageRow> = BTreeMap::new();
        for row in rows {
            let Some(partner) = room::partner(&row.room_id, username) else {
                continue;
            };
            let newer = latest
                .get(partner)
                .is_none_or(|current| (row.created_at, row.id) > (current.created_at, current.id));
            if newer {
                latest.insert(partner.to_string(), row);
            }
        }

        Ok(latest
            .into_iter()
            .filter_map(|(partner, row)| view_row(row).map(|message| (partner, message)))
            .collect())
    }
}
