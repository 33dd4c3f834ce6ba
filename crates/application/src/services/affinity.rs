use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{ChatId, DomainError, UserId};

use crate::{
    dto::FriendAffinity,
    error::ApplicationError,
    repository::{MessageRepository, UserRepository},
};

pub struct AffinityRankerDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
}

/// 好友亲密度排序
///
/// 对每个好友，取双方共同所在的非 Global 房间，统计其中由本人或该好友发送的消息数。
/// 结果按分数降序；分数相同保持好友列表原有顺序（即结识先后）。每次查询都重新计算。
pub struct AffinityRanker {
    deps: AffinityRankerDependencies,
}

impl AffinityRanker {
    pub fn new(deps: AffinityRankerDependencies) -> Self {
        Self { deps }
    }

    pub async fn rank(&self, user_id: UserId) -> Result<Vec<FriendAffinity>, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        let friends = self.deps.user_repository.find_many(&user.friends).await?;

        let own_chats: HashSet<ChatId> = user
            .chats
            .iter()
            .copied()
            .filter(|chat_id| !chat_id.is_global())
            .collect();

        let shared: Vec<Vec<ChatId>> = friends
            .iter()
            .map(|friend| {
                friend
                    .chats
                    .iter()
                    .copied()
                    .filter(|chat_id| own_chats.contains(chat_id))
                    .collect()
            })
            .collect();

        let mut wanted: Vec<ChatId> = shared.iter().flatten().copied().collect();
        wanted.sort();
        wanted.dedup();

        // (房间, 作者) -> 消息数
        let mut counts: HashMap<(ChatId, UserId), u64> = HashMap::new();
        if !wanted.is_empty() {
            for message in self.deps.message_repository.list_by_chats(&wanted).await? {
                *counts.entry((message.chat_id, message.author_id)).or_default() += 1;
            }
        }
        let count = |chat_id: ChatId, author: UserId| counts.get(&(chat_id, author)).copied().unwrap_or(0);

        let mut ranking: Vec<FriendAffinity> = friends
            .iter()
            .zip(&shared)
            .map(|(friend, chats)| FriendAffinity {
                friend: friend.summary(),
                score: chats
                    .iter()
                    .map(|chat_id| count(*chat_id, user_id) + count(*chat_id, friend.id))
                    .sum(),
            })
            .collect();

        // sort_by 是稳定排序
        ranking.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(ranking)
    }
}
