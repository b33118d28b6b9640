use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

use super::queue::GuildQueue;

/// Tabla global guild → cola.
///
/// Entries are created on first access and never removed, so memory grows
/// with the number of distinct guilds seen by the process. The map lock is
/// only held for the lookup-or-insert itself.
#[derive(Default)]
pub struct QueueRegistry {
    queues: DashMap<GuildId, Arc<GuildQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildQueue> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Cola creada para guild {}", guild_id);
                Arc::new(GuildQueue::new(guild_id))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildQueue>> {
        self.queues.get(&guild_id).map(|queue| queue.clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_get_or_create_returns_one_queue() {
        let registry = Arc::new(QueueRegistry::new());
        let guild = GuildId::new(1);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(guild) })
            })
            .collect();

        let queues: Vec<Arc<GuildQueue>> = futures::future::try_join_all(tasks).await.unwrap();
        assert!(queues.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(registry.len(), 1);

        // Lo que agrega uno lo ve el otro
        queues[0].append(&["a".to_string()], 10).unwrap();
        assert_eq!(queues[7].snapshot().items, vec!["a".to_string()]);
    }

    #[test]
    fn get_does_not_create() {
        let registry = QueueRegistry::new();
        assert!(registry.get(GuildId::new(5)).is_none());

        let created = registry.get_or_create(GuildId::new(5));
        let found = registry.get(GuildId::new(5)).unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert!(registry.get_or_create(GuildId::new(6)).guild_id() == GuildId::new(6));
        assert_eq!(registry.len(), 2);
    }
}
