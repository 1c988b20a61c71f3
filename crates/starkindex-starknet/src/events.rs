//! Event aggregation: every event of one block, across all result pages.

use starkindex_core::error::IndexerError;
use starkindex_core::types::{group_events_by_tx, EventsMap};

use crate::rpc::{EventsFilter, StarknetRpcClient};

/// Collects all events of a block by following `starknet_getEvents`
/// continuation tokens.
pub struct EventAggregator<C> {
    client: C,
    chunk_size: u64,
}

impl<C: StarknetRpcClient> EventAggregator<C> {
    pub fn new(client: C, chunk_size: u64) -> Self {
        Self { client, chunk_size }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// All events emitted in `block_number`, grouped by transaction hash.
    ///
    /// Node errors are returned as-is so the caller can classify them.
    pub async fn fetch_events(&self, block_number: u64) -> Result<EventsMap, IndexerError> {
        let mut filter = EventsFilter::block(block_number, self.chunk_size);
        let mut events = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self.client.get_events(&filter).await?;
            pages += 1;
            events.extend(page.events);

            match page.continuation_token {
                Some(token) if !token.is_empty() => filter.continuation_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(block_number, pages, events = events.len(), "fetched block events");
        Ok(group_events_by_tx(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;

    #[tokio::test]
    async fn follows_continuation_tokens() {
        let client = MockClient::new();
        client.push_events_page(1000, "0xt1", Some("c1"));
        client.push_events_page(1000, "0xt2", Some("c2"));
        client.push_events_page(400, "0xt1", Some(""));

        let aggregator = EventAggregator::new(client.clone(), 1000);
        let events = aggregator.fetch_events(77).await.unwrap();

        let total: usize = events.values().map(Vec::len).sum();
        assert_eq!(total, 2400);
        assert_eq!(events["0xt1"].len(), 1400);
        assert_eq!(events["0xt2"].len(), 1000);

        let filters = client.event_filters();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].continuation_token, None);
        assert_eq!(filters[1].continuation_token.as_deref(), Some("c1"));
        assert_eq!(filters[2].continuation_token.as_deref(), Some("c2"));
        assert!(filters.iter().all(|f| f.from_block == 77 && f.to_block == 77));
    }

    #[tokio::test]
    async fn missing_token_ends_pagination() {
        let client = MockClient::new();
        client.push_events_page(3, "0xt1", None);

        let events = EventAggregator::new(client.clone(), 1000)
            .fetch_events(1)
            .await
            .unwrap();
        assert_eq!(events["0xt1"].len(), 3);
        assert_eq!(client.event_filters().len(), 1);
    }
}
