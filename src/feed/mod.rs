use crate::types::{AssetId, BookUpdate, Event, Timestamp, Trade};

pub use reader::{BookStreamReader, TradeStreamReader};

mod reader;

/// Per-asset pair of lazily advanced sub-streams. Each side keeps a one-event lookahead so the
/// feed can be peeked without consuming.
struct AssetStream {
    asset_id: AssetId,
    book: Box<dyn Iterator<Item = BookUpdate>>,
    trade: Box<dyn Iterator<Item = Trade>>,
    next_book: Option<BookUpdate>,
    next_trade: Option<Trade>,
}

impl AssetStream {
    fn refill(&mut self) {
        if self.next_book.is_none() {
            self.next_book = self.book.next();
        }
        if self.next_trade.is_none() {
            self.next_trade = self.trade.next();
        }
    }
}

/// An n-way merge of per-asset book-update and trade streams in exchange-timestamp order.
///
/// Streams are drained lazily; one stream may be exhausted while others continue. Ties are broken
/// deterministically: the lowest asset id wins across assets, and within an asset a trade is
/// returned before a book update carrying the same timestamp.
#[derive(Default)]
pub struct MarketFeed {
    streams: Vec<AssetStream>,
}

impl MarketFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the book and trade sub-streams for an asset. Streams must be sorted by exchange
    /// timestamp; the merge preserves per-stream order.
    pub fn add_stream<B, T>(&mut self, asset_id: AssetId, book: B, trade: T)
    where
        B: Iterator<Item = BookUpdate> + 'static,
        T: Iterator<Item = Trade> + 'static,
    {
        self.streams.push(AssetStream {
            asset_id,
            book: Box::new(book),
            trade: Box::new(trade),
            next_book: None,
            next_trade: None,
        });
        self.streams.sort_by_key(|stream| stream.asset_id);
    }

    /// Returns the smallest exchange timestamp over all non-exhausted sub-streams without
    /// consuming anything, or `None` when every stream is exhausted.
    pub fn peek_timestamp(&mut self) -> Option<Timestamp> {
        let mut earliest: Option<Timestamp> = None;
        for stream in self.streams.iter_mut() {
            stream.refill();
            if let Some(update) = &stream.next_book {
                if earliest.map_or(true, |ts| update.exch_timestamp < ts) {
                    earliest = Some(update.exch_timestamp);
                }
            }
            if let Some(trade) = &stream.next_trade {
                if earliest.map_or(true, |ts| trade.exch_timestamp < ts) {
                    earliest = Some(trade.exch_timestamp);
                }
            }
        }
        earliest
    }

    /// Removes and returns the event with the smallest exchange timestamp.
    pub fn next_event(&mut self) -> Option<(AssetId, Event)> {
        let mut best: Option<(Timestamp, usize, bool)> = None;
        for (index, stream) in self.streams.iter_mut().enumerate() {
            stream.refill();
            // The trade sub-stream is inspected first so that a trade printed at the same
            // microsecond as a book update is delivered before it.
            if let Some(trade) = &stream.next_trade {
                if best.map_or(true, |(ts, _, _)| trade.exch_timestamp < ts) {
                    best = Some((trade.exch_timestamp, index, true));
                }
            }
            if let Some(update) = &stream.next_book {
                if best.map_or(true, |(ts, _, _)| update.exch_timestamp < ts) {
                    best = Some((update.exch_timestamp, index, false));
                }
            }
        }
        let (_, index, is_trade) = best?;
        let stream = &mut self.streams[index];
        let event = if is_trade {
            Event::Trade(stream.next_trade.take().unwrap())
        } else {
            Event::Book(stream.next_book.take().unwrap())
        };
        Some((stream.asset_id, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, UpdateKind};

    fn book_update(ts: Timestamp, price: f64) -> BookUpdate {
        BookUpdate {
            exch_timestamp: ts,
            local_timestamp: ts + 10,
            kind: UpdateKind::Incremental,
            side: Side::Buy,
            price,
            qty: 1.0,
        }
    }

    fn trade(ts: Timestamp, price: f64) -> Trade {
        Trade {
            exch_timestamp: ts,
            local_timestamp: ts + 10,
            trade_id: 0,
            side: Side::Sell,
            price,
            qty: 1.0,
        }
    }

    #[test]
    fn merges_streams_in_timestamp_order() {
        let mut feed = MarketFeed::new();
        feed.add_stream(
            0,
            vec![book_update(10, 100.0), book_update(30, 101.0)].into_iter(),
            vec![trade(20, 100.0)].into_iter(),
        );
        feed.add_stream(
            1,
            vec![book_update(15, 50.0)].into_iter(),
            std::iter::empty(),
        );

        assert_eq!(feed.peek_timestamp(), Some(10));
        let mut order = Vec::new();
        while let Some((asset_id, event)) = feed.next_event() {
            order.push((asset_id, event.exch_timestamp()));
        }
        assert_eq!(order, vec![(0, 10), (1, 15), (0, 20), (0, 30)]);
        assert_eq!(feed.peek_timestamp(), None);
    }

    #[test]
    fn trade_precedes_book_update_on_equal_timestamp() {
        let mut feed = MarketFeed::new();
        feed.add_stream(
            0,
            vec![book_update(10, 100.0)].into_iter(),
            vec![trade(10, 100.0)].into_iter(),
        );

        let (_, first) = feed.next_event().unwrap();
        assert!(matches!(first, Event::Trade(_)));
        let (_, second) = feed.next_event().unwrap();
        assert!(matches!(second, Event::Book(_)));
    }

    #[test]
    fn lower_asset_id_wins_cross_asset_ties() {
        let mut feed = MarketFeed::new();
        feed.add_stream(
            1,
            vec![book_update(10, 100.0)].into_iter(),
            std::iter::empty(),
        );
        feed.add_stream(
            0,
            vec![book_update(10, 50.0)].into_iter(),
            std::iter::empty(),
        );

        let (asset_id, _) = feed.next_event().unwrap();
        assert_eq!(asset_id, 0);
    }

    #[test]
    fn survives_exhausted_substreams() {
        let mut feed = MarketFeed::new();
        feed.add_stream(
            0,
            std::iter::empty(),
            vec![trade(5, 100.0), trade(7, 101.0)].into_iter(),
        );

        assert_eq!(feed.peek_timestamp(), Some(5));
        assert!(feed.next_event().is_some());
        assert!(feed.next_event().is_some());
        assert!(feed.next_event().is_none());
    }
}
