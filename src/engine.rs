use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::INSCRIPTION_VIEWER_BASE;
use crate::api::{SalesSource, fetch_recent_sales};
use crate::config::SettingsConfig;
use crate::reporter;
use crate::retry::Backoff;
use crate::state::SeenSet;
use crate::twitter::Publisher;
use crate::types::{Alert, AlertRecord, SaleEvent};

/// Sats per BTC, as a decimal scale.
const SATS_SCALE: u32 = 8;

/// Convert a price in sats to BTC without going through floats.
pub fn price_btc(sats: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(sats), SATS_SCALE)
}

/// BTC price with exactly 8 decimals: `250000000` → `2.50000000`.
pub fn format_price(sats: u64) -> String {
    format!("{:.8}", price_btc(sats))
}

pub fn viewer_url(inscription_id: &str) -> String {
    format!("{INSCRIPTION_VIEWER_BASE}/{inscription_id}")
}

/// Build the alert for one sale.
pub fn format_alert(collection: &str, event_id: &str, event: &SaleEvent) -> Alert {
    let inscription_id = event.inscription_or_unknown();
    let price = format_price(event.price);
    let text = format!(
        "🚨 New {collection} sale! 🚨\n\
         💰 Price: {price} BTC\n\
         🔢 Inscription: {inscription_id}\n\
         🔍 View: {}",
        viewer_url(inscription_id)
    );
    Alert {
        event_id: event_id.to_string(),
        inscription_id: inscription_id.to_string(),
        price_btc: price,
        text,
    }
}

/// Outcome counters for one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetch_failed: bool,
    pub fetched: usize,
    pub published: usize,
    pub already_seen: usize,
    pub failed: usize,
    pub seen_cleared: bool,
}

/// Poll → dedup → publish loop and everything it owns between iterations.
pub struct SalesBot<S, P> {
    source: S,
    publisher: P,
    settings: SettingsConfig,
    seen: SeenSet,
    backoff: Backoff,
    report: Box<dyn Write + Send>,
}

impl<S: SalesSource, P: Publisher> SalesBot<S, P> {
    pub fn new(source: S, publisher: P, settings: SettingsConfig) -> Self {
        Self {
            source,
            publisher,
            seen: SeenSet::new(settings.seen_cap),
            settings,
            backoff: Backoff::default(),
            report: Box::new(std::io::stdout()),
        }
    }

    /// Send alert records somewhere other than stdout.
    pub fn with_report_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.report = writer;
        self
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn seen_mut(&mut self) -> &mut SeenSet {
        &mut self.seen
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// One iteration: fetch, skip known events, publish the rest, bound the seen set.
    ///
    /// A failed fetch counts as an empty batch. A failed publish leaves the event
    /// unmarked so the next cycle tries it again. A failed report line is only
    /// logged; the event stays marked and the batch continues.
    pub async fn poll_cycle(&mut self) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        let sales = match fetch_recent_sales(&self.source, &mut self.backoff, &self.settings).await
        {
            Ok(sales) => sales,
            Err(e) => {
                warn!("Failed to fetch sales: {e}");
                summary.fetch_failed = true;
                return Ok(summary);
            }
        };
        summary.fetched = sales.len();

        let mut attempted: HashSet<&str> = HashSet::new();
        for sale in &sales {
            let Some(id) = sale.event_id() else {
                debug!("Skipping sale without an event id: {sale:?}");
                continue;
            };
            if self.seen.contains(id) {
                summary.already_seen += 1;
                continue;
            }
            if !attempted.insert(id) {
                continue;
            }

            let alert = format_alert(&self.settings.collection, id, sale);
            match self.publisher.publish(&alert.text).await {
                Ok(post_id) => {
                    self.seen.insert(id);
                    summary.published += 1;
                    info!(
                        "Posted sale {} ({} BTC, inscription {})",
                        alert.event_id, alert.price_btc, alert.inscription_id
                    );
                    let record = AlertRecord {
                        timestamp: chrono::Utc::now().to_rfc3339(),
                        event_id: alert.event_id,
                        inscription_id: alert.inscription_id,
                        price_btc: alert.price_btc,
                        post_id,
                        seen_count: self.seen.len(),
                    };
                    if let Err(e) = reporter::report_alert(self.report.as_mut(), &record) {
                        warn!("Failed to report sale {id}: {e:#}");
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("Failed to publish sale {id}: {e}");
                }
            }
        }

        if self.seen.enforce_cap() {
            info!("Seen set exceeded {} entries, cleared", self.settings.seen_cap);
            summary.seen_cleared = true;
        }

        Ok(summary)
    }

    /// Poll until `shutdown` resolves. Errors escaping a cycle are logged and
    /// followed by the longer error pause; they never end the loop.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        let mut pause = Duration::ZERO;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(pause) => {
                    let result = self.poll_cycle().await;
                    pause = self.pause_after(&result);
                }
            }
        }
    }

    /// Log a cycle's outcome and pick the pause before the next one.
    fn pause_after(&self, result: &Result<CycleSummary>) -> Duration {
        match result {
            Ok(summary) => {
                if summary.published > 0 || summary.failed > 0 {
                    info!(
                        "Cycle done: {} published, {} failed, {} already seen (seen: {})",
                        summary.published,
                        summary.failed,
                        summary.already_seen,
                        self.seen.len()
                    );
                } else {
                    debug!("No new sales (seen: {})", self.seen.len());
                }
                self.settings.poll_interval()
            }
            Err(e) => {
                error!("Poll cycle error: {e:#}");
                self.settings.error_pause()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchError, SalesQuery};
    use crate::twitter::PostError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Serves scripted batches; an empty batch once the script runs out.
    #[derive(Default)]
    struct FakeSource {
        batches: Mutex<VecDeque<Result<Vec<SaleEvent>, FetchError>>>,
        calls: Mutex<usize>,
    }

    impl FakeSource {
        fn with(batches: Vec<Result<Vec<SaleEvent>, FetchError>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl SalesSource for FakeSource {
        async fn fetch_page(&self, _query: &SalesQuery) -> Result<Vec<SaleEvent>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            self.batches.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    /// Records every text; fails texts containing any of `reject`.
    #[derive(Default)]
    struct FakePublisher {
        posted: Mutex<Vec<String>>,
        reject: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, text: &str) -> Result<Option<String>, PostError> {
            if self.reject.lock().unwrap().iter().any(|r| text.contains(r.as_str())) {
                return Err(PostError::Rejected {
                    status: 403,
                    body: "duplicate content".to_string(),
                });
            }
            let mut posted = self.posted.lock().unwrap();
            posted.push(text.to_string());
            Ok(Some(posted.len().to_string()))
        }
    }

    impl FakePublisher {
        fn posted(&self) -> Vec<String> {
            self.posted.lock().unwrap().clone()
        }
    }

    /// Shared in-memory report sink.
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn lines(&self) -> usize {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .count()
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sale(id: &str, inscription: &str, price: u64) -> SaleEvent {
        SaleEvent {
            id: Some(id.to_string()),
            price,
            inscription_id: Some(inscription.to_string()),
            seller: Some("bc1pseller".to_string()),
            buyer: Some("bc1pbuyer".to_string()),
        }
    }

    fn bot(
        batches: Vec<Result<Vec<SaleEvent>, FetchError>>,
    ) -> (SalesBot<FakeSource, FakePublisher>, Sink) {
        let sink = Sink::default();
        let bot = SalesBot::new(
            FakeSource::with(batches),
            FakePublisher::default(),
            SettingsConfig::default(),
        )
        .with_report_writer(Box::new(sink.clone()));
        (bot, sink)
    }

    // ── formatting ─────────────────────────────────────────────────

    #[test]
    fn price_conversion() {
        assert_eq!(price_btc(250_000_000), dec!(2.5));
        assert_eq!(format_price(250_000_000), "2.50000000");
        assert_eq!(format_price(1), "0.00000001");
        assert_eq!(format_price(0), "0.00000000");
        assert_eq!(format_price(2_100_000_000_000_000), "21000000.00000000");
    }

    #[test]
    fn alert_template() {
        let alert = format_alert("fukuhedrons", "sig-1", &sale("sig-1", "abci0", 250_000_000));
        assert_eq!(
            alert.text,
            "🚨 New fukuhedrons sale! 🚨\n\
             💰 Price: 2.50000000 BTC\n\
             🔢 Inscription: abci0\n\
             🔍 View: https://ordinals.com/inscription/abci0"
        );
        assert_eq!(alert.price_btc, "2.50000000");
        assert_eq!(alert.event_id, "sig-1");
    }

    #[test]
    fn alert_without_inscription() {
        let event = SaleEvent {
            inscription_id: None,
            ..sale("x", "", 5)
        };
        let alert = format_alert("c", "x", &event);
        assert!(alert.text.contains("Inscription: Unknown"));
    }

    // ── poll_cycle ─────────────────────────────────────────────────

    #[tokio::test]
    async fn new_event_published_seen_event_skipped() {
        let (mut bot, sink) = bot(vec![Ok(vec![sale("A", "ia", 100), sale("B", "ib", 200)])]);
        bot.seen_mut().insert("B");

        let summary = bot.poll_cycle().await.unwrap();

        let posted = bot.publisher().posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0], format_alert("fukuhedrons", "A", &sale("A", "ia", 100)).text);
        assert!(bot.seen().contains("A"));
        assert!(bot.seen().contains("B"));
        assert_eq!(bot.seen().len(), 2);
        assert_eq!(
            summary,
            CycleSummary {
                fetched: 2,
                published: 1,
                already_seen: 1,
                ..CycleSummary::default()
            }
        );
        assert_eq!(sink.lines(), 1);
    }

    #[tokio::test]
    async fn repeated_event_alerts_once() {
        let batch = vec![sale("A", "ia", 100)];
        let (mut bot, _) = bot(vec![Ok(batch.clone()), Ok(batch)]);
        bot.poll_cycle().await.unwrap();
        let second = bot.poll_cycle().await.unwrap();
        assert_eq!(bot.publisher().posted().len(), 1);
        assert_eq!(second.already_seen, 1);
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_batch_post_once() {
        let (mut bot, _) = bot(vec![Ok(vec![sale("A", "ia", 1), sale("A", "ia", 1)])]);
        bot.poll_cycle().await.unwrap();
        assert_eq!(bot.publisher().posted().len(), 1);
    }

    #[tokio::test]
    async fn failed_publish_is_retried_next_cycle() {
        let batch = vec![sale("A", "ia", 1), sale("B", "ib", 2)];
        let (mut bot, sink) = bot(vec![Ok(batch.clone()), Ok(batch)]);
        bot.publisher().reject.lock().unwrap().push("ia".to_string());

        let first = bot.poll_cycle().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.published, 1);
        assert!(!bot.seen().contains("A"));
        assert!(bot.seen().contains("B"));

        bot.publisher().reject.lock().unwrap().clear();
        let second = bot.poll_cycle().await.unwrap();
        assert_eq!(second.published, 1);
        assert_eq!(second.already_seen, 1);
        assert!(bot.seen().contains("A"));
        assert_eq!(sink.lines(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_an_empty_cycle() {
        let (mut bot, _) = bot(vec![Err(FetchError::NotFound)]);
        let summary = bot.poll_cycle().await.unwrap();
        assert!(summary.fetch_failed);
        assert!(bot.publisher().posted().is_empty());
        assert_eq!(*bot.source.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn events_without_id_are_ignored() {
        let event = SaleEvent {
            id: None,
            ..sale("", "ia", 1)
        };
        let (mut bot, _) = bot(vec![Ok(vec![event])]);
        let summary = bot.poll_cycle().await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.published, 0);
        assert!(bot.seen().is_empty());
    }

    #[tokio::test]
    async fn seen_set_cleared_past_cap() {
        let settings = SettingsConfig {
            seen_cap: 2,
            ..SettingsConfig::default()
        };
        let batch = vec![sale("A", "ia", 1), sale("B", "ib", 1), sale("C", "ic", 1)];
        let mut bot = SalesBot::new(
            FakeSource::with(vec![Ok(batch)]),
            FakePublisher::default(),
            settings,
        )
        .with_report_writer(Box::new(Sink::default()));

        let summary = bot.poll_cycle().await.unwrap();
        assert_eq!(summary.published, 3);
        assert!(summary.seen_cleared);
        assert!(bot.seen().is_empty());
    }

    #[tokio::test]
    async fn report_failure_does_not_stop_the_batch() {
        let settings = SettingsConfig {
            seen_cap: 1,
            ..SettingsConfig::default()
        };
        let mut bot = SalesBot::new(
            FakeSource::with(vec![Ok(vec![sale("A", "ia", 1), sale("B", "ib", 2)])]),
            FakePublisher::default(),
            settings,
        )
        .with_report_writer(Box::new(BrokenPipe));

        let summary = bot.poll_cycle().await.unwrap();
        assert_eq!(summary.published, 2);
        assert_eq!(bot.publisher().posted().len(), 2);
        // Both were marked, so the cap check still ran and cleared the set.
        assert!(summary.seen_cleared);
        assert!(bot.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn report_failure_keeps_normal_interval() {
        let mut bot = SalesBot::new(
            FakeSource::with(vec![Ok(vec![sale("A", "ia", 1)])]),
            FakePublisher::default(),
            SettingsConfig::default(),
        )
        .with_report_writer(Box::new(BrokenPipe));

        // Cycles at t = 0 and 30.
        bot.run_until(tokio::time::sleep(Duration::from_secs(45))).await;
        assert_eq!(*bot.source.calls.lock().unwrap(), 2);
    }

    // ── run_until ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_until_shutdown() {
        let (mut bot, _) = bot(vec![]);
        // Cycles at t = 0, 30, 60, 90.
        bot.run_until(tokio::time::sleep(Duration::from_secs(95))).await;
        assert_eq!(*bot.source.calls.lock().unwrap(), 4);
    }

    #[test]
    fn cycle_error_uses_longer_pause() {
        let (bot, _) = bot(vec![]);
        let ok = bot.pause_after(&Ok(CycleSummary::default()));
        let failed = bot.pause_after(&Err(anyhow::anyhow!("boom")));
        assert_eq!(ok, Duration::from_secs(30));
        assert_eq!(failed, Duration::from_secs(60));
    }
}
