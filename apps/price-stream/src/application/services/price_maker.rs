//! Price Maker Service
//!
//! One task per asset. Each cycle advances the asset's [`PriceWalk`], writes
//! the new value to the [`PriceStore`] and publishes a [`PriceChanged`] into
//! the hub's ingress channel.
//!
//! Store failures are logged and counted but never stop the walk; the value
//! keeps moving in memory and the next successful write catches the store up.

use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PriceStore, StoreError};
use crate::domain::pricing::{PriceChanged, PriceWalk, PriceWalkError, WalkConfig, WalkStep};
use crate::infrastructure::metrics;

/// Price maker errors.
#[derive(Debug, Error)]
pub enum PriceMakerError {
    /// Start price is zero or negative.
    #[error("start price for {asset} must be positive, got {price}")]
    NonPositiveStartPrice {
        /// Asset name.
        asset: String,
        /// Rejected price.
        price: Decimal,
    },

    /// Walk could not be constructed.
    #[error(transparent)]
    Walk(#[from] PriceWalkError),

    /// Initial prices could not be read.
    #[error("failed to load prices: {0}")]
    Store(#[from] StoreError),

    /// Hub ingress is closed.
    #[error("hub ingress closed")]
    HubClosed,
}

/// Drives the price walk of one asset.
pub struct PriceMaker {
    walk: PriceWalk,
    rng: StdRng,
    store: Arc<dyn PriceStore>,
    events: mpsc::Sender<PriceChanged>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PriceMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceMaker")
            .field("walk", &self.walk)
            .finish_non_exhaustive()
    }
}

impl PriceMaker {
    /// Create a maker for `asset` starting at `start`, with a target rolled
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `PriceMakerError::NonPositiveStartPrice` if `start <= 0`, or
    /// `PriceMakerError::Walk` if `config` is invalid.
    pub fn create(
        asset: impl Into<String>,
        start: Decimal,
        config: WalkConfig,
        store: Arc<dyn PriceStore>,
        events: mpsc::Sender<PriceChanged>,
        cancel: CancellationToken,
    ) -> Result<Self, PriceMakerError> {
        let asset = asset.into();
        if start <= Decimal::ZERO {
            return Err(PriceMakerError::NonPositiveStartPrice {
                asset,
                price: start,
            });
        }

        let mut rng = StdRng::from_os_rng();
        let walk = PriceWalk::new(asset, start, config, Instant::now(), &mut rng)?;
        Ok(Self::with_walk(walk, rng, store, events, cancel))
    }

    /// Create a maker around an existing walk and RNG.
    #[must_use]
    pub fn with_walk(
        walk: PriceWalk,
        rng: StdRng,
        store: Arc<dyn PriceStore>,
        events: mpsc::Sender<PriceChanged>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            walk,
            rng,
            store,
            events,
            cancel,
        }
    }

    /// The walk this maker drives.
    #[must_use]
    pub const fn walk(&self) -> &PriceWalk {
        &self.walk
    }

    /// Run one cycle at `now`: advance, persist, publish.
    ///
    /// # Errors
    ///
    /// Returns `PriceMakerError::HubClosed` if the ingress channel is gone.
    pub async fn cycle(&mut self, now: Instant) -> Result<WalkStep, PriceMakerError> {
        let step = self.walk.advance(now, &mut self.rng);
        let asset = self.walk.asset();

        if step.rerolled {
            tracing::debug!(
                asset,
                target = %self.walk.target(),
                interval = ?self.walk.change_interval(),
                "Rolled new price target"
            );
        }

        if let Err(e) = self.store.set_price(asset, step.value).await {
            tracing::warn!(asset, price = %step.value, error = %e, "Failed to persist price");
            metrics::record_store_error(asset);
        }

        self.events
            .send(PriceChanged::now(asset, step.value))
            .await
            .map_err(|_| PriceMakerError::HubClosed)?;
        metrics::record_price_update(asset);

        Ok(step)
    }

    /// Run cycles until cancelled or the hub ingress closes.
    pub async fn run(mut self) {
        tracing::info!(
            asset = self.walk.asset(),
            start = %self.walk.start(),
            target = %self.walk.target(),
            "Price maker started"
        );

        loop {
            let pause = self.walk.cycle_interval();
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!(asset = self.walk.asset(), "Price maker cancelled");
                    break;
                }
                () = tokio::time::sleep(pause) => {}
            }

            if let Err(e) = self.cycle(tokio::time::Instant::now().into_std()).await {
                tracing::info!(asset = self.walk.asset(), error = %e, "Price maker stopped");
                break;
            }
        }
    }
}

/// Spawn one price maker per asset known to `store`.
///
/// Every maker is built before any is spawned, so a bad price leaves
/// nothing running.
///
/// # Errors
///
/// Returns an error if the store cannot be listed or a stored price cannot
/// start a walk.
pub async fn start_price_makers(
    store: Arc<dyn PriceStore>,
    events: mpsc::Sender<PriceChanged>,
    config: WalkConfig,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, PriceMakerError> {
    let makers = store
        .list_prices()
        .await?
        .into_iter()
        .map(|price| {
            PriceMaker::create(
                price.name,
                price.value,
                config,
                Arc::clone(&store),
                events.clone(),
                cancel.child_token(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(count = makers.len(), "Starting price makers");
    Ok(makers
        .into_iter()
        .map(|maker| tokio::spawn(maker.run()))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::ports::MockPriceStore;
    use crate::infrastructure::persistence::InMemoryPriceStore;

    fn forced_walk(now: Instant) -> PriceWalk {
        PriceWalk::with_target(
            "white_wool",
            Decimal::new(45, 0),
            Decimal::new(46, 0),
            Duration::from_secs(5),
            WalkConfig::default(),
            now,
        )
        .unwrap()
    }

    fn maker(store: MockPriceStore, now: Instant) -> (PriceMaker, mpsc::Receiver<PriceChanged>) {
        let (tx, rx) = mpsc::channel(8);
        let maker = PriceMaker::with_walk(
            forced_walk(now),
            StdRng::seed_from_u64(7),
            Arc::new(store),
            tx,
            CancellationToken::new(),
        );
        (maker, rx)
    }

    #[tokio::test]
    async fn cycle_persists_then_publishes() {
        let mut store = MockPriceStore::new();
        store
            .expect_set_price()
            .withf(|_, price| *price == Decimal::new(455, 1))
            .times(1)
            .returning(|_, _| Ok(()));

        let t0 = Instant::now();
        let (mut maker, mut rx) = maker(store, t0);

        let step = maker.cycle(t0 + Duration::from_millis(2500)).await.unwrap();
        assert!(!step.rerolled);
        assert_eq!(step.value, Decimal::new(455, 1));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.asset, "white_wool");
        assert_eq!(event.value, Decimal::new(455, 1));
    }

    #[tokio::test]
    async fn store_failure_does_not_stop_the_walk() {
        let mut store = MockPriceStore::new();
        store.expect_set_price().times(2).returning(|_, _| {
            Err(StoreError::Unavailable {
                message: "connection refused".to_string(),
            })
        });

        let t0 = Instant::now();
        let (mut maker, mut rx) = maker(store, t0);

        maker.cycle(t0 + Duration::from_millis(2500)).await.unwrap();
        maker.cycle(t0 + Duration::from_secs(5)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().value, Decimal::new(455, 1));
        assert_eq!(rx.recv().await.unwrap().value, Decimal::new(46, 0));
        assert_eq!(maker.walk().current(), Decimal::new(46, 0));
    }

    #[tokio::test]
    async fn closed_ingress_is_reported() {
        let mut store = MockPriceStore::new();
        store.expect_set_price().returning(|_, _| Ok(()));

        let t0 = Instant::now();
        let (mut maker, rx) = maker(store, t0);
        drop(rx);

        let result = maker.cycle(t0 + Duration::from_secs(1)).await;
        assert!(matches!(result, Err(PriceMakerError::HubClosed)));
    }

    #[test]
    fn create_rejects_non_positive_start() {
        let (tx, _rx) = mpsc::channel(1);
        let result = PriceMaker::create(
            "white_wool",
            Decimal::ZERO,
            WalkConfig::default(),
            Arc::new(MockPriceStore::new()),
            tx,
            CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(PriceMakerError::NonPositiveStartPrice { .. })
        ));
    }

    #[test]
    fn create_rolls_target_within_band() {
        let (tx, _rx) = mpsc::channel(1);
        let maker = PriceMaker::create(
            "white_wool",
            Decimal::new(45, 0),
            WalkConfig::default(),
            Arc::new(MockPriceStore::new()),
            tx,
            CancellationToken::new(),
        )
        .unwrap();

        let (low, high) = maker.walk().band();
        assert!(maker.walk().target() >= low && maker.walk().target() <= high);
        assert!(!maker.walk().change_interval().is_zero());
    }

    #[tokio::test]
    async fn started_makers_publish_until_cancelled() {
        let store: Arc<dyn PriceStore> = Arc::new(
            InMemoryPriceStore::with_assets([
                ("white_wool", Decimal::new(45, 0)),
                ("black_wool", Decimal::new(42, 0)),
            ])
            .unwrap(),
        );
        let config = WalkConfig {
            min_change_interval: Duration::from_millis(20),
            max_change_interval: Duration::from_millis(40),
            min_cycle: Duration::from_millis(5),
            ..WalkConfig::default()
        };
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let handles = start_price_makers(Arc::clone(&store), tx, config, &cancel)
            .await
            .unwrap();
        assert_eq!(handles.len(), 2);

        let mut seen = std::collections::HashSet::new();
        while seen.len() < 2 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.insert(event.asset);
        }

        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
