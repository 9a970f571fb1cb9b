//! Weighted ad rotation.
//!
//! Each candidate is weighted `1 / (1 + impressions)` so under-served
//! campaigns catch up instead of an early leader entrenching itself. The
//! winner is drawn by cumulative-weight roulette.

use campaign_core::types::{AdType, Campaign};
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct RotationSelector;

impl RotationSelector {
    pub fn weight(campaign: &Campaign) -> f64 {
        1.0 / (1.0 + campaign.impressions as f64)
    }

    /// Select from an already-eligible pool using the thread-local RNG.
    pub fn select(&self, pool: &[Campaign], limit: usize) -> Vec<Campaign> {
        self.select_with(&mut rand::thread_rng(), pool, limit)
    }

    /// A SLIDER winner yields a carousel of the first `limit` pool entries;
    /// any other winner is returned alone. An empty pool yields nothing.
    pub fn select_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        pool: &[Campaign],
        limit: usize,
    ) -> Vec<Campaign> {
        let Some(winner) = Self::draw(rng, pool) else {
            return Vec::new();
        };
        metrics::counter!("rotation.selections").increment(1);

        if winner.ad_type == AdType::Slider {
            debug!(pool = pool.len(), limit = limit, "Slider won rotation, serving carousel");
            return pool.iter().take(limit).cloned().collect();
        }
        debug!(campaign_id = %winner.id, impressions = winner.impressions, "Rotation winner");
        vec![winner.clone()]
    }

    fn draw<'a, R: Rng + ?Sized>(rng: &mut R, pool: &'a [Campaign]) -> Option<&'a Campaign> {
        let last = pool.last()?;
        let total: f64 = pool.iter().map(Self::weight).sum();
        let mut r = rng.gen::<f64>() * total;
        for campaign in pool {
            r -= Self::weight(campaign);
            if r <= 0.0 {
                return Some(campaign);
            }
        }
        // Float rounding can leave a sliver of weight unconsumed.
        Some(last)
    }
}
