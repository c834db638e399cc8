//! Shop context for multi-shop overlays.

use serde::{Deserialize, Serialize};

use super::ShopId;

/// The shop an operation reads from and the shops it writes to.
///
/// Per-shop field values live in `{table}_shop` rows. Reads overlay the row
/// of [`ShopContext::shop_id`]; writes (insert, update, delete) apply to every
/// shop in [`ShopContext::shop_ids`]. The write set is never empty and always
/// contains the read shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopContext {
    shop_id: ShopId,
    shop_ids: Vec<ShopId>,
}

impl ShopContext {
    /// Context for a single shop.
    #[must_use]
    pub fn single(shop_id: ShopId) -> Self {
        Self {
            shop_id,
            shop_ids: vec![shop_id],
        }
    }

    /// Context reading from `shop_id` and writing to all of `shops`.
    ///
    /// `shop_id` is added to the write set when missing; duplicates are removed.
    #[must_use]
    pub fn group(shop_id: ShopId, shops: impl IntoIterator<Item = ShopId>) -> Self {
        let mut shop_ids: Vec<ShopId> = shops.into_iter().collect();
        shop_ids.push(shop_id);
        shop_ids.sort_unstable();
        shop_ids.dedup();
        Self { shop_id, shop_ids }
    }

    /// Shop whose overlay is read.
    #[must_use]
    pub const fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    /// Shops written by insert, update and delete.
    #[must_use]
    pub fn shop_ids(&self) -> &[ShopId] {
        &self.shop_ids
    }
}

impl Default for ShopContext {
    fn default() -> Self {
        Self::single(ShopId::new(1))
    }
}
