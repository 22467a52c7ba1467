use crate::render::cache::bitmaps::BitmapId;

#[derive(Clone, Copy, Debug, Default)]
struct UnitSlot {
    bitmap: Option<BitmapId>,
    stamp: u64,
}

/// Result of a bind request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub unit: usize,
    /// False when the bitmap was already resident on `unit`.
    pub needs_bind: bool,
    pub evicted: Option<BitmapId>,
}

/// Maps bitmaps onto the hardware texture units.
///
/// Recency is a per-unit stamp from a monotonic tick and eviction is a linear
/// scan for the oldest stamp (first found on ties). Unit counts are small.
#[derive(Debug)]
pub struct TextureUnitBinder {
    units: Vec<UnitSlot>,
    tick: u64,
}

impl TextureUnitBinder {
    pub fn new(unit_count: usize) -> Self {
        Self { units: vec![UnitSlot::default(); unit_count.max(1)], tick: 0 }
    }

    /// Selects a unit for `bitmap`, never evicting `pinned`.
    pub fn bind(&mut self, bitmap: BitmapId, pinned: Option<usize>) -> Binding {
        self.tick += 1;

        if let Some(unit) = self.unit_of(bitmap) {
            self.units[unit].stamp = self.tick;
            return Binding { unit, needs_bind: false, evicted: None };
        }

        let mut lru = None;
        for (i, slot) in self.units.iter().enumerate() {
            if Some(i) == pinned {
                continue;
            }
            match lru {
                Some((_, stamp)) if slot.stamp >= stamp => {}
                _ => lru = Some((i, slot.stamp)),
            }
        }
        // A single pinned unit leaves nothing else to evict.
        let unit = lru.map(|(i, _)| i).unwrap_or(0);

        let evicted = self.units[unit].bitmap.replace(bitmap);
        self.units[unit].stamp = self.tick;
        if let Some(old) = evicted {
            log::debug!("texture unit {} evicts {:?} for {:?}", unit, old, bitmap);
        }
        Binding { unit, needs_bind: true, evicted }
    }

    pub fn unit_of(&self, bitmap: BitmapId) -> Option<usize> {
        self.units.iter().position(|slot| slot.bitmap == Some(bitmap))
    }

    pub fn is_resident(&self, bitmap: BitmapId) -> bool {
        self.unit_of(bitmap).is_some()
    }

    /// Clears every unit holding `bitmap` so a stale texture never matches.
    pub fn forget(&mut self, bitmap: BitmapId) {
        for slot in self.units.iter_mut().filter(|slot| slot.bitmap == Some(bitmap)) {
            *slot = UnitSlot::default();
        }
    }
}
